//! Summary statistics over a validated telemetry table
//!
//! Averages are computed in exact decimal arithmetic from the cell text
//! and rounded to 2 places, half away from zero. The type distribution
//! is ordered by descending count; equal counts keep first-seen order.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use rustc_hash::FxHashMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::IngestError;
use crate::table::Table;
use crate::validate::{Columns, FLOWRATE, PRESSURE, TEMPERATURE};

/// Decimal places kept in averages.
const AVERAGE_DP: u32 = 2;

/// Aggregate response for one ingested dataset. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsPayload {
    pub total_equipment_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_flowrate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_pressure: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_temperature: Decimal,
    pub equipment_type_distribution: TypeDistribution,
}

impl StatisticsPayload {
    /// Payload for a table with no rows.
    pub fn empty() -> Self {
        Self {
            total_equipment_count: 0,
            average_flowrate: Decimal::ZERO,
            average_pressure: Decimal::ZERO,
            average_temperature: Decimal::ZERO,
            equipment_type_distribution: TypeDistribution::default(),
        }
    }
}

/// Equipment type → count, most frequent first.
///
/// Serializes as a JSON object whose key order is the ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDistribution(Vec<(String, u64)>);

impl TypeDistribution {
    /// Count `types` and rank them. Blank values are not counted.
    pub fn from_values<'a>(types: impl IntoIterator<Item = &'a str>) -> Self {
        let mut slot: FxHashMap<&str, usize> = FxHashMap::default();
        let mut counts: Vec<(String, u64)> = Vec::new();
        for t in types {
            if t.trim().is_empty() {
                continue;
            }
            match slot.get(t) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    slot.insert(t, counts.len());
                    counts.push((t.to_string(), 1));
                }
            }
        }
        // Stable sort keeps first-seen order among equal counts
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Self(counts)
    }

    pub fn get(&self, kind: &str) -> Option<u64> {
        self.0.iter().find(|(k, _)| k == kind).map(|(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, n)| (k.as_str(), *n))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TypeDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, count) in &self.0 {
            map.serialize_entry(kind, count)?;
        }
        map.end()
    }
}

/// Why a cell could not be used as a number.
#[derive(Debug, PartialEq, Eq)]
enum NumberError {
    NotNumeric,
    OutOfRange,
}

/// Smallest magnitude that survives rounding to `Decimal`'s 28 places.
const MIN_MAGNITUDE: f64 = 5e-29;

/// Parse one numeric cell. Plain and scientific notation are accepted.
fn parse_number(raw: &str) -> Result<Decimal, NumberError> {
    let s = raw.trim();
    // Decimal::from_str accepts digit separators
    if s.is_empty() || s.contains('_') {
        return Err(NumberError::NotNumeric);
    }
    if let Ok(d) = Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)) {
        return Ok(d);
    }

    let approx: f64 = s.parse().map_err(|_| NumberError::NotNumeric)?;
    if !approx.is_finite() {
        return Err(NumberError::NotNumeric);
    }
    if approx.abs() < MIN_MAGNITUDE {
        return Ok(Decimal::ZERO);
    }
    expand_exponent(s)
        .and_then(|plain| Decimal::from_str(&plain).ok())
        .ok_or(NumberError::OutOfRange)
}

/// Rewrite `1.23e-29` style text as plain positional notation.
fn expand_exponent(s: &str) -> Option<String> {
    let (mantissa, exp) = s.split_once(['e', 'E'])?;
    let exp: i64 = exp.parse().ok()?;
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{int}{frac}");
    let point = int.len() as i64 + exp;

    let plain = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, rest) = digits.split_at(point as usize);
        format!("{whole}.{rest}")
    };
    Some(format!("{sign}{plain}"))
}

/// Mean of one column, rounded to [`AVERAGE_DP`] places.
fn column_mean(table: &Table, col: usize, name: &str) -> Result<Decimal, IngestError> {
    let mut sum = Decimal::ZERO;
    for (i, row) in table.rows().iter().enumerate() {
        let raw = row.get(col).map(String::as_str).unwrap_or("");
        let value = parse_number(raw).map_err(|e| {
            let n = i + 1;
            IngestError::Parse(match e {
                NumberError::NotNumeric => {
                    format!("column '{name}' row {n}: could not convert '{raw}' to a number")
                }
                NumberError::OutOfRange => {
                    format!("column '{name}' row {n}: value '{raw}' is out of range")
                }
            })
        })?;
        sum = sum
            .checked_add(value)
            .ok_or_else(|| IngestError::Parse(format!("column '{name}': sum overflows")))?;
    }
    let mean = sum
        .checked_div(Decimal::from(table.len()))
        .ok_or_else(|| IngestError::Parse(format!("column '{name}': mean is undefined")))?;
    Ok(mean.round_dp_with_strategy(AVERAGE_DP, RoundingStrategy::MidpointAwayFromZero))
}

/// Compute the statistics payload for a validated table.
pub fn compute(table: &Table, columns: &Columns) -> Result<StatisticsPayload, IngestError> {
    if table.is_empty() {
        return Ok(StatisticsPayload::empty());
    }

    let average_flowrate = column_mean(table, columns.flowrate, FLOWRATE)?;
    let average_pressure = column_mean(table, columns.pressure, PRESSURE)?;
    let average_temperature = column_mean(table, columns.temperature, TEMPERATURE)?;
    let equipment_type_distribution = TypeDistribution::from_values(
        table
            .rows()
            .iter()
            .map(|row| row.get(columns.kind).map(String::as_str).unwrap_or("")),
    );

    Ok(StatisticsPayload {
        total_equipment_count: table.len() as u64,
        average_flowrate,
        average_pressure,
        average_temperature,
        equipment_type_distribution,
    })
}
