//! Schema check for equipment telemetry tables

use crate::error::IngestError;
use crate::table::Table;

pub const EQUIPMENT_NAME: &str = "Equipment Name";
pub const TYPE: &str = "Type";
pub const FLOWRATE: &str = "Flowrate";
pub const PRESSURE: &str = "Pressure";
pub const TEMPERATURE: &str = "Temperature";

/// Columns every upload must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 5] = [EQUIPMENT_NAME, TYPE, FLOWRATE, PRESSURE, TEMPERATURE];

/// Positions of the required columns in a validated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub equipment_name: usize,
    pub kind: usize,
    pub flowrate: usize,
    pub pressure: usize,
    pub temperature: usize,
}

/// Check that `table` has every required column. Extra columns are ignored,
/// and a table with no rows passes.
pub fn validate(table: &Table) -> Result<Columns, IngestError> {
    let found = REQUIRED_COLUMNS.map(|name| table.column(name));
    match found {
        [Some(equipment_name), Some(kind), Some(flowrate), Some(pressure), Some(temperature)] => {
            Ok(Columns {
                equipment_name,
                kind,
                flowrate,
                pressure,
                temperature,
            })
        }
        _ => Err(IngestError::Schema {
            missing: REQUIRED_COLUMNS
                .iter()
                .zip(found)
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name.to_string())
                .collect(),
        }),
    }
}
