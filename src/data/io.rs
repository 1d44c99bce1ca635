//! Flat CSV/JSON adapters for panel input and output records

use crate::data::panel::{Panel, PanelRow};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Read panel rows from a CSV file
///
/// Expected header: `instrument_id,date,open,high,low,close,volume,adj_close,is_suspended,sector_id`
pub fn read_panel_csv<P: AsRef<Path>>(path: P) -> Result<Vec<PanelRow>> {
    let file = fs::File::open(path.as_ref())?;
    let rows = read_csv_from(file)?;
    log::debug!("Read {} panel rows from {}", rows.len(), path.as_ref().display());
    Ok(rows)
}

/// Read a CSV file and build a panel with a calendar derived from its rows
pub fn load_panel_csv<P: AsRef<Path>>(path: P) -> Result<Panel> {
    Panel::builder().extend_rows(read_panel_csv(path)?).build()
}

/// Deserialize CSV records from any reader
pub fn read_csv_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Deserialize CSV records from a file
pub fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    read_csv_from(fs::File::open(path)?)
}

/// Serialize records as CSV into any writer
pub fn write_csv_to<T: Serialize, W: Write>(writer: W, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Serialize records as CSV into a file
pub fn write_csv<T: Serialize, P: AsRef<Path>>(path: P, records: &[T]) -> Result<()> {
    write_csv_to(fs::File::create(path.as_ref())?, records)?;
    log::debug!("Wrote {} records to {}", records.len(), path.as_ref().display());
    Ok(())
}

/// Write a value as pretty JSON
pub fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a JSON value
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
