//! Interchange file codec
//!
//! The exporter and importer share one CSV layout:
//! `RoleName,PolicyName,PolicyType,PolicyDocument`, with the policy document
//! stored as a single quoted JSON cell.

use super::types::{PolicyRow, SyncError};

/// Header row, in column order
pub const HEADER: [&str; 4] = ["RoleName", "PolicyName", "PolicyType", "PolicyDocument"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Serialize rows, header first
pub fn write_rows(rows: &[PolicyRow]) -> Result<Vec<u8>, SyncError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    // Written explicitly so an empty export still carries the header
    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| SyncError::Interchange(e.to_string()))
}

/// Parse an interchange file
pub fn read_rows(content: &[u8]) -> Result<Vec<PolicyRow>, SyncError> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = HEADER
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::Interchange(format!(
            "missing columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: PolicyRow = record?;
        rows.push(row);
    }

    Ok(rows)
}
