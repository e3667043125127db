use crate::error::Result;
use csv::ReaderBuilder;
use std::fs;
use std::path::Path;

/// Read a list of series URLs or product filters.
///
/// `.csv`/`.tsv` files contribute the first column of every row; anything else
/// is read as one entry per non-blank line.
pub fn read_identity_list(path: &Path) -> Result<Vec<String>> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if extension == "csv" || extension == "tsv" {
        let delimiter = if extension == "tsv" { b'\t' } else { b',' };
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_path(path)?;
        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            if let Some(first) = record.get(0).map(str::trim) {
                if !first.is_empty() {
                    entries.push(first.to_string());
                }
            }
        }
        return Ok(entries);
    }

    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
