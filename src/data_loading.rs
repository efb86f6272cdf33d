use crate::config::SignalConfig;
use crate::report::{Extraction, ReportExtractor};
use crate::{Channel, SignalTable};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn read_signal_csv(path: &Path, config: &SignalConfig) -> Result<SignalTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open signal file: {}", path.display()))?;
    let table = parse_signal_csv(file, config)
        .with_context(|| format!("Failed to load signal file: {}", path.display()))?;
    info!(
        "Loaded {} rows x {} channels from {}",
        table.len(),
        table.channels().len(),
        path.display()
    );
    Ok(table)
}

/// Reads a header-first CSV into a [`SignalTable`]. Empty cells become NaN so
/// they show up as gaps; anything else that is not a number is an error.
pub fn parse_signal_csv<R: Read>(reader: R, config: &SignalConfig) -> Result<SignalTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column_index = |name: &str| -> Result<usize> {
        match headers.iter().position(|h| h == name) {
            Some(idx) => Ok(idx),
            None => bail!(
                "Column '{}' not found, available: {}",
                name,
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
        }
    };

    let time_idx = column_index(config.time_column.as_str())?;
    let channel_keys: Vec<String> = if config.channels.is_empty() {
        headers
            .iter()
            .filter(|h| !h.is_empty() && *h != config.time_column)
            .map(|h| h.to_string())
            .collect()
    } else {
        config.channels.clone()
    };
    let channel_idx = channel_keys
        .iter()
        .map(|k| column_index(k.as_str()))
        .collect::<Result<Vec<_>>>()?;
    debug!("Signal channels: {:?}", channel_keys);

    let mut time = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); channel_keys.len()];

    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed CSV record at row {}", row + 1))?;

        let parse_cell = |idx: usize, name: &str| -> Result<f64> {
            let cell = record.get(idx).unwrap_or("");
            if cell.is_empty() {
                return Ok(f64::NAN);
            }
            cell.parse::<f64>().with_context(|| {
                format!("Invalid number '{}' at row {}, column '{}'", cell, row + 1, name)
            })
        };

        time.push(parse_cell(time_idx, config.time_column.as_str())?);
        for ((values, &idx), key) in columns.iter_mut().zip(&channel_idx).zip(&channel_keys) {
            values.push(parse_cell(idx, key.as_str())?);
        }
    }

    let channels = channel_keys
        .into_iter()
        .zip(columns)
        .map(|(key, values)| Channel { key, values })
        .collect();
    SignalTable::new(time, channels)
}

/// Extracts metrics from a report file. A missing or unreadable file yields
/// the default record, the same as a report in which nothing matched.
pub fn read_report(path: &Path, extractor: &ReportExtractor) -> Extraction {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let extraction = extractor.extract(&text);
            let defaulted = extraction.defaulted_fields();
            if !defaulted.is_empty() {
                info!(
                    "{}: {} field(s) defaulted: {:?}",
                    path.display(),
                    defaulted.len(),
                    defaulted
                );
            }
            extraction
        }
        Err(e) => {
            warn!(
                "Could not read report {}: {}. Using default metrics",
                path.display(),
                e
            );
            extractor.extract("")
        }
    }
}

/// Report files under `dir` whose name ends with `suffix`, sorted by file name
/// so nights come out in recording order.
pub fn discover_reports(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut reports = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(suffix))
            .unwrap_or(false);
        if matches {
            debug!("Found report: {}", entry.path().display());
            reports.push(entry.into_path());
        }
    }

    reports.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(reports)
}
