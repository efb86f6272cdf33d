use crate::position::PositionCategory;
use crate::report::{MetricField, ReportMetrics};
use crate::session::Session;
use crate::window::FullSpan;
use crate::SignalView;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Builds `<dir>/<stem>_<suffix>.<ext>` from a prefix like `/out/results.csv`,
/// creating the directory if needed.
fn output_path(base_path: &str, suffix: &str) -> Result<PathBuf> {
    let path = Path::new(base_path);
    let dir = path.parent().unwrap_or(Path::new("."));

    // Create directory if it doesn't exist
    std::fs::create_dir_all(dir)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("csv");

    Ok(dir.join(format!("{}_{}.{}", stem, suffix, ext)))
}

/// Lowercase, underscores for anything that is not alphanumeric.
fn file_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// One row per session, side by side for comparison.
pub fn write_metrics_csv(base_path: &str, sessions: &[Session]) -> Result<PathBuf> {
    let full_path = output_path(base_path, "metrics")?;
    println!("Writing metrics to {}", full_path.display());
    let mut writer = csv::Writer::from_path(&full_path)?;

    let mut header = vec!["session"];
    header.extend(MetricField::ALL.iter().map(|f| f.key()));
    header.extend(["desat_events", "awakenings", "defaulted"]);
    writer.write_record(&header)?;

    for session in sessions {
        let m = session.metrics();
        let mut record = vec![session.label.clone()];
        record.extend(MetricField::ALL.iter().map(|f| m.get(*f).to_string()));
        record.push(m.desat_events.to_string());
        record.push(m.awakenings.to_string());
        record.push(
            session
                .extraction
                .defaulted_fields()
                .iter()
                .map(|f| f.key())
                .collect::<Vec<_>>()
                .join(";"),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(full_path)
}

pub fn write_window_csv(
    base_path: &str,
    session_label: &str,
    window_index: usize,
    view: &SignalView<'_>,
    positions: Option<&[PositionCategory]>,
) -> Result<PathBuf> {
    let suffix = format!("{}_window_{}", file_label(session_label), window_index);
    let full_path = output_path(base_path, &suffix)?;
    println!("Writing window to {}", full_path.display());

    let channels: Vec<(&str, &[f64])> = view.channels().collect();
    write_columns(
        &full_path,
        "time_s",
        view.time(),
        &channels,
        positions,
    )?;
    Ok(full_path)
}

pub fn write_full_span_csv(
    base_path: &str,
    session_label: &str,
    span: &FullSpan,
    positions: Option<&[PositionCategory]>,
) -> Result<PathBuf> {
    let suffix = format!("{}_fullnight", file_label(session_label));
    let full_path = output_path(base_path, &suffix)?;
    println!("Writing full night view to {}", full_path.display());

    let channels: Vec<(&str, &[f64])> = span
        .channels
        .iter()
        .map(|c| (c.key.as_str(), c.values.as_slice()))
        .collect();
    write_columns(&full_path, "time_h", &span.time_hours, &channels, positions)?;
    Ok(full_path)
}

fn write_columns(
    path: &Path,
    time_header: &str,
    time: &[f64],
    channels: &[(&str, &[f64])],
    positions: Option<&[PositionCategory]>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![time_header];
    header.extend(channels.iter().map(|(k, _)| *k));
    if positions.is_some() {
        header.push("position");
    }
    writer.write_record(&header)?;

    for (row, t) in time.iter().enumerate() {
        let mut record = vec![cell(*t)];
        record.extend(channels.iter().map(|(_, values)| cell(values[row])));
        if let Some(positions) = positions {
            record.push(
                positions
                    .get(row)
                    .map(|p| p.label().to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SessionMetrics<'a> {
    session: &'a str,
    metrics: &'a ReportMetrics,
    defaulted: Vec<&'static str>,
}

pub fn metrics_json(sessions: &[Session]) -> Result<String> {
    let rows: Vec<SessionMetrics> = sessions
        .iter()
        .map(|s| SessionMetrics {
            session: &s.label,
            metrics: s.metrics(),
            defaulted: s
                .extraction
                .defaulted_fields()
                .iter()
                .map(|f| f.key())
                .collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}
