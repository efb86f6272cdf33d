use crate::config::Settings;
use crate::data_loading::{read_report, read_signal_csv};
use crate::report::{Extraction, ReportExtractor, ReportMetrics};
use crate::window::{FullSpan, SignalAccessor};
use crate::SignalTable;
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

/// Files that make up one recorded night.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSpec {
    pub label: String,
    pub report: Option<PathBuf>,
    /// Full-resolution signal table, used for windows.
    pub signals: Option<PathBuf>,
    /// Table already downsampled upstream, used as-is for the full night view.
    pub full_night: Option<PathBuf>,
}

/// One loaded night. Owns everything parsed from its files.
#[derive(Debug, Clone)]
pub struct Session {
    pub label: String,
    pub extraction: Extraction,
    pub signals: Option<SignalAccessor>,
    pub full_night: Option<SignalTable>,
}

impl Session {
    pub fn metrics(&self) -> &ReportMetrics {
        &self.extraction.metrics
    }

    /// Whole-night view: the pre-downsampled table when there is one,
    /// otherwise the full-resolution table thinned by `stride`.
    pub fn full_night_span(&self, stride: usize) -> Option<FullSpan> {
        match (&self.full_night, &self.signals) {
            (Some(table), _) => Some(FullSpan::from_table(table, 1)),
            (None, Some(accessor)) => Some(accessor.full_span(stride)),
            (None, None) => None,
        }
    }
}

pub fn default_label(index: usize) -> String {
    format!("Night {}", index + 1)
}

/// One spec per report, labelled from `labels` where given.
pub fn specs_for_reports(reports: Vec<PathBuf>, labels: &[String]) -> Vec<SessionSpec> {
    reports
        .into_iter()
        .enumerate()
        .map(|(i, report)| SessionSpec {
            label: labels.get(i).cloned().unwrap_or_else(|| default_label(i)),
            report: Some(report),
            ..SessionSpec::default()
        })
        .collect()
}

/// Loads one session. A missing report degrades to default metrics; signal
/// files that cannot be loaded are errors.
pub fn load_session(
    spec: &SessionSpec,
    settings: &Settings,
    extractor: &ReportExtractor,
) -> Result<Session> {
    let extraction = match &spec.report {
        Some(path) => read_report(path, extractor),
        None => extractor.extract(""),
    };

    let signals = match &spec.signals {
        Some(path) => {
            let table = read_signal_csv(path, &settings.signals)?;
            Some(SignalAccessor::new(table, &settings.signals)?)
        }
        None => None,
    };

    let full_night = spec
        .full_night
        .as_ref()
        .map(|path| read_signal_csv(path, &settings.signals))
        .transpose()?;

    info!(
        "Session '{}': AHI {:.1}, {} defaulted field(s), signals: {}",
        spec.label,
        extraction.metrics.ahi,
        extraction.defaulted_fields().len(),
        signals
            .as_ref()
            .map(|s| format!("{} rows", s.table().len()))
            .unwrap_or_else(|| "none".to_string())
    );

    Ok(Session {
        label: spec.label.clone(),
        extraction,
        signals,
        full_night,
    })
}

/// Loads sessions in the given order.
pub fn load_sessions(specs: &[SessionSpec], settings: &Settings) -> Result<Vec<Session>> {
    let extractor = settings.extractor()?;
    specs
        .iter()
        .map(|spec| {
            load_session(spec, settings, &extractor)
                .with_context(|| format!("Failed to load session '{}'", spec.label))
        })
        .collect()
}
