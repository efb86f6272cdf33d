use crate::report::{FieldRule, MetricField, ReportExtractor, ValueParser};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Windowed,  // 30 s windows at full resolution (default)
    FullNight, // whole session, downsampled
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windowed" => Ok(ViewMode::Windowed),
            "fullnight" | "full-night" => Ok(ViewMode::FullNight),
            _ => Err(format!(
                "Invalid view: {}. Use 'windowed' (default) or 'fullnight'",
                s
            )),
        }
    }
}

/// Extract sleep-report metrics and browse overnight signal recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing session reports or path to a single report
    #[arg(help = "Directory containing session reports or path to a single report")]
    pub input_path: PathBuf,

    /// Session labels in report order (defaults to Night 1, Night 2, ...)
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Full-resolution signal CSV
    #[arg(long)]
    pub signals: Option<PathBuf>,

    /// Pre-downsampled signal CSV used for the full night view
    #[arg(long)]
    pub signals_fullnight: Option<PathBuf>,

    /// Session (0-based, in report order) the signal files belong to
    #[arg(long, default_value = "0")]
    pub signal_session: usize,

    /// JSON settings file (signal layout, report patterns and defaults)
    #[arg(long, env = "SLEEP_STUDY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Signal view to print: windowed or fullnight
    #[arg(long, default_value = "windowed")]
    pub view: ViewMode,

    /// Window index for the windowed view
    #[arg(long, default_value = "0")]
    pub window: usize,

    /// Keep every Nth row when the full night view is built from the full-resolution table
    #[arg(long, default_value = "50")]
    pub stride: usize,

    /// CSV output file prefix (e.g. /path/to/output/prefix)
    #[arg(long)]
    pub csv_output: Option<String>,

    /// Print metrics as JSON
    #[arg(long)]
    pub json: bool,
}

/// Layout of a signal table and its windowing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalConfig {
    pub time_column: String,
    /// Channel columns to load; empty means every column except time.
    pub channels: Vec<String>,
    pub samples_per_window: usize,
    pub sampling_rate_hz: f64,
    /// Tilt-angle channel used for position classification.
    pub position_channel: Option<String>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            time_column: "time".to_string(),
            channels: Vec::new(),
            samples_per_window: 300,
            sampling_rate_hz: 10.0,
            position_channel: Some("PosAngle_deg".to_string()),
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_window == 0 {
            bail!("samples_per_window must be greater than zero");
        }
        if !(self.sampling_rate_hz.is_finite() && self.sampling_rate_hz > 0.0) {
            bail!(
                "sampling_rate_hz must be a positive number, got {}",
                self.sampling_rate_hz
            );
        }
        if self.channels.iter().any(|c| *c == self.time_column) {
            bail!("Time column '{}' listed as a channel", self.time_column);
        }
        Ok(())
    }

    pub fn window_seconds(&self) -> f64 {
        self.samples_per_window as f64 / self.sampling_rate_hz
    }
}

/// Partial replacement of a built-in report rule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverride {
    pub pattern: Option<String>,
    pub parser: Option<ValueParser>,
    pub default: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub signals: SignalConfig,
    /// Per-field overrides keyed by field name, e.g. `"ahi"`.
    pub report: BTreeMap<MetricField, FieldOverride>,
    /// File name suffix identifying report files in a session directory.
    pub report_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            signals: SignalConfig::default(),
            report: BTreeMap::new(),
            report_suffix: "SASReport.csv".to_string(),
        }
    }
}

impl Settings {
    /// Built-in settings, or the given JSON file layered over them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings: {}", path.display()))?;
                Self::from_json(&text)
                    .with_context(|| format!("Invalid settings file: {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.signals.validate()?;
        self.extractor()?;
        Ok(())
    }

    /// Built-in rules with this file's overrides applied.
    pub fn report_rules(&self) -> Vec<FieldRule> {
        let mut rules = FieldRule::builtin();
        for rule in rules.iter_mut() {
            if let Some(o) = self.report.get(&rule.field) {
                if let Some(pattern) = &o.pattern {
                    rule.pattern = pattern.clone();
                }
                if let Some(parser) = o.parser {
                    rule.parser = parser;
                }
                if let Some(default) = o.default {
                    rule.default = default;
                }
            }
        }
        rules
    }

    pub fn extractor(&self) -> Result<ReportExtractor> {
        ReportExtractor::new(self.report_rules())
    }
}
