use crate::config::SignalConfig;
use crate::position::{classify_all, PositionCategory};
use crate::{Channel, SignalTable, SignalView};
use anyhow::Result;
use log::debug;
use serde::Serialize;
use std::fmt;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Fixed-size windows and a thinned full-session view over one signal table.
///
/// Windows are cut by row count only. Time values are carried for display and
/// never used to decide where a window starts or ends.
#[derive(Debug, Clone)]
pub struct SignalAccessor {
    table: SignalTable,
    samples_per_window: usize,
    sampling_rate_hz: f64,
    position_channel: Option<String>,
}

impl SignalAccessor {
    pub fn new(table: SignalTable, config: &SignalConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Windowing {} rows into {}-sample windows ({} s)",
            table.len(),
            config.samples_per_window,
            config.window_seconds()
        );
        Ok(Self {
            table,
            samples_per_window: config.samples_per_window,
            sampling_rate_hz: config.sampling_rate_hz,
            position_channel: config.position_channel.clone(),
        })
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    pub fn samples_per_window(&self) -> usize {
        self.samples_per_window
    }

    /// Rows `[index*W, (index+1)*W)`. Past the end this returns whatever is
    /// left, possibly nothing; the index is not validated.
    pub fn get_window(&self, index: usize) -> SignalView<'_> {
        let w = self.samples_per_window;
        let start = index.checked_mul(w).unwrap_or(usize::MAX);
        self.table.view(start, start.saturating_add(w))
    }

    /// Number of complete windows. A trailing partial window is not counted,
    /// although `get_window` still returns it.
    pub fn window_count(&self) -> usize {
        self.table.len() / self.samples_per_window
    }

    /// Highest index a navigator may land on.
    pub fn max_window_index(&self) -> usize {
        self.window_count().saturating_sub(1)
    }

    /// Nominal span of a window in seconds from session start.
    pub fn window_bounds_seconds(&self, index: usize) -> (f64, f64) {
        let w = self.samples_per_window as f64 / self.sampling_rate_hz;
        (index as f64 * w, (index as f64 + 1.0) * w)
    }

    pub fn window_label(&self, index: usize) -> WindowLabel {
        let (start_s, end_s) = self.window_bounds_seconds(index);
        WindowLabel {
            index,
            start_s,
            end_s,
            total: self.window_count(),
        }
    }

    /// Every `stride`-th row of the session, time in hours. Plain thinning,
    /// no anti-alias filter. A stride of 0 is treated as 1.
    pub fn full_span(&self, stride: usize) -> FullSpan {
        FullSpan::from_table(&self.table, stride)
    }

    /// Full span thinned to at most `target` rows.
    pub fn full_span_with_target(&self, target: usize) -> FullSpan {
        self.full_span(stride_for_target(self.table.len(), target))
    }

    /// Position of every sample in `view`, if a position channel is
    /// configured and present.
    pub fn positions(&self, view: &SignalView<'_>) -> Option<Vec<PositionCategory>> {
        let key = self.position_channel.as_deref()?;
        view.channel(key).map(classify_all)
    }

    pub fn position_channel(&self) -> Option<&str> {
        self.position_channel.as_deref()
    }
}

/// Smallest stride that brings `len` rows down to at most `target`.
pub fn stride_for_target(len: usize, target: usize) -> usize {
    if target == 0 || len <= target {
        1
    } else {
        (len + target - 1) / target
    }
}

/// Moves `current` by `delta` windows, clamped to `[0, window_count - 1]`.
pub fn step_window(current: usize, delta: isize, window_count: usize) -> usize {
    let max = window_count.saturating_sub(1);
    let next = if delta < 0 {
        current.saturating_sub(delta.unsigned_abs())
    } else {
        current.saturating_add(delta as usize)
    };
    next.min(max)
}

/// Downsampled whole-session view with time converted to hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullSpan {
    pub stride: usize,
    pub time_hours: Vec<f64>,
    pub channels: Vec<Channel>,
}

impl FullSpan {
    /// Thins `table` by `stride`. Pass 1 for a table that was already
    /// downsampled upstream.
    pub fn from_table(table: &SignalTable, stride: usize) -> Self {
        let stride = stride.max(1);
        let time_hours = table
            .time()
            .iter()
            .step_by(stride)
            .map(|t| t / SECONDS_PER_HOUR)
            .collect();
        let channels = table
            .channels()
            .iter()
            .map(|c| Channel {
                key: c.key.clone(),
                values: c.values.iter().step_by(stride).copied().collect(),
            })
            .collect();
        Self {
            stride,
            time_hours,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.time_hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_hours.is_empty()
    }

    pub fn channel(&self, key: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.values.as_slice())
    }

    pub fn positions(&self, position_channel: &str) -> Option<Vec<PositionCategory>> {
        self.channel(position_channel).map(classify_all)
    }
}

/// Navigation indicator, e.g. `Window 3 (60-90s) of 120`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLabel {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub total: usize,
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Window {} ({}-{}s) of {}",
            self.index + 1,
            self.start_s,
            self.end_s,
            self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessor(rows: usize, window: usize) -> SignalAccessor {
        let time: Vec<f64> = (0..rows).map(|i| i as f64 / 10.0).collect();
        let angle = (0..rows).map(|i| if i % 2 == 0 { 0.0 } else { 90.0 }).collect();
        let table = SignalTable::new(
            time,
            vec![Channel {
                key: "PosAngle_deg".to_string(),
                values: angle,
            }],
        )
        .unwrap();
        let config = SignalConfig {
            samples_per_window: window,
            ..SignalConfig::default()
        };
        SignalAccessor::new(table, &config).unwrap()
    }

    #[test]
    fn partial_window_is_returned_but_not_counted() {
        let acc = accessor(650, 300);
        assert_eq!(acc.window_count(), 2);
        assert_eq!(acc.max_window_index(), 1);

        let tail = acc.get_window(acc.window_count());
        assert_eq!(tail.len(), 50);
        assert_eq!(tail.start_idx, 600);
        assert!(acc.get_window(3).is_empty());
    }

    #[test]
    fn huge_index_is_empty() {
        let acc = accessor(10, 3);
        assert!(acc.get_window(usize::MAX).is_empty());
    }

    #[test]
    fn empty_table() {
        let acc = accessor(0, 300);
        assert_eq!(acc.window_count(), 0);
        assert_eq!(acc.max_window_index(), 0);
        assert!(acc.get_window(0).is_empty());
        assert!(acc.full_span(10).is_empty());
    }

    #[test]
    fn rejects_zero_window_size() {
        let table = SignalTable::default();
        let config = SignalConfig {
            samples_per_window: 0,
            ..SignalConfig::default()
        };
        assert!(SignalAccessor::new(table, &config).is_err());
    }

    #[test]
    fn full_span_thins_and_converts_to_hours() {
        let acc = accessor(36_000, 300);
        let span = acc.full_span(600);

        assert_eq!(span.len(), 60);
        assert_eq!(span.time_hours[0], 0.0);
        assert_eq!(span.time_hours[1], 60.0 / 3600.0);
        // rows 0, 600, ... are all even, so all supine
        let positions = span.positions("PosAngle_deg").unwrap();
        assert!(positions.iter().all(|p| *p == PositionCategory::Supine));
    }

    #[test]
    fn full_span_keeps_raw_values() {
        let acc = accessor(5, 2);
        let span = acc.full_span(0);
        assert_eq!(span.stride, 1);
        assert_eq!(span.channel("PosAngle_deg").unwrap(), &[0.0, 90.0, 0.0, 90.0, 0.0]);
    }

    #[test]
    fn target_count_picks_stride() {
        assert_eq!(stride_for_target(900, 300), 3);
        assert_eq!(stride_for_target(901, 300), 4);
        assert_eq!(stride_for_target(10, 300), 1);
        assert_eq!(stride_for_target(10, 0), 1);
        assert!(accessor(1000, 300).full_span_with_target(300).len() <= 300);
    }

    #[test]
    fn window_positions() {
        let acc = accessor(600, 300);
        let view = acc.get_window(1);
        let positions = acc.positions(&view).unwrap();
        assert_eq!(positions.len(), 300);
        assert_eq!(positions[0], PositionCategory::Supine);
        assert_eq!(positions[1], PositionCategory::Right);
    }

    #[test]
    fn navigation_clamps() {
        assert_eq!(step_window(0, -1, 5), 0);
        assert_eq!(step_window(3, 10, 5), 4);
        assert_eq!(step_window(12, -10, 30), 2);
        assert_eq!(step_window(2, 1, 0), 0);
    }

    #[test]
    fn label_matches_indicator() {
        let acc = accessor(900, 300);
        assert_eq!(acc.window_label(1).to_string(), "Window 2 (30-60s) of 3");
    }
}
