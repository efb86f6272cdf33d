pub mod config;
pub mod data_loading;
pub mod output;
pub mod position;
pub mod report;
pub mod session;
pub mod window;

use anyhow::{bail, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub key: String,
    pub values: Vec<f64>,
}

/// Column-oriented recording of one session: a time column in seconds from
/// session start plus named channels, all of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalTable {
    time: Vec<f64>,
    channels: Vec<Channel>,
}

impl SignalTable {
    pub fn new(time: Vec<f64>, channels: Vec<Channel>) -> Result<Self> {
        for (i, channel) in channels.iter().enumerate() {
            if channel.values.len() != time.len() {
                bail!(
                    "Channel '{}' has {} samples, time column has {}",
                    channel.key,
                    channel.values.len(),
                    time.len()
                );
            }
            if channels[..i].iter().any(|c| c.key == channel.key) {
                bail!("Duplicate channel '{}'", channel.key);
            }
        }
        Ok(Self { time, channels })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, key: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.values.as_slice())
    }

    pub fn channel_keys(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.key.as_str())
    }

    /// Rows `[start, end)`, truncated to the table. A start past the end gives
    /// an empty view.
    pub fn view(&self, start: usize, end: usize) -> SignalView<'_> {
        let end_idx = end.min(self.len());
        let start_idx = start.min(end_idx);
        SignalView {
            table: self,
            start_idx,
            end_idx,
        }
    }

    pub fn all(&self) -> SignalView<'_> {
        self.view(0, self.len())
    }
}

/// Borrowed run of consecutive rows of a [`SignalTable`].
#[derive(Debug, Clone, Copy)]
pub struct SignalView<'a> {
    table: &'a SignalTable,
    pub start_idx: usize,
    pub end_idx: usize,
}

impl<'a> SignalView<'a> {
    pub fn time(&self) -> &'a [f64] {
        &self.table.time[self.start_idx..self.end_idx]
    }

    pub fn channel(&self, key: &str) -> Option<&'a [f64]> {
        self.table
            .channel(key)
            .map(|values| &values[self.start_idx..self.end_idx])
    }

    pub fn channels(&self) -> impl Iterator<Item = (&'a str, &'a [f64])> + 'a {
        let (table, start, end) = (self.table, self.start_idx, self.end_idx);
        table
            .channels
            .iter()
            .map(move |c| (c.key.as_str(), &c.values[start..end]))
    }

    pub fn len(&self) -> usize {
        self.end_idx - self.start_idx
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
