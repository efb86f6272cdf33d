use serde::Serialize;
use std::fmt;

/// Body position derived from the tilt-angle channel.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize)]
pub enum PositionCategory {
    Supine,
    Left,
    Right,
    Prone,
}

impl PositionCategory {
    pub const ALL: [PositionCategory; 4] = [
        PositionCategory::Left,
        PositionCategory::Supine,
        PositionCategory::Right,
        PositionCategory::Prone,
    ];

    /// Bands in degrees: `[-45, 45]` supine, `(45, 135]` right,
    /// `[-135, -45)` left, anything else (including NaN) prone.
    pub fn classify(angle: f64) -> Self {
        if (-45.0..=45.0).contains(&angle) {
            PositionCategory::Supine
        } else if angle > 45.0 && angle <= 135.0 {
            PositionCategory::Right
        } else if (-135.0..-45.0).contains(&angle) {
            PositionCategory::Left
        } else {
            PositionCategory::Prone
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PositionCategory::Supine => "Supine",
            PositionCategory::Left => "Left",
            PositionCategory::Right => "Right",
            PositionCategory::Prone => "Prone",
        }
    }

    /// Y level used by the position track: Left 1, Supine 2, Right 3, Prone 4.
    pub fn plot_level(self) -> u8 {
        match self {
            PositionCategory::Left => 1,
            PositionCategory::Supine => 2,
            PositionCategory::Right => 3,
            PositionCategory::Prone => 4,
        }
    }

    fn slot(self) -> usize {
        self.plot_level() as usize - 1
    }
}

impl fmt::Display for PositionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify_position(angle: f64) -> PositionCategory {
    PositionCategory::classify(angle)
}

pub fn classify_all(angles: &[f64]) -> Vec<PositionCategory> {
    angles.iter().map(|&a| PositionCategory::classify(a)).collect()
}

/// Sample counts per position over a window or span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionBreakdown {
    counts: [usize; 4],
}

impl PositionBreakdown {
    pub fn from_positions(positions: &[PositionCategory]) -> Self {
        let mut counts = [0; 4];
        for p in positions {
            counts[p.slot()] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn count(&self, position: PositionCategory) -> usize {
        self.counts[position.slot()]
    }

    /// Share of samples in `position`, 0-100. Zero for an empty breakdown.
    pub fn percent(&self, position: PositionCategory) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(position) as f64 * 100.0 / total as f64
    }

    pub fn dominant(&self) -> Option<PositionCategory> {
        PositionCategory::ALL
            .into_iter()
            .filter(|p| self.count(*p) > 0)
            .max_by_key(|p| self.count(*p))
    }
}
