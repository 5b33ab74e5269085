//! Coarse mood detection on top of the smoothed feature stream.
//!
//! Every tick produces an instantaneous label from fixed thresholds. The
//! label is pushed into a bounded history and the plurality of that window
//! is what the rest of the pipeline sees, so a single loud frame cannot flip
//! the visual mode on its own.

use std::{collections::VecDeque, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{config::AtmosphereConfig, AtmoError, AudioFeatureState};

/// Mood labels, declared in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atmosphere {
    /// No live input attached.
    #[default]
    Ambient,
    Quiet,
    Calm,
    Bright,
    Energetic,
}

impl Atmosphere {
    pub const ALL: [Atmosphere; 5] = [
        Atmosphere::Ambient,
        Atmosphere::Quiet,
        Atmosphere::Calm,
        Atmosphere::Bright,
        Atmosphere::Energetic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Atmosphere::Ambient => "ambient",
            Atmosphere::Quiet => "quiet",
            Atmosphere::Calm => "calm",
            Atmosphere::Bright => "bright",
            Atmosphere::Energetic => "energetic",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Atmosphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Atmosphere {
    type Err = AtmoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Atmosphere::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AtmoError::msg(format!("unknown atmosphere `{s}`")))
    }
}

/// Instantaneous label for a single feature snapshot. First matching rule
/// wins.
pub fn classify_frame(features: &AudioFeatureState, config: &AtmosphereConfig) -> Atmosphere {
    if !features.enabled {
        Atmosphere::Ambient
    } else if features.rms < config.quiet_rms {
        Atmosphere::Quiet
    } else if features.bass > config.energetic_bass || features.energy > config.energetic_energy {
        Atmosphere::Energetic
    } else if features.treble > config.bright_treble && features.centroid > config.bright_centroid
    {
        Atmosphere::Bright
    } else {
        Atmosphere::Calm
    }
}

/// Bounded window of the most recent instantaneous labels.
#[derive(Debug, Clone)]
pub struct AtmosphereHistory {
    labels: VecDeque<Atmosphere>,
    capacity: usize,
}

impl AtmosphereHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, label: Atmosphere) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.labels.clear();
    }

    /// Most frequent label in the window.
    ///
    /// Counts are scanned in [`Atmosphere`] declaration order and only a
    /// strictly greater count replaces the current best, so on a tie the
    /// label declared first wins (`calm` beats `bright`, `quiet` beats
    /// `calm`). Returns `None` for an empty window.
    pub fn plurality(&self) -> Option<Atmosphere> {
        let mut counts = [0usize; Atmosphere::ALL.len()];
        for label in &self.labels {
            counts[label.index()] += 1;
        }

        let mut best = None;
        let mut best_count = 0;
        for label in Atmosphere::ALL {
            let count = counts[label.index()];
            if count > best_count {
                best = Some(label);
                best_count = count;
            }
        }
        best
    }
}

/// Classifier with temporal stabilisation.
#[derive(Debug, Clone)]
pub struct AtmosphereClassifier {
    config: AtmosphereConfig,
    history: AtmosphereHistory,
    stable: Atmosphere,
}

impl AtmosphereClassifier {
    pub fn new(config: AtmosphereConfig) -> Self {
        let history = AtmosphereHistory::new(config.history_capacity);
        Self {
            config,
            history,
            stable: Atmosphere::default(),
        }
    }

    /// Classifies the snapshot, records it and returns the stabilised label.
    pub fn update(&mut self, features: &AudioFeatureState) -> Atmosphere {
        let label = classify_frame(features, &self.config);
        self.history.push(label);
        self.stable = self.history.plurality().unwrap_or(label);
        self.stable
    }

    /// Stabilised label produced by the last update.
    pub fn current(&self) -> Atmosphere {
        self.stable
    }

    pub fn history(&self) -> &AtmosphereHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.stable = Atmosphere::default();
    }
}
