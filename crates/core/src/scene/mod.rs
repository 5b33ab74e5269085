use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::AtmoError;

/// Generative visual modes the renderer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    /// Concentric rings with floating shapes.
    #[default]
    Orbit,
    /// Energy-driven particle field.
    Particles,
    /// Slowly breathing grid.
    Lattice,
    /// Radial spikes that flash on the beat.
    Pulse,
}

impl VisualMode {
    pub const ALL: [VisualMode; 4] = [
        VisualMode::Orbit,
        VisualMode::Particles,
        VisualMode::Lattice,
        VisualMode::Pulse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisualMode::Orbit => "orbit",
            VisualMode::Particles => "particles",
            VisualMode::Lattice => "lattice",
            VisualMode::Pulse => "pulse",
        }
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualMode {
    type Err = AtmoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VisualMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AtmoError::msg(format!("unknown visual mode `{s}`")))
    }
}

/// Preset crossfade lengths offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSpeed {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl TransitionSpeed {
    /// Crossfade length in seconds.
    pub fn seconds(self) -> f32 {
        match self {
            TransitionSpeed::Fast => 1.0,
            TransitionSpeed::Normal => 1.8,
            TransitionSpeed::Slow => 2.8,
        }
    }
}

impl FromStr for TransitionSpeed {
    type Err = AtmoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(TransitionSpeed::Fast),
            "normal" => Ok(TransitionSpeed::Normal),
            "slow" => Ok(TransitionSpeed::Slow),
            other => Err(AtmoError::msg(format!(
                "unknown transition speed `{other}`"
            ))),
        }
    }
}
