use serde::{Deserialize, Serialize};

use crate::{timeline::TransitionState, Atmosphere, Result, VisualMode};

/// One rendered layer and the opacity it is composited with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub mode: VisualMode,
    pub alpha: f32,
}

/// Layers the renderer has to draw this frame, bottom first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crossfade {
    pub base: Layer,
    pub overlay: Option<Layer>,
}

impl Crossfade {
    /// Base layer at full opacity, incoming layer eased in with a
    /// smoothstep over the transition progress.
    pub fn from_state(state: &TransitionState) -> Self {
        Self {
            base: Layer {
                mode: state.current_mode,
                alpha: 1.0,
            },
            overlay: state.next_mode.map(|mode| Layer {
                mode,
                alpha: smoothstep(state.progress),
            }),
        }
    }

    pub fn layers(&self) -> impl Iterator<Item = Layer> {
        std::iter::once(self.base).chain(self.overlay)
    }
}

/// Cubic ease of `t` clamped to [0, 1].
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Read-only view of one tick handed to the renderer and the HUD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub time_ms: u64,
    pub energy: f32,
    pub atmosphere: Atmosphere,
    pub current_mode: VisualMode,
    pub next_mode: Option<VisualMode>,
    pub progress: f32,
    pub crossfade: Crossfade,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// `None` while no tempo has been estimated.
    pub bpm: Option<f32>,
    pub beat_pulse: f32,
    /// Whether a beat was detected on this tick.
    pub beat: bool,
    pub source_attached: bool,
}

/// Consumer of frame snapshots, typically a renderer or a telemetry view.
pub trait FrameSink {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()>;
}
