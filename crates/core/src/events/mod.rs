use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{Atmosphere, SourceStatus, VisualMode};

/// Structured notifications emitted while the pipeline ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    BeatDetected {
        at_ms: u64,
        bass: f32,
        spike: f32,
    },
    TempoUpdated {
        bpm: f32,
        beats: usize,
    },
    AtmosphereChanged {
        from: Atmosphere,
        to: Atmosphere,
    },
    ModeSwitchRequested {
        from: VisualMode,
        to: VisualMode,
        automatic: bool,
    },
    TransitionCompleted {
        mode: VisualMode,
    },
    SourceStatusChanged {
        status: SourceStatus,
    },
    SignalCheck {
        detected: bool,
    },
}

pub type EventReceiver = Receiver<PipelineEvent>;

/// Optional outlet for [`PipelineEvent`]s. Events are dropped silently when
/// no receiver is listening.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Unbounded sink together with its receiving end.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self::from_sender(tx), rx)
    }

    pub fn from_sender(sender: Sender<PipelineEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
