//! Core library for the Atmo audio-reactive visualiser.
//!
//! Live audio arrives as byte-resolution spectrum frames once per display
//! refresh. The crate turns those frames into smoothed loudness and band
//! levels, beats and a tempo estimate, a stabilised atmosphere label, and
//! finally the crossfade state the renderer composites. Everything runs
//! synchronously inside a single tick; the only asynchronous step is
//! acquiring the capture source.

pub mod analysis;
pub mod atmosphere;
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod mapping;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod timeline;

pub use analysis::{
    beat::{BeatEvent, BeatHistory, BeatTracker},
    spectrum::ByteSpectrumAnalyser,
    AudioFeatureState, FeatureExtractor, RawFeatures,
};
pub use atmosphere::{Atmosphere, AtmosphereClassifier, AtmosphereHistory};
pub use audio::{AudioSource, SampleFrame, SourceSlot, SourceStatus};
pub use config::{AppConfig, AtmosphereConfig, BeatConfig, TransitionConfig};
pub use error::{AtmoError, Result};
pub use events::{EventReceiver, EventSink, PipelineEvent};
pub use mapping::ModeMapping;
pub use pipeline::{Pipeline, Visualiser};
pub use render::{Crossfade, FrameSink, FrameSnapshot};
pub use scene::{TransitionSpeed, VisualMode};
pub use timeline::{FrameClock, TransitionController, TransitionState};
