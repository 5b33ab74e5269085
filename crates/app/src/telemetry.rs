use std::{
    io::{self, Write},
    time::Duration,
};

use atmo_core::{FrameSink, FrameSnapshot, PipelineEvent, Result};

/// Prints one snapshot per interval, either as a HUD-style line or as JSON.
pub struct Telemetry<W: Write> {
    out: W,
    every: Duration,
    next_at: Duration,
    json: bool,
}

impl Telemetry<io::Stdout> {
    pub fn stdout(every: Duration, json: bool) -> Self {
        Self::new(io::stdout(), every, json)
    }
}

impl<W: Write> Telemetry<W> {
    pub fn new(out: W, every: Duration, json: bool) -> Self {
        Self {
            out,
            every,
            next_at: Duration::ZERO,
            json,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for Telemetry<W> {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()> {
        let at = Duration::from_millis(frame.time_ms);
        if at < self.next_at {
            return Ok(());
        }
        self.next_at = at + self.every;

        if self.json {
            serde_json::to_writer(&mut self.out, frame)?;
            writeln!(self.out)?;
        } else {
            writeln!(self.out, "{}", hud_line(frame))?;
        }
        Ok(())
    }
}

/// One-line summary in the style of the on-screen HUD.
pub fn hud_line(frame: &FrameSnapshot) -> String {
    let mode = match frame.next_mode {
        Some(next) => format!(
            "{} -> {} {:>3.0}%",
            frame.current_mode,
            next,
            frame.progress * 100.0
        ),
        None => frame.current_mode.to_string(),
    };
    let bpm = frame
        .bpm
        .map_or_else(|| "--".to_string(), |bpm| format!("{bpm:.0}"));
    format!(
        "{:>7.2}s  {:<9}  {:<24}  energy {:.2}  bass {:.3}  mid {:.3}  treble {:.3}  bpm {:>3}{}",
        frame.time_ms as f64 / 1_000.0,
        frame.atmosphere,
        mode,
        frame.energy,
        frame.bass,
        frame.mid,
        frame.treble,
        bpm,
        if frame.beat_pulse > 0.5 { "  *" } else { "" },
    )
}

/// Forwards pipeline events to the log.
pub fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::BeatDetected { at_ms, bass, spike } => {
            tracing::debug!(at_ms, bass, spike, "beat");
        }
        PipelineEvent::TempoUpdated { bpm, beats } => {
            tracing::debug!(bpm, beats, "tempo updated");
        }
        PipelineEvent::AtmosphereChanged { from, to } => {
            tracing::info!(%from, %to, "atmosphere changed");
        }
        PipelineEvent::ModeSwitchRequested {
            from,
            to,
            automatic,
        } => {
            tracing::info!(%from, %to, automatic, "mode switch requested");
        }
        PipelineEvent::TransitionCompleted { mode } => {
            tracing::info!(%mode, "transition completed");
        }
        PipelineEvent::SourceStatusChanged { status } => {
            tracing::info!(?status, "source status changed");
        }
        PipelineEvent::SignalCheck { detected } => {
            tracing::debug!(detected, "signal check finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use atmo_core::{render::Layer, Atmosphere, Crossfade, VisualMode};

    use super::*;

    fn snapshot(time_ms: u64) -> FrameSnapshot {
        FrameSnapshot {
            time_ms,
            energy: 0.5,
            atmosphere: Atmosphere::Bright,
            current_mode: VisualMode::Orbit,
            next_mode: Some(VisualMode::Pulse),
            progress: 0.25,
            crossfade: Crossfade {
                base: Layer {
                    mode: VisualMode::Orbit,
                    alpha: 1.0,
                },
                overlay: None,
            },
            bass: 0.1,
            mid: 0.2,
            treble: 0.3,
            bpm: None,
            beat_pulse: 0.0,
            beat: false,
            source_attached: true,
        }
    }

    #[test]
    fn hud_line_shows_transition_and_missing_tempo() {
        let line = hud_line(&snapshot(1_500));
        assert!(line.contains("bright"));
        assert!(line.contains("orbit -> pulse  25%"));
        assert!(line.contains("bpm  --"));
    }

    #[test]
    fn prints_once_per_interval() {
        let mut telemetry = Telemetry::new(Vec::new(), Duration::from_millis(500), true);
        for time_ms in [0, 100, 499, 500, 900, 1_000] {
            telemetry.present(&snapshot(time_ms)).unwrap();
        }
        let out = String::from_utf8(telemetry.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["atmosphere"], "bright");
        assert_eq!(first["bpm"], serde_json::Value::Null);
    }
}
