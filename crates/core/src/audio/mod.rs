//! Boundary with the audio capture collaborator.
//!
//! Capture backends implement [`AudioSource`]. Acquiring one may block on a
//! permission prompt or device handshake, so [`SourceSlot::request`] runs the
//! connector on a helper thread and the tick loop polls for the outcome
//! without waiting. Until a source is attached the pipeline keeps ticking in
//! its decay mode.

use std::{thread, time::Duration};

use flume::{Receiver, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::{AtmoError, Result};

/// Byte-resolution analysis arrays refreshed once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFrame {
    /// Magnitudes per frequency bin, 0..=255.
    pub frequency: Vec<u8>,
    /// Waveform bytes, 128 is the zero line.
    pub time_domain: Vec<u8>,
}

impl SampleFrame {
    /// Silent frame with `bin_count` frequency bins and twice as many
    /// waveform bytes.
    pub fn new(bin_count: usize) -> Self {
        Self {
            frequency: vec![0; bin_count],
            time_domain: vec![128; bin_count * 2],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.frequency.len()
    }

    pub fn frequency_sum(&self) -> u64 {
        self.frequency.iter().map(|byte| u64::from(*byte)).sum()
    }

    /// Peak-to-peak excursion of the waveform bytes.
    pub fn waveform_span(&self) -> u8 {
        let min = self.time_domain.iter().min().copied().unwrap_or(128);
        let max = self.time_domain.iter().max().copied().unwrap_or(128);
        max - min
    }

    /// False when the frame is dead silent in both domains, which usually
    /// means a muted or wrong input device.
    pub fn has_signal(&self) -> bool {
        self.frequency_sum() > 0 || self.waveform_span() >= 2
    }
}

/// A live capture backend.
pub trait AudioSource: Send {
    /// Overwrites `frame` with the most recent analysis window.
    fn read_frame(&mut self, frame: &mut SampleFrame);

    /// Human readable name used in logs.
    fn describe(&self) -> String {
        "audio source".to_string()
    }
}

/// Outcome of a connector run on the helper thread.
pub type Connection = Result<Box<dyn AudioSource>>;

/// Lifecycle of the capture source as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Detached,
    Pending,
    Attached,
    /// Acquisition failed; stays here until the next explicit request.
    Unavailable(String),
}

/// Owns the capture source and its acquisition handshake.
#[derive(Default)]
pub struct SourceSlot {
    status: SourceStatus,
    source: Option<Box<dyn AudioSource>>,
    pending: Option<Receiver<Connection>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &SourceStatus {
        &self.status
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Starts a single acquisition attempt. Ignored while one is pending or
    /// a source is already attached.
    pub fn request<F>(&mut self, connect: F) -> bool
    where
        F: FnOnce() -> Connection + Send + 'static,
    {
        if matches!(self.status, SourceStatus::Pending | SourceStatus::Attached) {
            return false;
        }

        let (tx, rx) = flume::bounded(1);
        let spawned = thread::Builder::new()
            .name("atmo-source".to_string())
            .spawn(move || {
                let _ = tx.send(connect());
            });

        match spawned {
            Ok(_) => {
                tracing::info!("requesting audio source");
                self.pending = Some(rx);
                self.status = SourceStatus::Pending;
            }
            Err(err) => self.fail(&AtmoError::Io(err)),
        }
        true
    }

    /// Attaches an already connected source.
    pub fn attach(&mut self, source: Box<dyn AudioSource>) {
        tracing::info!(source = %source.describe(), "audio source attached");
        self.pending = None;
        self.source = Some(source);
        self.status = SourceStatus::Attached;
    }

    /// Drops the source; the pipeline falls back to decay mode.
    pub fn detach(&mut self) -> bool {
        let had_source = self.source.take().is_some();
        let was_pending = self.pending.take().is_some();
        if had_source || was_pending {
            tracing::info!("audio source detached");
            self.status = SourceStatus::Detached;
            true
        } else {
            false
        }
    }

    /// Collects the outcome of a pending request. Returns the new status
    /// exactly once when it changes.
    pub fn poll(&mut self) -> Option<SourceStatus> {
        let outcome = match self.pending.as_ref()?.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(AtmoError::SourceUnavailable(
                "connector exited without a result".to_string(),
            )),
        };

        match outcome {
            Ok(source) => self.attach(source),
            Err(err) => self.fail(&err),
        }
        Some(self.status.clone())
    }

    /// Reads the current frame into `frame`. Returns false when no source
    /// is attached.
    pub fn read(&mut self, frame: &mut SampleFrame) -> bool {
        match self.source.as_mut() {
            Some(source) => {
                source.read_frame(frame);
                true
            }
            None => false,
        }
    }

    fn fail(&mut self, err: &AtmoError) {
        tracing::warn!(error = %err, "audio source unavailable");
        self.pending = None;
        self.source = None;
        self.status = SourceStatus::Unavailable(err.to_string());
    }
}

impl std::fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSlot")
            .field("status", &self.status)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

/// One-off check that an attached source actually delivers signal.
#[derive(Debug, Clone)]
pub struct SignalProbe {
    delay: Duration,
    due_at: Option<Duration>,
}

impl SignalProbe {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            due_at: None,
        }
    }

    /// Schedules the check relative to the attach time.
    pub fn arm(&mut self, attached_at: Duration) {
        self.due_at = Some(attached_at + self.delay);
    }

    pub fn disarm(&mut self) {
        self.due_at = None;
    }

    /// Inspects `frame` once the delay has elapsed. Returns whether signal
    /// was found, or `None` when the check is not due.
    pub fn check(&mut self, now: Duration, frame: &SampleFrame) -> Option<bool> {
        let due_at = self.due_at?;
        if now < due_at {
            return None;
        }
        self.due_at = None;

        let detected = frame.has_signal();
        if detected {
            tracing::info!("audio signal detected");
        } else {
            tracing::warn!(
                frequency_sum = frame.frequency_sum(),
                waveform_span = frame.waveform_span(),
                "no audio detected; the input may be muted or the wrong device"
            );
        }
        Some(detected)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    struct Constant(u8);

    impl AudioSource for Constant {
        fn read_frame(&mut self, frame: &mut SampleFrame) {
            frame.frequency.fill(self.0);
        }
    }

    fn wait_for(slot: &mut SourceSlot) -> SourceStatus {
        let started = Instant::now();
        loop {
            if let Some(status) = slot.poll() {
                return status;
            }
            assert!(started.elapsed() < Duration::from_secs(5), "connector never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn detached_slot_reads_nothing() {
        let mut slot = SourceSlot::new();
        let mut frame = SampleFrame::new(8);
        assert!(!slot.read(&mut frame));
        assert_eq!(slot.status(), &SourceStatus::Detached);
        assert_eq!(slot.poll(), None);
    }

    #[test]
    fn successful_request_attaches() {
        let mut slot = SourceSlot::new();
        assert!(slot.request(|| Ok(Box::new(Constant(7)) as Box<dyn AudioSource>)));
        assert_eq!(slot.status(), &SourceStatus::Pending);
        assert_eq!(wait_for(&mut slot), SourceStatus::Attached);

        let mut frame = SampleFrame::new(8);
        assert!(slot.read(&mut frame));
        assert_eq!(frame.frequency_sum(), 56);
        // Already attached: a second request is ignored.
        assert!(!slot.request(|| Err(AtmoError::msg("unused"))));
    }

    #[test]
    fn failed_request_reports_unavailable_once() {
        let mut slot = SourceSlot::new();
        slot.request(|| Err(AtmoError::SourceUnavailable("permission denied".to_string())));
        match wait_for(&mut slot) {
            SourceStatus::Unavailable(reason) => assert!(reason.contains("permission denied")),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(slot.poll(), None);
        assert!(!slot.is_attached());

        // An explicit retry is allowed.
        assert!(slot.request(|| Ok(Box::new(Constant(1)) as Box<dyn AudioSource>)));
        assert_eq!(wait_for(&mut slot), SourceStatus::Attached);
    }

    #[test]
    fn panicking_connector_counts_as_unavailable() {
        let mut slot = SourceSlot::new();
        slot.request(|| panic!("driver crashed"));
        assert!(matches!(wait_for(&mut slot), SourceStatus::Unavailable(_)));
    }

    #[test]
    fn detach_returns_to_decay_mode() {
        let mut slot = SourceSlot::new();
        slot.attach(Box::new(Constant(3)));
        assert!(slot.detach());
        assert_eq!(slot.status(), &SourceStatus::Detached);
        assert!(!slot.read(&mut SampleFrame::new(4)));
        assert!(!slot.detach());
    }

    #[test]
    fn signal_detection_uses_both_domains() {
        let mut frame = SampleFrame::new(4);
        assert!(!frame.has_signal());
        frame.time_domain[0] = 129;
        assert!(!frame.has_signal());
        frame.time_domain[1] = 127;
        assert!(frame.has_signal());

        let mut frame = SampleFrame::new(4);
        frame.frequency[2] = 1;
        assert!(frame.has_signal());
    }

    #[test]
    fn probe_fires_once_after_delay() {
        let mut probe = SignalProbe::new(Duration::from_millis(500));
        let frame = SampleFrame::new(4);
        assert_eq!(probe.check(Duration::from_secs(1), &frame), None);

        probe.arm(Duration::from_millis(1_000));
        assert_eq!(probe.check(Duration::from_millis(1_499), &frame), None);
        assert_eq!(probe.check(Duration::from_millis(1_500), &frame), Some(false));
        assert_eq!(probe.check(Duration::from_millis(2_000), &frame), None);
    }
}
