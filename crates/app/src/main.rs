mod synth;
mod telemetry;

use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use atmo_core::{
    AppConfig, EventReceiver, EventSink, FrameSink, TransitionSpeed, Visualiser, VisualMode,
};
use clap::{Args, Parser, Subcommand};
use synth::{SynthClock, SynthSettings, SynthSource};
use telemetry::{log_event, Telemetry};
use tracing_subscriber::EnvFilter;

fn main() -> atmo_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            seconds,
            fps,
            every_ms,
            json,
            session,
        } => run_live(&session, seconds, fps, Duration::from_millis(every_ms), json),
        Commands::Simulate {
            seconds,
            fps,
            every_ms,
            json,
            session,
        } => run_simulation(&session, seconds, fps, Duration::from_millis(every_ms), json),
        Commands::Config => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run_live(
    session: &SessionArgs,
    seconds: f32,
    fps: u32,
    every: Duration,
    json: bool,
) -> atmo_core::Result<()> {
    tracing::info!(seconds, fps, bpm = session.bpm, "starting live mode");

    let config = session.load_config()?;
    let (mut visualiser, events) = session.build(&config)?;
    visualiser.request_source({
        let config = config.clone();
        let settings = session.synth(SynthClock::Realtime, Duration::from_millis(150));
        move || SynthSource::connect(config, settings)
    });

    let mut sink = Telemetry::stdout(every, json);
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let total = Duration::from_secs_f32(seconds.max(0.0));
    let started = Instant::now();

    loop {
        let frame_started = Instant::now();
        let now = started.elapsed();
        if now > total {
            break;
        }

        let snapshot = visualiser.tick(now);
        drain(&events);
        sink.present(&snapshot)?;

        thread::sleep(frame_period.saturating_sub(frame_started.elapsed()));
    }
    Ok(())
}

fn run_simulation(
    session: &SessionArgs,
    seconds: f32,
    fps: u32,
    every: Duration,
    json: bool,
) -> atmo_core::Result<()> {
    tracing::info!(seconds, fps, bpm = session.bpm, "running simulation");

    let config = session.load_config()?;
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let (mut visualiser, events) = session.build(&config)?;
    visualiser.request_source({
        let config = config.clone();
        let settings = session.synth(SynthClock::Stepped(frame_period), Duration::ZERO);
        move || SynthSource::connect(config, settings)
    });

    let mut sink = Telemetry::stdout(every, json);
    let frames = (seconds.max(0.0) * fps as f32).ceil() as u32;
    for index in 0..frames {
        let snapshot = visualiser.tick(frame_period * index);
        drain(&events);
        sink.present(&snapshot)?;
    }

    let pipeline = visualiser.pipeline();
    tracing::info!(
        atmosphere = %pipeline.atmosphere(),
        mode = %pipeline.transition().current_mode,
        bpm = pipeline.features().bpm,
        beats = pipeline.beat_tracker().history().len(),
        "simulation finished"
    );
    Ok(())
}

/// Logs every event queued since the last tick.
fn drain(events: &EventReceiver) {
    for event in events.try_iter() {
        log_event(&event);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualiser driven by atmosphere detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the pipeline in real time against the synthetic source.
    Run {
        /// How long to run for.
        #[arg(long, default_value_t = 20.0)]
        seconds: f32,
        /// Target frame rate of the tick loop.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Print a snapshot every this many milliseconds.
        #[arg(long, default_value_t = 250)]
        every_ms: u64,
        /// Emit snapshots as JSON lines.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Drive the pipeline on a virtual clock as fast as possible.
    Simulate {
        #[arg(long, default_value_t = 30.0)]
        seconds: f32,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        #[arg(long, default_value_t = 500)]
        every_ms: u64,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Print the default configuration as JSON.
    Config,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Show this mode and turn automatic switching off.
    #[arg(short, long)]
    mode: Option<VisualMode>,
    /// Crossfade preset: fast, normal or slow.
    #[arg(short, long)]
    transition: Option<TransitionSpeed>,
    /// Tempo of the synthetic kick pattern.
    #[arg(long, default_value_t = 124.0)]
    bpm: f32,
    /// Make the source handshake fail, as if permission were denied.
    #[arg(long)]
    deny_source: bool,
}

impl SessionArgs {
    fn load_config(&self) -> atmo_core::Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load(path),
            None => Ok(AppConfig::live_defaults()),
        }
    }

    fn build(
        &self,
        config: &AppConfig,
    ) -> atmo_core::Result<(Visualiser, EventReceiver)> {
        let (sink, events) = EventSink::channel();
        let mut visualiser = Visualiser::new(config)?.with_events(sink);
        let pipeline = visualiser.pipeline_mut();
        if let Some(speed) = self.transition {
            pipeline.set_transition_speed(speed);
        }
        if let Some(mode) = self.mode {
            pipeline.set_automatic_mode(false);
            pipeline.request_switch(mode);
        }
        Ok((visualiser, events))
    }

    fn synth(&self, clock: SynthClock, handshake: Duration) -> SynthSettings {
        SynthSettings {
            bpm: self.bpm,
            clock,
            handshake,
            deny: self.deny_source,
        }
    }
}
