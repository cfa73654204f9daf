//! Sigflow demo runner
//!
//! Builds a small pipeline around a simulated inertial sensor, runs it for a
//! few seconds and prints the stop report as JSON.
//!
//! ```text
//! sigflow [--config pipeline.toml] [--seconds 5] [--record acc.ssj] [--events events.jsonl]
//! ```
//!
//! Run `sigflow --help` for the full list of flags.
//!
//! `RUST_LOG` controls the log filter. With `SIGFLOW_LOG_DIR` set, logs are
//! also written to a daily rolling file in that directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sigflow_rs::pipeline::nodes::{
    EventLogger, Functional, Functionals, SignalGenerator, SimulatedSensor, SpectrumTransformer,
    StreamWriter, ThresholdEventSender, Waveform,
};
use sigflow_rs::pipeline::FrameSpec;
use sigflow_rs::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sigflow")]
#[command(version, about = "Run the sigflow demo pipeline", long_about = None)]
struct Args {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How long to run before stopping
    #[arg(short, long, default_value_t = 5.0)]
    seconds: f64,

    /// Record the accelerometer stream to this file
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Append detected events to this JSON-lines file
    #[arg(long, value_name = "PATH")]
    events: Option<PathBuf>,
}

fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sigflow_rs=debug"));
    let stdout_layer = tracing_subscriber::fmt::layer();

    match std::env::var_os("SIGFLOW_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sigflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}

fn build(pipeline: &mut Pipeline, args: &Args) -> Result<()> {
    let imu = pipeline.add_sensor(
        SimulatedSensor::new("imu").with_connect_delay(0.1),
        vec![
            Box::new(
                SignalGenerator::new("acc", 50.0, Waveform::Sine)
                    .with_dim(3)
                    .with_frequency(2.0),
            ),
            Box::new(
                SignalGenerator::new("gyro", 40.0, Waveform::Sine)
                    .with_frequency(0.5)
                    .with_amplitude(2.0),
            ),
        ],
    )?;
    let (acc, gyro) = (imu.providers[0], imu.providers[1]);

    pipeline.add_transformer(
        Functionals::new("stats").with_functionals(&[
            Functional::Mean,
            Functional::Std,
            Functional::Range,
        ]),
        &[acc, gyro],
        FrameSpec::new(1.0),
    )?;
    pipeline.add_transformer(
        SpectrumTransformer::new("acc-fft"),
        &[acc],
        FrameSpec::with_step(1.28, 0.64),
    )?;

    let detector = pipeline.add_consumer(
        ThresholdEventSender::new("gyro-peak", 0.5, 1.5).with_update_interval(0.25),
        &[gyro],
        FrameSpec::new(0.1),
    )?;
    let channel = pipeline.event_channel(detector)?;
    let mut logger = EventLogger::new("event-log");
    if let Some(path) = &args.events {
        logger = logger.with_file(path);
    }
    pipeline.register_event_listener(logger, channel)?;

    if let Some(path) = &args.record {
        pipeline.add_consumer(StreamWriter::new("acc-rec", path), &[acc], FrameSpec::new(0.5))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let _guard = init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    tracing::info!("Starting sigflow demo for {:.1}s", args.seconds);
    let mut pipeline = Pipeline::new(config);
    build(&mut pipeline, &args)?;
    pipeline.start()?;

    std::thread::sleep(Duration::from_secs_f64(args.seconds.max(0.0)));

    let report = pipeline.stop()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failures().next().is_some() {
        bail!("some components failed");
    }
    Ok(())
}
