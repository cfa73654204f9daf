//! # Sigflow-RS: multi-rate sensor stream pipeline
//!
//! A dataflow engine for periodic sensor streams. Sensors own providers that
//! sample at their own rates; transformers and consumers pull fixed-duration
//! windows from any number of those streams; components emit discrete events
//! that are fanned out to event handlers.
//!
//! ## Architecture
//!
//! - **Pipeline**: owns the component graph, compiles it into a start order
//!   and runs one worker thread per provider, stage and handler
//! - **Buffers**: one bounded ring per produced stream, read by independent
//!   cursors that wait with a timeout
//! - **Windows**: frame boundaries derived from the activation index, so a
//!   0.1 s frame at 44.1 kHz never drifts
//! - **Events**: bounded per-listener queues that drop the oldest event when
//!   a listener stalls
//! - **Sessions**: streams recorded to and replayed from SSJS files
//!
//! ## Configuration
//!
//! Run-time limits (buffer length, timeouts, queue sizes) live in
//! [`PipelineConfig`], loaded from TOML. Per-component settings are typed
//! [`Options`](config::Options) set by name before `start`.
//!
//! ## Example
//!
//! ```ignore
//! use sigflow_rs::pipeline::nodes::{Functionals, SignalGenerator, SimulatedSensor, Waveform};
//! use sigflow_rs::pipeline::FrameSpec;
//! use sigflow_rs::{Pipeline, PipelineConfig};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! let acc = pipeline.add_sensor(
//!     SimulatedSensor::new("imu"),
//!     vec![Box::new(SignalGenerator::new("acc", 50.0, Waveform::Sine).with_dim(3))],
//! )?;
//! pipeline.add_transformer(Functionals::new("stats"), &acc.providers, FrameSpec::new(1.0))?;
//! pipeline.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! let report = pipeline.stop()?;
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{Result, SigflowError};
pub use pipeline::{
    ComponentId, FrameSpec, Pipeline, PipelineError, PipelineState, Stream, StreamDescriptor,
};
pub use types::{SampleData, SampleType};
