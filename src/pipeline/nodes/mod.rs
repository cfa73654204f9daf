//! Built-in components.

pub mod event_logger;
pub mod file_source;
pub mod functionals;
pub mod signal;
pub mod spectrum;
pub mod stream_writer;
pub mod threshold;

pub use event_logger::EventLogger;
pub use file_source::{FileSensor, FileSource};
pub use functionals::{Functional, Functionals};
pub use signal::{SignalGenerator, SimulatedSensor, Waveform};
pub use spectrum::SpectrumTransformer;
pub use stream_writer::StreamWriter;
pub use threshold::ThresholdEventSender;
