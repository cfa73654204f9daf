//! Simulated device: a sensor that connects through the rendezvous and
//! signal generators producing sine, ramp, counter or constant streams.

use crate::config::options::keys;
use crate::config::Options;
use crate::pipeline::component::{
    ConnectContext, Pacing, ProcessContext, Provider, ProviderStatus, Sensor,
};
use crate::pipeline::error::ComponentError;
use crate::pipeline::rendezvous::WaitOutcome;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::types::SampleType;
use std::f64::consts::PI;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const CONNECT_DELAY: &str = "connectDelay";
const PRESENT: &str = "present";

/// Longest single wait on the rendezvous; a missed notify costs at most this
const CONNECT_POLL: Duration = Duration::from_millis(20);

/// A device whose readiness is signalled from a callback thread after
/// `connectDelay` seconds.
pub struct SimulatedSensor {
    name: String,
    options: Options,
    connected: bool,
}

impl SimulatedSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new()
                .float(CONNECT_DELAY, 0.0, "Seconds until the device reports ready")
                .bool(PRESENT, true, "Whether the device answers at all"),
            connected: false,
        }
    }

    pub fn with_connect_delay(mut self, seconds: f64) -> Self {
        self.options.preset(CONNECT_DELAY, seconds);
        self
    }

    /// A sensor whose device never shows up
    pub fn absent(mut self) -> Self {
        self.options.preset(PRESENT, false);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Sensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self, ctx: &mut ConnectContext) -> Result<(), ComponentError> {
        if !self.options.get_bool(PRESENT)? {
            return Err(ComponentError::NotFound(self.name.clone()));
        }
        let delay = Duration::from_secs_f64(self.options.get_float(CONNECT_DELAY)?.max(0.0));

        let ready = Arc::new(AtomicBool::new(false));
        let rendezvous = ctx.rendezvous();
        {
            let ready = ready.clone();
            thread::Builder::new()
                .name(format!("{}-callback", self.name))
                .spawn(move || {
                    thread::sleep(delay);
                    ready.store(true, Ordering::Release);
                    rendezvous.notify();
                })?;
        }

        let deadline = Instant::now() + ctx.timeout();
        loop {
            if ready.load(Ordering::Acquire) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ComponentError::Timeout(ctx.timeout()));
            }
            if ctx.rendezvous().wait(CONNECT_POLL.min(deadline - now)) == WaitOutcome::TimedOut {
                debug!("Sensor '{}' still waiting for its device", self.name);
            }
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ComponentError> {
        self.connected = false;
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}

/// Shape of a generated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    /// Sawtooth from `offset` to `offset + amplitude`
    Ramp,
    /// The absolute sample index
    Counter,
    Constant,
}

impl Waveform {
    pub const NAMES: &'static [&'static str] = &["sine", "ramp", "counter", "constant"];

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Ramp => "ramp",
            Waveform::Counter => "counter",
            Waveform::Constant => "constant",
        }
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "ramp" => Ok(Waveform::Ramp),
            "counter" => Ok(Waveform::Counter),
            "constant" => Ok(Waveform::Constant),
            other => Err(format!("unknown waveform '{}'", other)),
        }
    }
}

const WAVEFORM: &str = "waveform";
const FREQUENCY: &str = "frequency";
const AMPLITUDE: &str = "amplitude";
const OFFSET: &str = "offset";
const DIM: &str = "dim";
const LIMIT: &str = "limit";
const PACED: &str = "paced";
const SAMPLE_TYPE: &str = "sampleType";
const SAMPLE_TYPES: &[&str] = &["bool", "byte", "short", "int", "long", "float", "double"];

/// Settings read once per run
#[derive(Debug, Clone, Copy)]
struct Signal {
    waveform: Waveform,
    rate: f64,
    frequency: f64,
    amplitude: f64,
    offset: f64,
    dim: usize,
    limit: Option<u64>,
}

impl Signal {
    fn value(&self, index: u64, d: usize) -> f64 {
        let t = index as f64 / self.rate;
        match self.waveform {
            // Each dimension is shifted by a quarter period
            Waveform::Sine => {
                self.offset
                    + self.amplitude * (2.0 * PI * self.frequency * t + d as f64 * PI / 2.0).sin()
            }
            Waveform::Ramp => self.offset + self.amplitude * (self.frequency * t).fract(),
            Waveform::Counter => index as f64,
            Waveform::Constant => self.offset,
        }
    }
}

/// Provider generating a synthetic signal.
///
/// Options: `sampleRate`, `bufferSize`, `waveform`, `frequency`,
/// `amplitude`, `offset`, `dim`, `sampleType`, `limit` (samples, 0 for
/// endless) and `paced`.
pub struct SignalGenerator {
    name: String,
    options: Options,
    signal: Option<Signal>,
    produced: u64,
}

impl SignalGenerator {
    pub fn new(name: impl Into<String>, sample_rate: f64, waveform: Waveform) -> Self {
        let mut options = Options::new()
            .float(keys::SAMPLE_RATE, 50.0, "Output rate in Hz")
            .float(keys::BUFFER_SIZE, 0.0, "Seconds of buffered output, 0 for the default")
            .choice(WAVEFORM, Waveform::NAMES, "sine", "Signal shape")
            .float(FREQUENCY, 1.0, "Signal frequency in Hz")
            .float(AMPLITUDE, 1.0, "Peak amplitude")
            .float(OFFSET, 0.0, "Constant offset")
            .int(DIM, 1, "Values per sample")
            .choice(SAMPLE_TYPE, SAMPLE_TYPES, "float", "Element type")
            .int(LIMIT, 0, "Samples to produce before running dry, 0 for endless")
            .bool(PACED, true, "Follow the wall clock instead of downstream demand");
        options.preset(keys::SAMPLE_RATE, sample_rate);
        options.preset(WAVEFORM, waveform.name());
        Self {
            name: name.into(),
            options,
            signal: None,
            produced: 0,
        }
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.options.preset(DIM, dim as i64);
        self
    }

    pub fn with_limit(mut self, samples: u64) -> Self {
        self.options.preset(LIMIT, samples as i64);
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.options.preset(SAMPLE_TYPE, sample_type.name());
        self
    }

    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.options.preset(FREQUENCY, hz);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.options.preset(AMPLITUDE, amplitude);
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.options.preset(OFFSET, offset);
        self
    }

    pub fn with_buffer_size(mut self, seconds: f64) -> Self {
        self.options.preset(keys::BUFFER_SIZE, seconds);
        self
    }

    /// Produce as fast as readers consume
    pub fn unpaced(mut self) -> Self {
        self.options.preset(PACED, false);
        self
    }

    fn read_signal(&self) -> Result<Signal, ComponentError> {
        let limit = self.options.get_int(LIMIT)?;
        Ok(Signal {
            waveform: self
                .options
                .get_text(WAVEFORM)?
                .parse()
                .map_err(ComponentError::Failed)?,
            rate: self.options.get_float(keys::SAMPLE_RATE)?,
            frequency: self.options.get_float(FREQUENCY)?,
            amplitude: self.options.get_float(AMPLITUDE)?,
            offset: self.options.get_float(OFFSET)?,
            dim: self.options.get_usize(DIM)?,
            limit: (limit > 0).then_some(limit as u64),
        })
    }
}

impl Provider for SignalGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Result<StreamDescriptor, ComponentError> {
        let signal = self.read_signal()?;
        let sample_type = self
            .options
            .get_text(SAMPLE_TYPE)?
            .parse::<SampleType>()
            .map_err(ComponentError::Failed)?;
        let labels = (0..signal.dim).map(|d| format!("{}_{}", self.name, d));
        Ok(StreamDescriptor::new(signal.rate, signal.dim, sample_type).with_labels(labels))
    }

    fn enter(&mut self, _output: &StreamDescriptor) -> Result<(), ComponentError> {
        self.signal = Some(self.read_signal()?);
        self.produced = 0;
        Ok(())
    }

    fn process(
        &mut self,
        output: &mut Stream,
        _ctx: &ProcessContext,
    ) -> Result<ProviderStatus, ComponentError> {
        let signal = self
            .signal
            .ok_or_else(|| ComponentError::failed("process called before enter"))?;
        let remaining = signal
            .limit
            .map_or(u64::MAX, |limit| limit.saturating_sub(self.produced));
        let filled = (output.num() as u64).min(remaining) as usize;

        let dim = signal.dim;
        let data = output.data_mut();
        for i in 0..filled {
            let index = self.produced + i as u64;
            for d in 0..dim {
                data.set_f64(i * dim + d, signal.value(index, d));
            }
        }
        self.produced += filled as u64;

        if signal.limit.is_some_and(|limit| self.produced >= limit) {
            Ok(ProviderStatus::Exhausted { filled })
        } else {
            Ok(ProviderStatus::Ready)
        }
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        debug!("Generator '{}' produced {} samples", self.name, self.produced);
        self.signal = None;
        Ok(())
    }

    fn pacing(&self) -> Pacing {
        match self.options.get_bool(PACED) {
            Ok(false) => Pacing::Unpaced,
            _ => Pacing::Realtime,
        }
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rendezvous::Rendezvous;

    fn run_block(generator: &mut SignalGenerator, n: usize) -> (Stream, ProviderStatus) {
        let descriptor = Arc::new(generator.descriptor().unwrap());
        generator.enter(&descriptor).unwrap();
        let mut stream = Stream::new(descriptor, n);
        let ctx = ProcessContext::new("test", 0, 0.0, &[], None);
        let status = generator.process(&mut stream, &ctx).unwrap();
        (stream, status)
    }

    #[test]
    fn test_counter_and_limit() {
        let mut generator = SignalGenerator::new("c", 10.0, Waveform::Counter).with_limit(3);
        let (stream, status) = run_block(&mut generator, 5);
        assert_eq!(status, ProviderStatus::Exhausted { filled: 3 });
        assert_eq!(stream.column_f64(0)[..3], [0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_descriptor_follows_options() {
        let mut generator = SignalGenerator::new("acc", 25.0, Waveform::Sine).with_dim(3);
        generator.options_mut().unwrap().set_str("sampleType", "double").unwrap();
        let descriptor = generator.descriptor().unwrap();
        assert_eq!(descriptor.sample_rate, 25.0);
        assert_eq!(descriptor.dim, 3);
        assert_eq!(descriptor.sample_type, SampleType::Double);
        assert_eq!(descriptor.label(2), "acc_2");
    }

    #[test]
    fn test_builders_land_in_options() {
        let generator = SignalGenerator::new("g", 8.0, Waveform::Ramp)
            .with_dim(2)
            .with_limit(16)
            .with_sample_type(SampleType::Short)
            .with_frequency(0.5)
            .with_amplitude(3.0)
            .with_offset(-1.0)
            .with_buffer_size(2.0)
            .unpaced();
        let opts = generator.options().unwrap();
        assert_eq!(opts.get_float(keys::SAMPLE_RATE).unwrap(), 8.0);
        assert_eq!(opts.get_text(WAVEFORM).unwrap(), "ramp");
        assert_eq!(opts.get_int(DIM).unwrap(), 2);
        assert_eq!(opts.get_int(LIMIT).unwrap(), 16);
        assert_eq!(opts.get_text(SAMPLE_TYPE).unwrap(), "short");
        assert_eq!(opts.get_float(FREQUENCY).unwrap(), 0.5);
        assert_eq!(opts.get_float(AMPLITUDE).unwrap(), 3.0);
        assert_eq!(opts.get_float(OFFSET).unwrap(), -1.0);
        assert_eq!(opts.get_float(keys::BUFFER_SIZE).unwrap(), 2.0);
        assert!(!opts.get_bool(PACED).unwrap());
    }

    #[test]
    fn test_sine_values() {
        let mut generator = SignalGenerator::new("s", 4.0, Waveform::Sine).with_amplitude(2.0);
        let (stream, status) = run_block(&mut generator, 4);
        assert_eq!(status, ProviderStatus::Ready);
        let values = stream.column_f64(0);
        assert!((values[1] - 2.0).abs() < 1e-6);
        assert!((values[3] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_absent_sensor_fails_fast() {
        let mut sensor = SimulatedSensor::new("ghost").absent();
        let mut ctx = ConnectContext::new("ghost", Rendezvous::new(), Duration::from_secs(5));
        assert!(matches!(sensor.connect(&mut ctx), Err(ComponentError::NotFound(_))));
    }

    #[test]
    fn test_sensor_connects_after_delay() {
        let mut sensor = SimulatedSensor::new("dev").with_connect_delay(0.02);
        let mut ctx = ConnectContext::new("dev", Rendezvous::new(), Duration::from_secs(2));
        sensor.connect(&mut ctx).unwrap();
        assert!(sensor.is_connected());
    }

    #[test]
    fn test_sensor_times_out() {
        let mut sensor = SimulatedSensor::new("slow").with_connect_delay(1.0);
        let mut ctx = ConnectContext::new("slow", Rendezvous::new(), Duration::from_millis(30));
        assert!(matches!(sensor.connect(&mut ctx), Err(ComponentError::Timeout(_))));
    }
}
