//! Builders for pipeline configs and small test graphs

use sigflow_rs::pipeline::nodes::{SignalGenerator, SimulatedSensor, Waveform};
use sigflow_rs::pipeline::{Provider, SensorHandle};
use sigflow_rs::{Pipeline, PipelineConfig};

/// Builder for a `PipelineConfig` with short timeouts
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig {
                connect_timeout_ms: 500,
                drain_timeout_ms: 2000,
                join_timeout_ms: 500,
                provider_tick_ms: 5,
                ..PipelineConfig::default()
            },
        }
    }

    pub fn buffer_secs(mut self, seconds: f64) -> Self {
        self.config.buffer_size_secs = seconds;
        self
    }

    pub fn drain_timeout_ms(mut self, ms: u64) -> Self {
        self.config.drain_timeout_ms = ms;
        self
    }

    pub fn join_timeout_ms(mut self, ms: u64) -> Self {
        self.config.join_timeout_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn event_queue(mut self, capacity: usize, push_timeout_ms: u64) -> Self {
        self.config.event_queue_capacity = capacity;
        self.config.event_push_timeout_ms = push_timeout_ms;
        self
    }

    pub fn fatal_processing_errors(mut self) -> Self {
        self.config.fatal_processing_errors = true;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Unpaced counter generator producing `limit` samples at `rate`
pub fn counter(name: &str, rate: f64, limit: u64) -> Box<dyn Provider> {
    Box::new(
        SignalGenerator::new(name, rate, Waveform::Counter)
            .with_limit(limit)
            .unpaced(),
    )
}

/// Pipeline with one simulated sensor owning `providers`
pub fn pipeline_with(
    config: PipelineConfig,
    providers: Vec<Box<dyn Provider>>,
) -> (Pipeline, SensorHandle) {
    let mut pipeline = Pipeline::new(config);
    let handle = pipeline
        .add_sensor(SimulatedSensor::new("sim"), providers)
        .expect("sensor accepted while configured");
    (pipeline, handle)
}
