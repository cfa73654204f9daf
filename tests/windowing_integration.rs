//! Integration tests for multi-rate windowing
//!
//! Stages read fixed-duration frames from inputs of different rates. These
//! tests check frame lengths, contiguity across activations, overlapping
//! steps and transformer output rates end to end.

mod common;

use common::builders::{counter, pipeline_with, ConfigBuilder};
use common::mock_helpers::CollectingConsumer;
use common::test_timeout;
use sigflow_rs::pipeline::nodes::{Functional, Functionals, SignalGenerator, Waveform};
use sigflow_rs::FrameSpec;
use std::time::Duration;

#[test]
fn test_two_rates_share_one_frame_duration() {
    let (mut pipeline, sensor) = pipeline_with(
        ConfigBuilder::new().build(),
        vec![counter("fast", 50.0, 500), counter("slow", 40.0, 400)],
    );
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::new(1.0))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    pipeline.stop().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 10);
    for (k, window) in seen.iter().enumerate() {
        assert_eq!(window.activation, k as u64);
        assert_eq!(window.inputs[0].len(), 50);
        assert_eq!(window.inputs[1].len(), 40);
        // Counter values are absolute sample indices, so windows tile the stream
        assert_eq!(window.inputs[0][0], (k * 50) as f64);
        assert_eq!(window.inputs[1][0], (k * 40) as f64);
        assert_eq!(window.inputs[1][39], (k * 40 + 39) as f64);
        common::assert_float_eq(window.time, k as f64, 1e-9);
    }
}

#[test]
fn test_fractional_frames_do_not_drift() {
    // 0.15 s at 30 Hz is 4.5 samples: frames alternate between 5 and 4
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 30.0, 90)]);
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::new(0.15))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    pipeline.stop().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 20);
    let total: usize = seen.iter().map(|w| w.inputs[0].len()).sum();
    assert_eq!(total, 90);

    let values: Vec<f64> = seen.iter().flat_map(|w| w.inputs[0].clone()).collect();
    let expected: Vec<f64> = (0..90).map(f64::from).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_overlapping_frames_advance_by_step() {
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 10.0, 40)]);
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::with_step(1.0, 0.5))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    pipeline.stop().unwrap();

    // Windows start every 5 samples; the last full one starts at 30
    let seen = seen.lock();
    let starts: Vec<f64> = seen.iter().map(|w| w.inputs[0][0]).collect();
    assert_eq!(starts, vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0]);
    assert!(seen.iter().all(|w| w.inputs[0].len() == 10));
}

#[test]
fn test_transformer_output_rate_follows_step() {
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 100.0, 1000)]);
    let stats = pipeline
        .add_transformer(
            Functionals::new("stats").with_functionals(&[Functional::Mean, Functional::Max]),
            &sensor.providers,
            FrameSpec::new(0.5),
        )
        .unwrap();
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    // Two output samples per second, read one second at a time
    pipeline
        .add_consumer(sink, &[stats], FrameSpec::new(1.0))
        .unwrap();

    pipeline.start().unwrap();
    let rate = pipeline.plan().and_then(|plan| plan.output_rate(stats));
    assert_eq!(rate, Some(2.0));
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();
    assert_eq!(report.total_lost_samples(), 0);

    let seen = seen.lock();
    assert_eq!(seen.len(), 10);
    // Dimension 0 is the mean of each half second of the counter
    assert_eq!(seen[0].inputs[0], vec![24.5, 74.5]);
    assert_eq!(seen[9].inputs[0], vec![924.5, 974.5]);
}

#[test]
fn test_offline_source_through_transformer_loses_nothing() {
    // 400 transformer outputs against a 200-sample output buffer and a reader
    // much slower than the unpaced source
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 100.0, 400)]);
    let mean = pipeline
        .add_transformer(
            Functionals::new("mean").with_functionals(&[Functional::Mean]),
            &sensor.providers,
            FrameSpec::new(0.01),
        )
        .unwrap();
    let sink = CollectingConsumer::new("slow").slow(Duration::from_millis(10));
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &[mean], FrameSpec::new(0.1))
        .unwrap();

    pipeline.start().unwrap();
    let capacity = pipeline.plan().and_then(|plan| plan.node(mean)).map(|n| n.capacity);
    assert_eq!(capacity, Some(200));
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();

    assert_eq!(report.total_lost_samples(), 0);
    assert_eq!(report.by_name("slow").map(|c| c.counters.activations), Some(40));
    assert_eq!(report.by_name("mean").map(|c| c.counters.overruns), Some(0));

    let values: Vec<f64> = seen.lock().iter().flat_map(|w| w.inputs[0].clone()).collect();
    assert_eq!(values, (0..400).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn test_realtime_overrun_counts_exactly_the_missed_samples() {
    // 200 Hz for one second into a 20-sample buffer, read 10 samples per 100 ms
    let config = ConfigBuilder::new().buffer_secs(0.1).build();
    let (mut pipeline, sensor) = pipeline_with(
        config,
        vec![Box::new(
            SignalGenerator::new("live", 200.0, Waveform::Counter).with_limit(200),
        )],
    );
    let sink = CollectingConsumer::new("slow").slow(Duration::from_millis(100));
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::new(0.05))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();

    let delivered: Vec<u64> = seen
        .lock()
        .iter()
        .flat_map(|w| w.inputs[0].iter().map(|&v| v as u64))
        .collect();
    assert!(delivered.windows(2).all(|pair| pair[0] < pair[1]));
    let last = *delivered.last().unwrap();
    let missed = (0..=last).filter(|i| !delivered.contains(i)).count() as u64;

    let lost = report.by_name("slow").map_or(0, |c| c.lost_samples);
    assert!(lost > 0);
    assert_eq!(lost, missed);
    assert_eq!(report.by_name("live").map(|c| c.counters.overruns > 0), Some(true));
}
