//! Integration tests for the pipeline lifecycle
//!
//! These tests validate the start/stop/reset state machine:
//! - Connect failures leave a restartable graph
//! - Stop is idempotent and reports every component
//! - A failing or panicking component ends only its own worker
//! - Workers that ignore shutdown are abandoned, not waited on forever

mod common;

use common::builders::{counter, pipeline_with, ConfigBuilder};
use common::mock_helpers::{
    CollectingConsumer, FailingSensor, PanickingConsumer, StubbornConsumer,
};
use common::test_timeout;
use sigflow_rs::pipeline::nodes::{SignalGenerator, SimulatedSensor, Waveform};
use sigflow_rs::pipeline::{ComponentKind, WorkerOutcome};
use sigflow_rs::{FrameSpec, Pipeline, PipelineError, PipelineState};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn test_connect_failure_leaves_pipeline_configured() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build());
    let good = pipeline
        .add_sensor(SimulatedSensor::new("good"), vec![counter("ok", 10.0, 100)])
        .unwrap();
    let consumer = CollectingConsumer::new("sink");
    let (entered, exited) = consumer.hooks();
    pipeline
        .add_consumer(consumer, &good.providers, FrameSpec::new(1.0))
        .unwrap();
    pipeline.add_sensor(FailingSensor::new("bad"), vec![]).unwrap();

    let err = pipeline.start().unwrap_err();
    match err {
        PipelineError::Connect { component, .. } => assert_eq!(component, "bad"),
        other => panic!("expected a connect error, got {other}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Configured);
    assert_eq!(pipeline.live_workers(), 0);

    // Whatever entered before the failure was exited again
    assert_eq!(
        entered.load(Ordering::SeqCst),
        exited.load(Ordering::SeqCst)
    );
}

#[test]
fn test_absent_sensor_can_be_fixed_and_restarted() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build());
    let imu = pipeline
        .add_sensor(SimulatedSensor::new("imu").absent(), vec![counter("acc", 50.0, 50)])
        .unwrap();
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &imu.providers, FrameSpec::new(0.1))
        .unwrap();

    assert!(matches!(
        pipeline.start(),
        Err(PipelineError::Connect { .. })
    ));

    pipeline.set_option(imu.sensor, "present", true).unwrap();
    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 10);
    assert!(seen.iter().all(|w| w.inputs[0].len() == 5));
    let total: usize = seen.iter().map(|w| w.inputs[0].len()).sum();
    assert_eq!(total, 50);
    assert_eq!(seen[9].inputs[0], vec![45.0, 46.0, 47.0, 48.0, 49.0]);
    assert_eq!(report.total_lost_samples(), 0);
    assert_eq!(
        report.by_name("acc").and_then(|c| c.outcome.clone()),
        Some(WorkerOutcome::Exhausted)
    );
    assert_eq!(
        report.by_name("imu").map(|c| c.kind),
        Some(ComponentKind::Sensor)
    );
}

#[test]
fn test_stop_is_idempotent_and_reset_allows_restart() {
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 100.0, 200)]);
    let sink = CollectingConsumer::new("sink");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::new(0.5))
        .unwrap();

    for _ in 0..2 {
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        assert!(pipeline.wait_until_finished(test_timeout()));

        let first = pipeline.stop().unwrap();
        let second = pipeline.stop().unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.live_workers(), 0);
        assert_eq!(seen.lock().len(), 4);

        pipeline.reset().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }
}

#[test]
fn test_graph_is_frozen_while_running() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build());
    let sensor = pipeline
        .add_sensor(
            SimulatedSensor::new("sim"),
            vec![Box::new(SignalGenerator::new("sine", 100.0, Waveform::Sine))],
        )
        .unwrap();
    pipeline.start().unwrap();

    let err = pipeline
        .add_consumer(CollectingConsumer::new("late"), &sensor.providers, FrameSpec::new(0.1))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidState {
            operation: "add_consumer",
            state: PipelineState::Running
        }
    ));
    assert!(matches!(
        pipeline.set_option(sensor.providers[0], "frequency", 2.0),
        Err(PipelineError::InvalidState { .. })
    ));
    assert!(matches!(
        pipeline.start(),
        Err(PipelineError::InvalidState { .. })
    ));
    assert!(matches!(
        pipeline.reset(),
        Err(PipelineError::InvalidState { .. })
    ));

    let report = pipeline.stop().unwrap();
    assert_eq!(
        report.by_name("sine").and_then(|c| c.outcome.clone()),
        Some(WorkerOutcome::Stopped)
    );
}

#[test]
fn test_panicking_stage_is_isolated() {
    let (mut pipeline, sensor) =
        pipeline_with(ConfigBuilder::new().build(), vec![counter("c", 100.0, 300)]);
    pipeline
        .add_consumer(
            PanickingConsumer::new("fragile", 1),
            &sensor.providers,
            FrameSpec::new(0.1),
        )
        .unwrap();
    let sink = CollectingConsumer::new("sturdy");
    let seen = sink.seen();
    pipeline
        .add_consumer(sink, &sensor.providers, FrameSpec::new(0.1))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();

    match report.by_name("fragile").and_then(|c| c.outcome.clone()) {
        Some(WorkerOutcome::Failed(message)) => assert!(message.contains("boom")),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert_eq!(seen.lock().len(), 30);
    assert_eq!(report.failures().count(), 1);
}

#[test]
fn test_fatal_errors_abort_the_run() {
    let config = ConfigBuilder::new().fatal_processing_errors().build();
    let (mut pipeline, sensor) = pipeline_with(
        config,
        vec![Box::new(SignalGenerator::new("sine", 100.0, Waveform::Sine))],
    );
    pipeline
        .add_consumer(
            PanickingConsumer::new("fragile", 0),
            &sensor.providers,
            FrameSpec::new(0.05),
        )
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_until_finished(test_timeout()));
    let report = pipeline.stop().unwrap();
    assert_eq!(
        report.by_name("sine").and_then(|c| c.outcome.clone()),
        Some(WorkerOutcome::Aborted)
    );
}

#[test]
fn test_stuck_worker_is_abandoned() {
    let config = ConfigBuilder::new()
        .drain_timeout_ms(50)
        .join_timeout_ms(50)
        .build();
    let (mut pipeline, sensor) = pipeline_with(config, vec![counter("c", 100.0, 1000)]);
    pipeline
        .add_consumer(
            StubbornConsumer::new("stuck", Duration::from_secs(2)),
            &sensor.providers,
            FrameSpec::new(0.1),
        )
        .unwrap();

    pipeline.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    match pipeline.stop() {
        Err(PipelineError::ShutdownTimeout { components }) => {
            assert_eq!(components, vec!["stuck".to_string()])
        }
        other => panic!("expected a shutdown timeout, got {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    let report = pipeline.last_report().expect("report kept after timeout");
    assert_eq!(report.abandoned(), vec!["stuck"]);
}
