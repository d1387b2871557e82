//! Behavioral tests for the publish loop, driven through a scripted sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use enviropub_common::serialization::Format;
use enviropub_common::telemetry::{Reading, TelemetryMessage};
use zenoh_bridge_bme280::channel::{
    ChannelError, PublishChannel, SendOutcome, TelemetrySink, TransientError,
};
use zenoh_bridge_bme280::publish::{CycleStats, LoopError, PublishLoop};
use zenoh_bridge_bme280::sensor::{SensorError, SensorSource};

/// Observable record of everything a sink saw.
#[derive(Default)]
struct SinkLog {
    sent: Vec<TelemetryMessage>,
    shutdowns: usize,
}

/// Sink that replays a fixed script of send results.
struct ScriptedSink {
    script: VecDeque<Result<SendOutcome, ChannelError>>,
    log: Arc<Mutex<SinkLog>>,
    /// Fired once the script is exhausted, so tests can stop the loop
    /// right after the last scripted send.
    cancel_when_done: Option<CancellationToken>,
}

impl ScriptedSink {
    fn new(
        script: Vec<Result<SendOutcome, ChannelError>>,
        log: Arc<Mutex<SinkLog>>,
        cancel_when_done: Option<CancellationToken>,
    ) -> Self {
        Self {
            script: script.into(),
            log,
            cancel_when_done,
        }
    }
}

impl TelemetrySink for ScriptedSink {
    async fn send(&mut self, message: &TelemetryMessage) -> Result<SendOutcome, ChannelError> {
        self.log.lock().unwrap().sent.push(message.clone());
        let outcome = self.script.pop_front().expect("send after script ended");

        if self.script.is_empty() {
            if let Some(cancel) = &self.cancel_when_done {
                cancel.cancel();
            }
        }

        outcome
    }

    async fn shutdown(self) -> Result<(), ChannelError> {
        self.log.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}

/// Sensor yielding 1.0, 2.0, 3.0, ... as temperature so each sampled
/// reading is distinguishable.
#[derive(Default)]
struct CountingSensor {
    calls: usize,
}

impl SensorSource for CountingSensor {
    fn sample(&mut self) -> Result<Reading, SensorError> {
        self.calls += 1;
        Ok(Reading::new(self.calls as f64, 50.0))
    }
}

/// Sensor whose reads always fail, as a disconnected bus would.
struct BrokenSensor;

impl SensorSource for BrokenSensor {
    fn sample(&mut self) -> Result<Reading, SensorError> {
        Err(SensorError::Read("i2c transaction failed".to_string()))
    }
}

fn cancel_after(cancel: &CancellationToken, delay: Duration) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        cancel.cancel();
    });
}

// A zero interval never yields back to the scheduler, so the cancel timer
// needs its own worker thread.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dry_run_runs_many_cycles_and_never_sends() {
    // interval 0, no sink: the loop must spin freely, printing only
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(50));

    let publish_loop = PublishLoop::<ScriptedSink>::new(
        Box::new(CountingSensor::default()),
        None,
        "test-device",
        Duration::ZERO,
        cancel,
    );

    let stats = publish_loop.run().await.unwrap();

    assert!(stats.cycles > 10, "expected many cycles, got {}", stats.cycles);
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn transient_failure_drops_message_and_continues() {
    // One dropped send, then one accepted; two fresh readings total
    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let sink = ScriptedSink::new(
        vec![
            Ok(SendOutcome::Dropped(TransientError::ConnectionDropped)),
            Ok(SendOutcome::Accepted),
        ],
        log.clone(),
        Some(cancel.clone()),
    );

    let publish_loop = PublishLoop::new(
        Box::new(CountingSensor::default()),
        Some(sink),
        "test-device",
        Duration::ZERO,
        cancel,
    );

    let stats = publish_loop.run().await.unwrap();

    assert_eq!(
        stats,
        CycleStats {
            cycles: 2,
            accepted: 1,
            dropped: 1,
        }
    );

    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 2);
    // The dropped message is not retried; the next cycle samples anew
    assert_eq!(log.sent[0].temperature, 1.0);
    assert_eq!(log.sent[1].temperature, 2.0);
    assert_eq!(log.shutdowns, 1);
}

#[tokio::test]
async fn every_transient_kind_keeps_the_loop_alive() {
    let kinds = [
        TransientError::ConnectionFailed,
        TransientError::ConnectionDropped,
        TransientError::OperationTimeout,
        TransientError::OperationCancelled,
        TransientError::NoConnection,
    ];

    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let mut script: Vec<Result<SendOutcome, ChannelError>> = kinds
        .iter()
        .map(|kind| Ok(SendOutcome::Dropped(*kind)))
        .collect();
    script.push(Ok(SendOutcome::Accepted));

    let sink = ScriptedSink::new(script, log.clone(), Some(cancel.clone()));
    let publish_loop = PublishLoop::new(
        Box::new(CountingSensor::default()),
        Some(sink),
        "test-device",
        Duration::ZERO,
        cancel,
    );

    let stats = publish_loop.run().await.unwrap();

    assert_eq!(stats.cycles, 6);
    assert_eq!(stats.dropped, 5);
    assert_eq!(stats.accepted, 1);
    assert_eq!(log.lock().unwrap().shutdowns, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_sleep_shuts_down_once() {
    // Long interval: the cancellation arrives mid-sleep. With the paused
    // clock the sleep itself never has to elapse.
    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let sink = ScriptedSink::new(vec![Ok(SendOutcome::Accepted)], log.clone(), None);

    cancel_after(&cancel, Duration::from_millis(100));

    let publish_loop = PublishLoop::new(
        Box::new(CountingSensor::default()),
        Some(sink),
        "test-device",
        Duration::from_secs(60),
        cancel,
    );

    let stats = publish_loop.run().await.unwrap();

    // One cycle ran, none started after the interrupt
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.accepted, 1);

    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 1);
    assert_eq!(log.shutdowns, 1);
}

#[tokio::test]
async fn sensor_failure_is_fatal() {
    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let sink = ScriptedSink::new(Vec::new(), log.clone(), None);

    let publish_loop = PublishLoop::new(
        Box::new(BrokenSensor),
        Some(sink),
        "test-device",
        Duration::ZERO,
        cancel,
    );

    let err = publish_loop.run().await.unwrap_err();
    assert!(matches!(err, LoopError::Sensor(SensorError::Read(_))));

    // Fatal exit: no orderly shutdown was attempted
    assert_eq!(log.lock().unwrap().shutdowns, 0);
}

#[tokio::test]
async fn unrecognized_send_failure_is_fatal() {
    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let sink = ScriptedSink::new(
        vec![Err(ChannelError::Send("invalid key expression".to_string()))],
        log.clone(),
        None,
    );

    let publish_loop = PublishLoop::new(
        Box::new(CountingSensor::default()),
        Some(sink),
        "test-device",
        Duration::ZERO,
        cancel,
    );

    let err = publish_loop.run().await.unwrap_err();
    assert!(matches!(err, LoopError::Channel(ChannelError::Send(_))));
    assert_eq!(log.lock().unwrap().shutdowns, 0);
}

#[tokio::test]
async fn connect_without_endpoint_is_fatal() {
    let config = enviropub_common::config::ZenohConfig::default();

    let result = PublishChannel::connect(&config, "enviropub/bme280", "dev", Format::Json).await;

    assert!(matches!(result, Err(ChannelError::MissingEndpoint)));
}
