//! The publish loop: sample, encode, send, sleep, repeat.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use enviropub_common::telemetry::TelemetryMessage;

use crate::channel::{ChannelError, SendOutcome, TelemetrySink};
use crate::sensor::{SensorError, SensorSource};

/// Failures that terminate the publish loop.
///
/// Transient send failures never surface here; they are logged, the
/// message is dropped, and the loop continues.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Counters for one run of the publish loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Completed publish cycles.
    pub cycles: usize,
    /// Messages accepted by the endpoint.
    pub accepted: usize,
    /// Messages dropped after a transient failure.
    pub dropped: usize,
}

/// Drives the sample -> encode -> send -> sleep cycle until cancelled.
///
/// Owns the sensor and, unless running dry, the sink. The loop never
/// exits on its own: there is no iteration or failure cutoff, only the
/// cancellation token. On cancellation it shuts the sink down at most
/// once and returns the accumulated [`CycleStats`].
pub struct PublishLoop<S> {
    sensor: Box<dyn SensorSource>,
    /// `None` in dry-run mode; no connection exists and nothing is sent.
    sink: Option<S>,
    device_id: String,
    interval: Duration,
    cancel: CancellationToken,
    stats: CycleStats,
}

impl<S: TelemetrySink> PublishLoop<S> {
    pub fn new(
        sensor: Box<dyn SensorSource>,
        sink: Option<S>,
        device_id: impl Into<String>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sensor,
            sink,
            device_id: device_id.into(),
            interval,
            cancel,
            stats: CycleStats::default(),
        }
    }

    /// Run until the cancellation token fires.
    ///
    /// A cancellation observed at any point in the cycle moves straight
    /// to shutdown; a send already in flight is allowed to complete or
    /// fail first. Sensor read failures and unrecognized send failures
    /// propagate without a shutdown attempt.
    pub async fn run(mut self) -> Result<CycleStats, LoopError> {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let reading = self.sensor.sample()?;
            let message = TelemetryMessage::new(self.device_id.as_str(), reading);
            self.stats.cycles += 1;

            match self.sink.as_mut() {
                None => {
                    info!(
                        device = %message.device_id,
                        temperature = message.temperature,
                        humidity = message.humidity,
                        "Dry run, not sending"
                    );
                }
                Some(sink) => match sink.send(&message).await? {
                    SendOutcome::Accepted => {
                        self.stats.accepted += 1;
                        info!(
                            device = %message.device_id,
                            temperature = message.temperature,
                            humidity = message.humidity,
                            "Message successfully sent"
                        );
                    }
                    SendOutcome::Dropped(kind) => {
                        self.stats.dropped += 1;
                        warn!(%kind, "Message failed to send, skipping");
                    }
                },
            }

            // Interruptible wait; a zero interval degenerates to a busy
            // loop and is allowed.
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Shutting down");
        if let Some(sink) = self.sink.take() {
            sink.shutdown().await?;
        }

        Ok(self.stats)
    }
}
