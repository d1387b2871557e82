//! Publish channel: the single outbound Zenoh session and the
//! classification of send outcomes.

use std::future::Future;

use thiserror::Error;
use tracing::warn;
use zenoh::Session;
use zenoh::bytes::Encoding;

use enviropub_common::config::ZenohConfig;
use enviropub_common::serialization::{Format, encode};
use enviropub_common::telemetry::TelemetryMessage;

use crate::status::AgentStatus;

/// Failures that are fatal to the channel (and so to the process).
///
/// Everything that is not one of the five recognized transient kinds in
/// [`TransientError`] surfaces here and propagates.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("No Zenoh endpoint configured")]
    MissingEndpoint,

    #[error("Failed to connect to Zenoh: {0}")]
    Connect(String),

    #[error("Failed to encode telemetry: {0}")]
    Encode(String),

    #[error("Unexpected send failure: {0}")]
    Send(String),

    #[error("Failed to close Zenoh session: {0}")]
    Shutdown(String),
}

/// The recognized transient failure kinds for a single send attempt.
///
/// This set is deliberately finite and closed: a send either succeeds,
/// fails with one of these kinds (message dropped, loop continues), or
/// fails fatally. No hidden retry logic belongs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    ConnectionFailed,
    ConnectionDropped,
    OperationTimeout,
    OperationCancelled,
    NoConnection,
}

impl TransientError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientError::ConnectionFailed => "connection failed",
            TransientError::ConnectionDropped => "connection dropped",
            TransientError::OperationTimeout => "operation timeout",
            TransientError::OperationCancelled => "operation cancelled",
            TransientError::NoConnection => "no connection",
        }
    }

    /// Classify a transport failure message into a recognized kind.
    ///
    /// Zenoh reports failures as type-erased errors, so the finite
    /// transient set is recovered from the failure text in this one
    /// place. Anything unrecognized stays `None` and is treated as fatal
    /// by the caller.
    pub fn classify(message: &str) -> Option<TransientError> {
        let message = message.to_ascii_lowercase();

        if message.contains("cancel") {
            Some(TransientError::OperationCancelled)
        } else if message.contains("timeout") || message.contains("timed out") {
            Some(TransientError::OperationTimeout)
        } else if message.contains("closed") || message.contains("dropped") {
            Some(TransientError::ConnectionDropped)
        } else if message.contains("connect") || message.contains("unreachable") {
            Some(TransientError::ConnectionFailed)
        } else {
            None
        }
    }
}

impl std::fmt::Display for TransientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Message accepted by the endpoint.
    Accepted,

    /// Message dropped after a recognized transient failure.
    /// There is no queue and no re-delivery.
    Dropped(TransientError),
}

/// Destination for telemetry messages.
///
/// The seam between the publish loop and the transport: the real
/// implementation is [`PublishChannel`]; tests script outcomes through
/// their own implementation.
pub trait TelemetrySink {
    /// Attempt one publish.
    fn send(
        &mut self,
        message: &TelemetryMessage,
    ) -> impl Future<Output = Result<SendOutcome, ChannelError>>;

    /// Release the connection. Called at most once.
    fn shutdown(self) -> impl Future<Output = Result<(), ChannelError>>;
}

/// Owns the process's single outbound Zenoh session.
///
/// Created once before the loop starts (never in dry-run mode) and shut
/// down at most once afterwards.
pub struct PublishChannel {
    session: Session,
    key_prefix: String,
    key: String,
    format: Format,
}

impl PublishChannel {
    /// Establish the session.
    ///
    /// Fails fatally if no endpoint is configured or the endpoint is
    /// unreachable; the failure is reported once and not retried here.
    pub async fn connect(
        zenoh: &ZenohConfig,
        key_prefix: &str,
        device_id: &str,
        format: Format,
    ) -> Result<Self, ChannelError> {
        if zenoh.connect.is_empty() {
            return Err(ChannelError::MissingEndpoint);
        }

        let session = enviropub_common::connect(zenoh)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        Ok(Self {
            session,
            key_prefix: key_prefix.to_string(),
            key: format!("{}/{}", key_prefix, device_id),
            format,
        })
    }

    /// Key expression telemetry is published to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish an agent status document to `<prefix>/@/status`.
    pub async fn publish_status(&self, status: &AgentStatus) -> Result<(), ChannelError> {
        let key = format!("{}/@/status", self.key_prefix);
        let payload =
            serde_json::to_vec(status).map_err(|e| ChannelError::Encode(e.to_string()))?;

        self.session
            .put(&key, payload)
            .encoding(Encoding::APPLICATION_JSON)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        Ok(())
    }

    fn encoding(&self) -> Encoding {
        match self.format {
            Format::Json => Encoding::APPLICATION_JSON,
            Format::Cbor => Encoding::APPLICATION_CBOR,
        }
    }
}

impl TelemetrySink for PublishChannel {
    async fn send(&mut self, message: &TelemetryMessage) -> Result<SendOutcome, ChannelError> {
        if self.session.is_closed() {
            return Ok(SendOutcome::Dropped(TransientError::NoConnection));
        }

        let payload =
            encode(message, self.format).map_err(|e| ChannelError::Encode(e.to_string()))?;

        match self
            .session
            .put(&self.key, payload)
            .encoding(self.encoding())
            .await
        {
            Ok(()) => Ok(SendOutcome::Accepted),
            Err(e) => {
                let text = e.to_string();
                match TransientError::classify(&text) {
                    Some(kind) => Ok(SendOutcome::Dropped(kind)),
                    None => Err(ChannelError::Send(text)),
                }
            }
        }
    }

    async fn shutdown(self) -> Result<(), ChannelError> {
        // Best-effort offline notice; the session close below is the part
        // whose failure must propagate.
        let offline = AgentStatus::offline(crate::status::AGENT_NAME, env!("CARGO_PKG_VERSION"));
        if let Err(e) = self.publish_status(&offline).await {
            warn!(error = %e, "Failed to publish offline status");
        }

        self.session
            .close()
            .await
            .map_err(|e| ChannelError::Shutdown(e.to_string()))
    }
}
