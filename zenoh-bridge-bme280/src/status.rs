//! Agent status reporting.

use serde::{Deserialize, Serialize};

/// Agent name used in status documents.
pub const AGENT_NAME: &str = "bme280";

/// Agent status information, published to `<prefix>/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent name.
    pub agent: String,
    /// Agent version.
    pub version: String,
    /// Current status ("running", "offline").
    pub status: String,
    /// Additional metadata. Kept as an object; flattening a non-map
    /// value does not serialize.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl AgentStatus {
    /// Create a new status with "running" state.
    pub fn running(agent: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            version: version.into(),
            status: "running".to_string(),
            metadata: empty_metadata(),
        }
    }

    /// Create a status with "offline" state.
    pub fn offline(agent: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: empty_metadata(),
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = AgentStatus::running(AGENT_NAME, "0.1.0");
        assert_eq!(status.agent, "bme280");
        assert_eq!(status.status, "running");
    }

    #[test]
    fn test_status_with_metadata() {
        let status = AgentStatus::running(AGENT_NAME, "0.1.0").with_metadata(serde_json::json!({
            "device_id": "greenhouse-01",
            "interval_ms": 2000
        }));

        assert_eq!(status.metadata["device_id"], "greenhouse-01");
        assert_eq!(status.metadata["interval_ms"], 2000);
    }

    #[test]
    fn test_status_serialization() {
        let status = AgentStatus::offline(AGENT_NAME, "1.0.0");

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"agent\":\"bme280\""));
        assert!(json.contains("\"status\":\"offline\""));
    }
}
