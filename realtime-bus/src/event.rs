//! Event envelope for pub/sub

use crate::types::ChangePayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// What changed
    pub payload: ChangePayload,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,

    /// Correlation ID (for tracing a mutation through the system)
    pub correlation_id: Option<String>,
}

impl ChangeEvent {
    /// Create new event
    pub fn new(payload: ChangePayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Get routing subject for this event
    pub fn subject(&self) -> String {
        self.payload.subject()
    }

    /// Serialize to bytes (wire format for a transport layer)
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
