//! Channel vocabulary shared between the subscription and presentation
//! layers.

use serde::Deserialize;

/// Lifecycle of the live channel. Always exactly one of these; closure is a
/// lifecycle fact, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Closed => "closed",
        }
    }
}

/// Fault reported by the live channel. May coexist with any status; once
/// populated the current data snapshot may be stale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelError {
    pub code: String,
    pub message: String,
    /// Raw response payload attached by the channel for diagnostics.
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl ChannelError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            response: None,
        }
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.response = Some(response);
        self
    }
}
