//! HTTP protocol: JSON bodies exchanged with chat clients

use serde::{Deserialize, Serialize};

pub use relevo_core::ChatReply as ChatResponse;

/// Client → gateway chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Generic messages; internal details stay in the server log
pub const MSG_REQUEST_FAILED: &str = "request failed";
pub const MSG_REQUEST_TIMED_OUT: &str = "request timed out";
