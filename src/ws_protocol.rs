use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_SNAPSHOT: &str = "snapshot";
pub const EVENT_LOADED: &str = "loaded";
pub const EVENT_QUESTION_UPDATED: &str = "question_updated";
pub const EVENT_TICK: &str = "tick";
pub const EVENT_TIME_EXPIRED: &str = "time_expired";
pub const EVENT_FINISHING: &str = "finishing";
pub const EVENT_FINISHED: &str = "finished";
pub const EVENT_RESTARTED: &str = "restarted";
pub const EVENT_RESET: &str = "reset";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub event: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl WsEnvelope {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
            request_id: None,
            ts: Some(Utc::now().to_rfc3339()),
        }
    }
}
