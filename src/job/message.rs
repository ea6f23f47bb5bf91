use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Format of `processed_at` in replies, local time.
pub const PROCESSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Requester-supplied user identifier. Only ever logged.
///
/// Producers send strings, numbers of any size, even `null`; whatever JSON
/// value arrives is kept as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Value);

impl UserId {
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(id) => f.write_str(id),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(Value::String(id.to_string()))
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(Value::String(id))
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(Value::from(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub caption: String,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("request caption is empty")]
    EmptyCaption,
}

impl JobRequest {
    pub fn new(user_id: impl Into<UserId>, caption: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            caption: caption.into(),
        }
    }

    /// Decodes a request body. Both fields are required and the caption must
    /// not be empty. Whitespace is forwarded to the model untouched.
    pub fn parse(payload: &[u8]) -> Result<Self, RequestError> {
        let request: JobRequest = serde_json::from_slice(payload)?;
        if request.caption.is_empty() {
            return Err(RequestError::EmptyCaption);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub original_caption: String,
    pub suggested_caption: Vec<String>,
    pub processed_at: String,
}

impl JobResponse {
    pub fn new(
        original_caption: impl Into<String>,
        suggested_caption: Vec<String>,
        processed_at: DateTime<Local>,
    ) -> Self {
        Self {
            original_caption: original_caption.into(),
            suggested_caption,
            processed_at: processed_at.format(PROCESSED_AT_FORMAT).to_string(),
        }
    }
}
