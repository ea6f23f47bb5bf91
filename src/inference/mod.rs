//! Inference engine boundary.
//!
//! The worker only knows that an engine turns one caption into an ordered list
//! of candidate captions. It holds a single `Arc<dyn InferenceEngine>` built at
//! startup and awaits every call inline, so a slow model stalls the worker for
//! exactly as long as the call takes. No timeout is applied.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::{GenerationParams, HttpParaphraseEngine};

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Produces one or more suggestions for `text`, best first.
    async fn suggest(&self, text: &str) -> Result<Vec<String>, InferenceError>;
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http client setup failed: {0}")]
    ClientSetup(String),

    #[error("model request failed: {0}")]
    RequestFailed(String),

    #[error("model endpoint returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("model returned no suggestions")]
    EmptyOutput,
}
