use thiserror::Error;

use crate::broker::BrokerError;
use crate::inference::InferenceError;
use crate::job::{JobResponse, RequestError};

/// Result of processing one request body, before anything is published.
#[derive(Debug)]
pub enum JobOutcome {
    Success(JobResponse),
    Failure(JobFailure),
}

#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("inference engine returned no suggestions")]
    NoSuggestions,

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),
}

/// What `Dispatcher::handle` did with a delivery. The delivery has been
/// acknowledged in every case.
#[derive(Debug)]
pub enum DispatchReport {
    Replied {
        destination: String,
        correlation_id: Option<String>,
    },
    /// Processing failed; nothing was published.
    Failed(JobFailure),
    /// A reply was built but could not be published.
    ReplyLost(BrokerError),
}
