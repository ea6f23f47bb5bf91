//! Top-level error returned by the worker's startup and run loop.
//!
//! Per-message failures never surface here; they are contained in the
//! dispatcher. What remains is fatal: bad configuration, an unusable
//! inference client, or a broker connection that failed or went away.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::inference::InferenceError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("inference engine setup failed: {0}")]
    Inference(#[from] InferenceError),
}
