//! Job envelopes exchanged over the broker.
//!
//! Requests arrive as JSON `{ "userId": ..., "caption": ... }`; replies go back
//! as `{ "original_caption", "suggested_caption", "processed_at" }`. Routing
//! metadata (correlation id, reply destination) lives in the broker message
//! properties, not in these bodies.

pub mod message;

pub use message::{JobRequest, JobResponse, PROCESSED_AT_FORMAT, RequestError, UserId};
