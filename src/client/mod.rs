//! The `client` module is the requester side of the caption RPC.
//!
//! A `CaptionClient` publishes one request with a fresh correlation id and a
//! private reply queue, then waits for the reply carrying that id. The worker
//! drops failed jobs without answering, so the caller's timeout is the only
//! way to learn that a request went nowhere.

pub mod caption_client;

pub use caption_client::{CaptionClient, ClientError};

#[cfg(test)]
mod tests;
