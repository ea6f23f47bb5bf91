//! # caption-worker
//!
//! `caption-worker` is a background worker that answers caption paraphrase
//! requests over RabbitMQ. Requests arrive on a durable queue; each one is run
//! through a paraphrase model and the suggestions are published to the
//! requester's `reply_to` queue under the request's correlation id.
//!
//! ## Core Modules
//!
//! - `broker`: broker client traits, the RabbitMQ implementation and an
//!   in-process broker.
//! - `client`: requester side of the RPC, with correlation matching and a
//!   timeout.
//! - `config`: loads settings from file and environment.
//! - `dispatcher`: turns one delivery into a reply and an acknowledgment.
//! - `inference`: the model boundary and the HTTP paraphrase engine.
//! - `job`: request and response bodies.
//! - `utils`: error type and logging setup.
//! - `worker`: queue setup, the consumption loop and shutdown.

pub mod broker;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod inference;
pub mod job;
pub mod utils;
pub mod worker;
