//! Job dispatcher
//!
//! Handles one delivery at a time:
//! 1. decode the request body
//! 2. await the inference engine with the caption
//! 3. build the reply
//! 4. publish it to `reply_to` with the request's correlation id
//! 5. acknowledge the delivery
//!
//! Steps 1–3 produce a `JobOutcome`; `Dispatcher::handle` is the single place
//! that inspects it and decides what to publish. The acknowledgment in step 5
//! happens for every outcome, so a failed job is logged and dropped rather
//! than redelivered (at-most-once). Only a failed acknowledgment escapes,
//! since it means the channel itself is gone.

pub mod outcome;

use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};

use crate::broker::{BrokerChannel, BrokerError, Delivery, MessageProperties};
use crate::inference::InferenceEngine;
use crate::job::{JobRequest, JobResponse};

pub use outcome::{DispatchReport, JobFailure, JobOutcome};

#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn InferenceEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self { engine }
    }

    /// Runs steps 1–3 for one payload. Never publishes or settles anything.
    pub async fn process(&self, payload: &[u8]) -> JobOutcome {
        let request = match JobRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => return JobOutcome::Failure(e.into()),
        };

        info!(
            "Processing request from user {}: {}",
            request.user_id, request.caption
        );

        match self.engine.suggest(&request.caption).await {
            Ok(suggestions) if suggestions.is_empty() => {
                JobOutcome::Failure(JobFailure::NoSuggestions)
            }
            Ok(suggestions) => {
                JobOutcome::Success(JobResponse::new(request.caption, suggestions, Local::now()))
            }
            Err(e) => JobOutcome::Failure(JobFailure::Inference(e)),
        }
    }

    /// Processes a delivery, publishes the reply when there is one, then
    /// acknowledges the delivery regardless of how processing went.
    pub async fn handle<B>(&self, broker: &B, delivery: Delivery) -> Result<DispatchReport, BrokerError>
    where
        B: BrokerChannel + ?Sized,
    {
        let Delivery {
            tag,
            payload,
            properties,
        } = delivery;
        let delivery_tag = tag.value();
        let correlation_id = properties.correlation_id.clone();

        let report = match self.process(&payload).await {
            JobOutcome::Success(response) => self.reply(broker, &response, properties).await,
            JobOutcome::Failure(reason) => {
                error!(
                    delivery_tag,
                    correlation_id = correlation_id.as_deref().unwrap_or("-"),
                    "Error processing message: {reason}"
                );
                DispatchReport::Failed(reason)
            }
        };

        broker.ack(tag).await?;
        Ok(report)
    }

    async fn reply<B>(
        &self,
        broker: &B,
        response: &JobResponse,
        request: MessageProperties,
    ) -> DispatchReport
    where
        B: BrokerChannel + ?Sized,
    {
        let body = match serde_json::to_vec(response) {
            Ok(body) => body,
            Err(e) => return DispatchReport::Failed(JobFailure::Encode(e)),
        };

        let MessageProperties {
            correlation_id,
            reply_to,
        } = request;
        if reply_to.is_none() {
            warn!(
                correlation_id = correlation_id.as_deref().unwrap_or("-"),
                "Request has no reply_to; publishing anyway"
            );
        }
        let destination = reply_to.unwrap_or_default();

        match broker
            .publish(
                &destination,
                &body,
                &MessageProperties::reply(correlation_id.clone()),
            )
            .await
        {
            Ok(()) => DispatchReport::Replied {
                destination,
                correlation_id,
            },
            Err(e) => {
                error!(
                    destination = %destination,
                    correlation_id = correlation_id.as_deref().unwrap_or("-"),
                    "Failed to publish reply: {e}"
                );
                DispatchReport::ReplyLost(e)
            }
        }
    }
}

#[cfg(test)]
mod tests;
