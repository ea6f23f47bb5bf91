use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{BrokerClient, BrokerError, DeliveryStream, MessageProperties};
use crate::job::{JobRequest, JobResponse, UserId};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("failed to encode request: {0}")]
    Encode(serde_json::Error),

    #[error("invalid reply: {0}")]
    InvalidReply(serde_json::Error),

    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

pub struct CaptionClient<B> {
    broker: B,
    queue: String,
}

impl<B: BrokerClient> CaptionClient<B> {
    pub fn new(broker: B, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Sends one caption and waits up to `timeout` for its suggestions.
    ///
    /// Replies on the private queue that carry another correlation id are
    /// acknowledged and skipped.
    pub async fn request(
        &self,
        user_id: impl Into<UserId>,
        caption: &str,
        timeout: Duration,
    ) -> Result<JobResponse, ClientError> {
        let body = serde_json::to_vec(&JobRequest::new(user_id, caption))
            .map_err(ClientError::Encode)?;
        let correlation_id = Uuid::new_v4().to_string();

        let reply_queue = self.broker.declare_reply_queue().await?;
        let mut replies = self
            .broker
            .consume(&reply_queue, &format!("caption-client-{correlation_id}"))
            .await?;

        self.broker
            .publish(
                &self.queue,
                &body,
                &MessageProperties {
                    correlation_id: Some(correlation_id.clone()),
                    reply_to: Some(reply_queue.clone()),
                },
            )
            .await?;
        debug!(correlation_id = %correlation_id, reply_queue = %reply_queue, "Request published");

        tokio::time::timeout(timeout, self.await_reply(&mut replies, &correlation_id))
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    async fn await_reply(
        &self,
        replies: &mut DeliveryStream,
        correlation_id: &str,
    ) -> Result<JobResponse, ClientError> {
        while let Some(next) = replies.next().await {
            let reply = next?;
            let matches = reply.properties.correlation_id.as_deref() == Some(correlation_id);
            let payload = reply.payload;
            self.broker.ack(reply.tag).await?;

            if matches {
                return serde_json::from_slice(&payload).map_err(ClientError::InvalidReply);
            }
            debug!("Skipping reply for another correlation id");
        }
        Err(BrokerError::ConsumerClosed.into())
    }
}
