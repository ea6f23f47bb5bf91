use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CaptionClient, ClientError};
use crate::broker::{BrokerChannel, BrokerClient, InMemoryBroker, MessageProperties};
use crate::dispatcher::Dispatcher;
use crate::inference::{InferenceEngine, InferenceError};
use crate::worker::Worker;

const QUEUE: &str = "caption-requests";

struct Shouting;

#[async_trait]
impl InferenceEngine for Shouting {
    async fn suggest(&self, text: &str) -> Result<Vec<String>, InferenceError> {
        Ok(vec![text.to_uppercase(), format!("{text}!")])
    }
}

#[tokio::test]
async fn test_request_round_trip_through_worker() {
    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE).await.unwrap();

    let worker = Worker::new(
        broker.clone(),
        Dispatcher::new(Arc::new(Shouting)),
        QUEUE,
        "caption-worker",
    );
    let waiter = broker.clone();
    let handle = tokio::spawn(worker.run(async move { waiter.wait_for_acks(2).await }));

    let client = CaptionClient::new(broker.clone(), QUEUE);
    let response = client
        .request("u1", "Hello world", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.original_caption, "Hello world");
    assert_eq!(response.suggested_caption, vec!["HELLO WORLD", "Hello world!"]);

    // worker acked the request, client acked the reply
    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.replied, 1);
}

#[tokio::test]
async fn test_request_times_out_without_worker() {
    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE).await.unwrap();

    let client = CaptionClient::new(broker.clone(), QUEUE);
    let err = client
        .request("u1", "Hello", Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));
    // the request is still waiting for a worker
    assert_eq!(broker.messages(QUEUE).len(), 1);
}

#[tokio::test]
async fn test_request_skips_foreign_replies() {
    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE).await.unwrap();
    let client = CaptionClient::new(broker.clone(), QUEUE);

    // plays the worker: answers with a stray reply first, then the real one
    let responder = broker.clone();
    tokio::spawn(async move {
        let request = loop {
            if let Some(message) = responder.messages(QUEUE).into_iter().next() {
                break message;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let reply_to = request.properties.reply_to.clone().unwrap();
        let body = serde_json::json!({
            "original_caption": "Hello",
            "suggested_caption": ["Hi"],
            "processed_at": "2024-05-17 09:03:07",
        })
        .to_string();

        responder
            .publish(&reply_to, b"{}", &MessageProperties::reply(Some("someone-else".to_string())))
            .await
            .unwrap();
        responder
            .publish(
                &reply_to,
                body.as_bytes(),
                &MessageProperties::reply(request.properties.correlation_id.clone()),
            )
            .await
            .unwrap();
    });

    let response = client
        .request("u1", "Hello", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.suggested_caption, vec!["Hi"]);
    assert_eq!(broker.acked().len(), 2);
}

#[tokio::test]
async fn test_request_to_undeclared_queue_fails() {
    let broker = InMemoryBroker::new();
    let client = CaptionClient::new(broker, "missing");
    assert!(matches!(
        client.request("u1", "Hello", Duration::from_secs(1)).await,
        Err(ClientError::Broker(_))
    ));
}
