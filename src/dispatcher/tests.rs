use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use super::{DispatchReport, Dispatcher, JobFailure, JobOutcome};
use crate::broker::{
    BrokerChannel, BrokerClient, BrokerError, Delivery, DeliveryTag, InMemoryBroker,
    MessageProperties,
};
use crate::inference::{InferenceEngine, InferenceError};
use crate::job::{JobRequest, JobResponse, RequestError};

const QUEUE: &str = "caption-requests";
const REPLY_QUEUE: &str = "reply-q";

struct FixedEngine(Vec<&'static str>);

#[async_trait]
impl InferenceEngine for FixedEngine {
    async fn suggest(&self, _text: &str) -> Result<Vec<String>, InferenceError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

struct FailingEngine;

#[async_trait]
impl InferenceEngine for FailingEngine {
    async fn suggest(&self, _text: &str) -> Result<Vec<String>, InferenceError> {
        Err(InferenceError::RequestFailed("CUDA out of memory".to_string()))
    }
}

#[derive(Default)]
struct RecordingEngine {
    inputs: Mutex<Vec<String>>,
}

#[async_trait]
impl InferenceEngine for RecordingEngine {
    async fn suggest(&self, text: &str) -> Result<Vec<String>, InferenceError> {
        self.inputs.lock().unwrap().push(text.to_string());
        Ok(vec![text.to_uppercase()])
    }
}

fn dispatcher(engine: impl InferenceEngine + 'static) -> Dispatcher {
    Dispatcher::new(Arc::new(engine))
}

fn props(correlation_id: &str, reply_to: Option<&str>) -> MessageProperties {
    MessageProperties {
        correlation_id: Some(correlation_id.to_string()),
        reply_to: reply_to.map(str::to_string),
    }
}

/// Declares the queues, enqueues one payload and hands back its delivery.
async fn deliver(broker: &InMemoryBroker, payload: &[u8], properties: MessageProperties) -> Delivery {
    broker.declare_queue(QUEUE).await.unwrap();
    broker.declare_queue(REPLY_QUEUE).await.unwrap();
    broker.publish(QUEUE, payload, &properties).await.unwrap();
    let mut deliveries = broker.consume(QUEUE, "test").await.unwrap();
    deliveries.next().await.unwrap().unwrap()
}

fn hello_world() -> Vec<u8> {
    serde_json::to_vec(&JobRequest::new("u1", "Hello world")).unwrap()
}

#[tokio::test]
async fn test_process_success() {
    let outcome = dispatcher(FixedEngine(vec!["Hi there", "Greetings"]))
        .process(&hello_world())
        .await;

    match outcome {
        JobOutcome::Success(response) => {
            assert_eq!(response.original_caption, "Hello world");
            assert_eq!(response.suggested_caption, vec!["Hi there", "Greetings"]);
            assert_eq!(response.processed_at.len(), "2024-05-17 09:03:07".len());
        }
        JobOutcome::Failure(reason) => panic!("Expected success, got {reason}"),
    }
}

#[tokio::test]
async fn test_process_passes_caption_verbatim() {
    let engine = Arc::new(RecordingEngine::default());
    let dispatcher = Dispatcher::new(engine.clone());
    let payload = json!({ "userId": 7, "caption": "  sunset, again  " }).to_string();

    let outcome = dispatcher.process(payload.as_bytes()).await;
    assert!(matches!(outcome, JobOutcome::Success(ref r) if r.original_caption == "  sunset, again  "));
    assert_eq!(*engine.inputs.lock().unwrap(), vec!["  sunset, again  "]);
}

#[tokio::test]
async fn test_process_empty_engine_output() {
    let outcome = dispatcher(FixedEngine(vec![])).process(&hello_world()).await;
    assert!(matches!(outcome, JobOutcome::Failure(JobFailure::NoSuggestions)));
}

#[tokio::test]
async fn test_process_malformed_skips_engine() {
    let engine = Arc::new(RecordingEngine::default());
    let outcome = Dispatcher::new(engine.clone()).process(b"{not valid json").await;
    assert!(matches!(
        outcome,
        JobOutcome::Failure(JobFailure::Request(RequestError::Malformed(_)))
    ));
    assert!(engine.inputs.lock().unwrap().is_empty());
}

// Scenario A
#[tokio::test]
async fn test_handle_publishes_reply_and_acks() {
    let broker = InMemoryBroker::new();
    let delivery = deliver(&broker, &hello_world(), props("abc", Some(REPLY_QUEUE))).await;
    let tag = delivery.tag.value();

    let report = dispatcher(FixedEngine(vec!["Hi there", "Greetings"]))
        .handle(&broker, delivery)
        .await
        .unwrap();

    assert!(matches!(
        report,
        DispatchReport::Replied { ref destination, ref correlation_id }
            if destination == REPLY_QUEUE && correlation_id.as_deref() == Some("abc")
    ));

    let replies = broker.messages(REPLY_QUEUE);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].properties.correlation_id.as_deref(), Some("abc"));
    assert_eq!(replies[0].properties.reply_to, None);

    let response: JobResponse = serde_json::from_slice(&replies[0].payload).unwrap();
    assert_eq!(response.original_caption, "Hello world");
    assert_eq!(response.suggested_caption, vec!["Hi there", "Greetings"]);

    assert_eq!(broker.acked(), vec![tag]);
    assert_eq!(broker.in_flight(), 0);
}

// Scenario B
#[tokio::test]
async fn test_handle_malformed_acks_without_reply() {
    let broker = InMemoryBroker::new();
    let delivery = deliver(&broker, b"{not valid json", props("abc", Some(REPLY_QUEUE))).await;

    let report = dispatcher(FixedEngine(vec!["unused"]))
        .handle(&broker, delivery)
        .await
        .unwrap();

    assert!(matches!(report, DispatchReport::Failed(JobFailure::Request(_))));
    assert!(broker.messages(REPLY_QUEUE).is_empty());
    assert_eq!(broker.acked(), vec![1]);
    assert!(broker.nacked().is_empty());
}

// Scenario C
#[tokio::test]
async fn test_handle_inference_failure_acks_without_reply() {
    let broker = InMemoryBroker::new();
    let delivery = deliver(&broker, &hello_world(), props("abc", Some(REPLY_QUEUE))).await;

    let report = dispatcher(FailingEngine).handle(&broker, delivery).await.unwrap();

    match report {
        DispatchReport::Failed(JobFailure::Inference(e)) => {
            assert!(e.to_string().contains("CUDA out of memory"));
        }
        other => panic!("Expected inference failure, got {other:?}"),
    }
    assert!(broker.messages(REPLY_QUEUE).is_empty());
    assert_eq!(broker.acked(), vec![1]);
}

#[tokio::test]
async fn test_handle_missing_reply_to_still_acks() {
    let broker = InMemoryBroker::new();
    let delivery = deliver(&broker, &hello_world(), props("abc", None)).await;

    let report = dispatcher(FixedEngine(vec!["Hi there"]))
        .handle(&broker, delivery)
        .await
        .unwrap();

    assert!(matches!(
        report,
        DispatchReport::ReplyLost(BrokerError::Unroutable { ref destination }) if destination.is_empty()
    ));
    assert_eq!(broker.acked(), vec![1]);
}

#[tokio::test]
async fn test_handle_publish_outage_still_acks() {
    let broker = InMemoryBroker::new();
    let delivery = deliver(&broker, &hello_world(), props("abc", Some(REPLY_QUEUE))).await;
    broker.set_publish_outage(true);

    let report = dispatcher(FixedEngine(vec!["Hi there"]))
        .handle(&broker, delivery)
        .await
        .unwrap();

    assert!(matches!(report, DispatchReport::ReplyLost(_)));
    assert!(broker.messages(REPLY_QUEUE).is_empty());
    assert_eq!(broker.acked(), vec![1]);
}

#[tokio::test]
async fn test_handle_without_correlation_id_replies_without_one() {
    let broker = InMemoryBroker::new();
    let properties = MessageProperties {
        correlation_id: None,
        reply_to: Some(REPLY_QUEUE.to_string()),
    };
    let delivery = deliver(&broker, &hello_world(), properties).await;

    dispatcher(FixedEngine(vec!["Hi there"]))
        .handle(&broker, delivery)
        .await
        .unwrap();

    let replies = broker.messages(REPLY_QUEUE);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].properties.correlation_id, None);
}

#[tokio::test]
async fn test_handle_surfaces_failed_ack() {
    let broker = InMemoryBroker::new();
    broker.declare_queue(REPLY_QUEUE).await.unwrap();
    let forged = Delivery {
        tag: DeliveryTag::new(99),
        payload: hello_world(),
        properties: props("abc", Some(REPLY_QUEUE)),
    };

    let err = dispatcher(FixedEngine(vec!["Hi there"]))
        .handle(&broker, forged)
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::UnknownDeliveryTag(99)));
    // the reply went out before the ack was attempted
    assert_eq!(broker.messages(REPLY_QUEUE).len(), 1);
}
