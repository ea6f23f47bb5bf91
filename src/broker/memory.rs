//! In-process broker
//!
//! `InMemoryBroker` implements the broker traits without a network so the
//! dispatcher and worker lifecycle can be exercised end to end. It mirrors the
//! RabbitMQ behaviour the worker relies on:
//! - queues are FIFO; publishing to an undeclared queue is unroutable
//! - each consumer holds at most `prefetch` unacknowledged deliveries
//!   (`0` means unlimited) and receives nothing more until it settles one
//! - delivery tags are unique, start at 1, and can be settled once
//! - `nack` with requeue puts the message back at the head of its queue
//! - `close` requeues whatever is still unacknowledged and ends every consumer
//!
//! The broker is a cheap handle (`Clone` shares state), so tests keep one copy
//! for inspection while the worker owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use super::{
    BrokerChannel, BrokerClient, BrokerError, Delivery, DeliveryStream, DeliveryTag,
    MessageProperties,
};

/// A message sitting in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
}

#[derive(Debug, Default)]
struct Queue {
    durable: bool,
    messages: VecDeque<QueuedMessage>,
}

#[derive(Debug)]
struct PendingDelivery {
    queue: String,
    consumer: u64,
    message: QueuedMessage,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Queue>,
    pending: HashMap<u64, PendingDelivery>,
    last_tag: u64,
    last_consumer: u64,
    prefetch: u16,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    max_in_flight: usize,
    publish_outage: bool,
    closed: bool,
}

impl State {
    fn in_flight_for(&self, consumer: u64) -> usize {
        self.pending
            .values()
            .filter(|p| p.consumer == consumer)
            .count()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

enum Take {
    Ready(Delivery),
    Wait,
    Finished,
}

struct Cursor {
    inner: Arc<Inner>,
    queue: String,
    consumer: u64,
    limit: u16,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, queue: &str, consumer: u64, limit: u16) -> Take {
        let mut state = self.state();
        if state.closed {
            return Take::Finished;
        }

        let in_flight = state.in_flight_for(consumer);
        if limit != 0 && in_flight >= usize::from(limit) {
            return Take::Wait;
        }

        let Some(message) = state
            .queues
            .get_mut(queue)
            .and_then(|q| q.messages.pop_front())
        else {
            return Take::Wait;
        };

        state.last_tag += 1;
        let tag = state.last_tag;
        state.pending.insert(
            tag,
            PendingDelivery {
                queue: queue.to_string(),
                consumer,
                message: message.clone(),
            },
        );
        state.max_in_flight = state.max_in_flight.max(in_flight + 1);

        Take::Ready(Delivery {
            tag: DeliveryTag::new(tag),
            payload: message.payload,
            properties: message.properties,
        })
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state()
    }

    /// Snapshot of the messages currently waiting in `queue`.
    pub fn messages(&self, queue: &str) -> Vec<QueuedMessage> {
        self.state()
            .queues
            .get(queue)
            .map(|q| q.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_durable(&self, queue: &str) -> bool {
        self.state().queues.get(queue).is_some_and(|q| q.durable)
    }

    /// Delivery tags acknowledged so far, in acknowledgment order.
    pub fn acked(&self) -> Vec<u64> {
        self.state().acked.clone()
    }

    /// `(tag, requeue)` for every rejected delivery.
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.state().nacked.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.state().pending.len()
    }

    /// Highest number of unacknowledged deliveries any single consumer held.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn prefetch(&self) -> u16 {
        self.state().prefetch
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// While set, every publish fails as if the broker were unreachable.
    pub fn set_publish_outage(&self, outage: bool) {
        self.state().publish_outage = outage;
    }

    /// Resolves once at least `count` deliveries have been acknowledged.
    pub async fn wait_for_acks(&self, count: usize) {
        loop {
            let notified = self.inner.notify.notified();
            {
                if self.state().acked.len() >= count {
                    return;
                }
            }
            notified.await;
        }
    }

    fn settle(&self, tag: DeliveryTag) -> Result<PendingDelivery, BrokerError> {
        let mut state = self.state();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        match state.pending.remove(&tag.value()) {
            Some(pending) => Ok(pending),
            None => {
                warn!(delivery_tag = tag.value(), "Settle for unknown delivery tag");
                Err(BrokerError::UnknownDeliveryTag(tag.value()))
            }
        }
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if state.publish_outage {
                return Err(BrokerError::Channel("broker unavailable".to_string()));
            }
            let queue = state
                .queues
                .get_mut(destination)
                .ok_or_else(|| BrokerError::Unroutable {
                    destination: destination.to_string(),
                })?;
            queue.messages.push_back(QueuedMessage {
                payload: payload.to_vec(),
                properties: properties.clone(),
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let value = tag.value();
        self.settle(tag)?;
        self.state().acked.push(value);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        let value = tag.value();
        let pending = self.settle(tag)?;
        {
            let mut state = self.state();
            if requeue {
                if let Some(queue) = state.queues.get_mut(&pending.queue) {
                    queue.messages.push_front(pending.message);
                }
            }
            state.nacked.push((value, requeue));
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state.queues.entry(name.to_string()).or_default().durable = true;
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        let mut state = self.state();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        let name = format!("amq.gen-{}", Uuid::new_v4());
        state.queues.insert(name.clone(), Queue::default());
        Ok(name)
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.state().prefetch = count;
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        let cursor = {
            let mut state = self.state();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::Channel(format!("NOT_FOUND - no queue '{queue}'")));
            }
            state.last_consumer += 1;
            Cursor {
                inner: self.inner.clone(),
                queue: queue.to_string(),
                consumer: state.last_consumer,
                limit: state.prefetch,
            }
        };

        let stream = futures::stream::unfold(cursor, |cursor| async move {
            loop {
                let taken = {
                    let notified = cursor.inner.notify.notified();
                    match cursor.inner.take(&cursor.queue, cursor.consumer, cursor.limit) {
                        Take::Wait => {
                            notified.await;
                            None
                        }
                        Take::Ready(delivery) => Some(Some(delivery)),
                        Take::Finished => Some(None),
                    }
                };
                match taken {
                    None => continue,
                    Some(Some(delivery)) => return Some((Ok(delivery), cursor)),
                    Some(None) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            state.closed = true;

            let mut tags: Vec<u64> = state.pending.keys().copied().collect();
            tags.sort_unstable_by(|a, b| b.cmp(a));
            for tag in tags {
                if let Some(pending) = state.pending.remove(&tag) {
                    if let Some(queue) = state.queues.get_mut(&pending.queue) {
                        queue.messages.push_front(pending.message);
                    }
                }
            }
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}
