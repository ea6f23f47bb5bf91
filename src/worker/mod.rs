//! Worker lifecycle
//!
//! `Worker::run` declares the durable work queue, limits the channel to one
//! unacknowledged delivery, and feeds deliveries to the dispatcher one at a
//! time until the shutdown future resolves or the broker goes away. The broker
//! is closed on every exit path.
//!
//! Shutdown is only observed between jobs: a signal that arrives while a job
//! is in flight lets that job publish and acknowledge first.

use std::future::Future;

use futures_util::StreamExt;
use tracing::{error, info, warn};

use crate::broker::{BrokerClient, BrokerError, DeliveryStream};
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::utils::WorkerError;

/// Unacknowledged deliveries a worker may hold. One job per worker means the
/// broker hands the next job to whichever worker is free.
pub const FAIR_DISPATCH_PREFETCH: u16 = 1;

/// Counters for one run, logged when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub replied: u64,
    pub failed: u64,
    pub replies_lost: u64,
}

impl WorkerStats {
    pub fn handled(&self) -> u64 {
        self.replied + self.failed + self.replies_lost
    }

    fn record(&mut self, report: &DispatchReport) {
        match report {
            DispatchReport::Replied { .. } => self.replied += 1,
            DispatchReport::Failed(_) => self.failed += 1,
            DispatchReport::ReplyLost(_) => self.replies_lost += 1,
        }
    }
}

pub struct Worker<B> {
    broker: B,
    dispatcher: Dispatcher,
    queue: String,
    consumer_tag: String,
}

impl<B: BrokerClient> Worker<B> {
    pub fn new(
        broker: B,
        dispatcher: Dispatcher,
        queue: impl Into<String>,
        consumer_tag: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            dispatcher,
            queue: queue.into(),
            consumer_tag: consumer_tag.into(),
        }
    }

    /// Consumes until `shutdown` resolves, then closes the broker.
    ///
    /// Returns an error only for broker-level failures; individual jobs that
    /// fail are counted in the stats.
    pub async fn run<F>(self, shutdown: F) -> Result<WorkerStats, WorkerError>
    where
        F: Future<Output = ()>,
    {
        let result = self.serve(shutdown).await;

        if let Err(e) = self.broker.close().await {
            warn!("Failed to close broker connection: {e}");
        }

        match &result {
            Ok(stats) => info!(
                replied = stats.replied,
                failed = stats.failed,
                replies_lost = stats.replies_lost,
                "Worker stopped"
            ),
            Err(e) => error!("Worker stopped on error: {e}"),
        }
        result
    }

    async fn serve<F>(&self, shutdown: F) -> Result<WorkerStats, WorkerError>
    where
        F: Future<Output = ()>,
    {
        let mut deliveries = self.subscribe().await?;
        let mut stats = WorkerStats::default();

        info!(
            queue = %self.queue,
            "Waiting for caption requests. To exit press CTRL+C"
        );

        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumption");
                    break;
                }
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(BrokerError::ConsumerClosed.into()),
            };

            let report = self.dispatcher.handle(&self.broker, delivery).await?;
            stats.record(&report);
        }

        Ok(stats)
    }

    async fn subscribe(&self) -> Result<DeliveryStream, BrokerError> {
        self.broker.declare_queue(&self.queue).await?;
        self.broker.set_prefetch(FAIR_DISPATCH_PREFETCH).await?;
        self.broker.consume(&self.queue, &self.consumer_tag).await
    }
}

/// Installs the Ctrl-C and SIGTERM handlers right away and returns a future
/// that resolves when either signal arrives.
///
/// Call it before connecting so an interrupt during startup still reaches
/// `Worker::run` and the broker gets closed.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn install(kind: SignalKind, name: &'static str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| error!("Failed to listen for {name}: {e}"))
            .ok()
    }

    async fn recv(signal: Option<Signal>) {
        match signal {
            Some(mut signal) => {
                signal.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    let interrupt = install(SignalKind::interrupt(), "Ctrl-C");
    let terminate = install(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = recv(interrupt) => {},
            _ = recv(terminate) => {},
        }
    }
}

/// Returns a future that resolves on Ctrl-C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
