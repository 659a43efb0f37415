//! Bounded queue and worker pool between collection cycles and the sink.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DeliveryMessage, DeliveryStats, DeliveryStatsSnapshot};
use crate::sink::TelemetrySink;
use crate::{Error, Result};

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 1;

/// Sizing of the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl DeliveryConfig {
    /// Set the queue capacity; `0` keeps the default.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        if capacity != 0 {
            self.queue_capacity = capacity;
        }
        self
    }

    /// Set the worker count; `0` keeps the default.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers != 0 {
            self.workers = workers;
        }
        self
    }
}

/// The delivery queue and its worker pool.
///
/// Created before any producer so cycles can be handed a [`DeliveryProducer`];
/// the workers only start in [`run`](Self::run).
pub struct DeliveryPipeline {
    config: DeliveryConfig,
    tx: flume::Sender<DeliveryMessage>,
    rx: flume::Receiver<DeliveryMessage>,
    stats: Arc<DeliveryStats>,
    cancellation_token: CancellationToken,
}

impl DeliveryPipeline {
    pub fn new(config: DeliveryConfig, cancellation_token: CancellationToken) -> Self {
        let (tx, rx) = flume::bounded(config.queue_capacity);
        Self {
            config,
            tx,
            rx,
            stats: Arc::new(DeliveryStats::default()),
            cancellation_token,
        }
    }

    /// A handle for enqueueing messages.
    pub fn producer(&self) -> DeliveryProducer {
        DeliveryProducer {
            tx: self.tx.clone(),
            stats: self.stats.clone(),
            cancellation_token: self.cancellation_token.clone(),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    /// Start the sink and drain the queue until cancelled.
    ///
    /// Returns once every worker has exited. Workers also exit when every
    /// producer is gone and the queue is empty. A sink that fails to start
    /// is [`Error::SinkStartup`].
    pub async fn run(self, sink: Arc<dyn TelemetrySink>) -> Result<DeliveryStatsSnapshot> {
        let Self {
            config,
            tx,
            rx,
            stats,
            cancellation_token,
        } = self;
        drop(tx);

        if let Err(e) = sink.start().await {
            error!(error = %e, "Failed to start telemetry sink");
            return Err(match e {
                Error::SinkStartup(_) => e,
                other => Error::SinkStartup(other.to_string()),
            });
        }

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Delivery pipeline started"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..config.workers {
            workers.spawn(run_worker(
                worker_id,
                rx.clone(),
                sink.clone(),
                stats.clone(),
                cancellation_token.clone(),
            ));
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Delivery worker panicked");
            }
        }

        let abandoned = rx.drain().count();
        if abandoned > 0 {
            warn!(count = abandoned, "Abandoned queued messages at shutdown");
            stats.record_dropped(abandoned as u64);
        }

        let snapshot = stats.snapshot();
        info!(
            sent = snapshot.sent,
            failed = snapshot.failed,
            dropped = snapshot.dropped,
            "Delivery pipeline stopped"
        );
        Ok(snapshot)
    }
}

async fn run_worker(
    worker_id: usize,
    rx: flume::Receiver<DeliveryMessage>,
    sink: Arc<dyn TelemetrySink>,
    stats: Arc<DeliveryStats>,
    cancellation_token: CancellationToken,
) {
    debug!(worker_id, "Delivery worker started");

    loop {
        let message = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            received = rx.recv_async() => match received {
                Ok(message) => message,
                Err(_) => {
                    debug!(worker_id, "Delivery queue closed");
                    break;
                }
            },
        };

        match sink.send(&message).await {
            Ok(()) => {
                stats.record_sent();
                debug!(
                    worker_id,
                    data_id = message.data_id,
                    kind = %message.kind,
                    source = %message.source,
                    bytes = message.payload.len(),
                    "Message delivered"
                );
            }
            Err(e) => {
                stats.record_failed();
                error!(
                    worker_id,
                    data_id = message.data_id,
                    kind = %message.kind,
                    source = %message.source,
                    error = %e,
                    "Failed to deliver message"
                );
            }
        }
    }

    info!(worker_id, "Delivery worker exited");
}

/// Enqueue side of the pipeline, cloned into every collection cycle.
#[derive(Clone)]
pub struct DeliveryProducer {
    tx: flume::Sender<DeliveryMessage>,
    stats: Arc<DeliveryStats>,
    cancellation_token: CancellationToken,
}

impl DeliveryProducer {
    /// Enqueue `message`, waiting while the queue is full.
    ///
    /// Returns `false` when the message was dropped because the pipeline shut
    /// down while waiting.
    pub async fn enqueue(&self, message: DeliveryMessage) -> bool {
        let data_id = message.data_id;
        let kind = message.kind;

        let outcome = tokio::select! {
            biased;
            sent = self.tx.send_async(message) => sent.map_err(|_| "delivery queue closed"),
            _ = self.cancellation_token.cancelled() => Err("shutdown while queue full"),
        };

        match outcome {
            Ok(()) => true,
            Err(reason) => {
                self.stats.record_dropped(1);
                warn!(data_id, kind = %kind, reason, "Message dropped");
                false
            }
        }
    }

    /// Messages currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::PayloadKind;
    use crate::sink::testing::RecordingSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn send(&self, _message: &DeliveryMessage) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::send("broken pipe"))
        }
    }

    struct UnstartableSink;

    #[async_trait]
    impl TelemetrySink for UnstartableSink {
        async fn start(&self) -> Result<()> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no agent socket",
            )))
        }

        async fn send(&self, _message: &DeliveryMessage) -> Result<()> {
            Ok(())
        }
    }

    fn message(data_id: i32) -> DeliveryMessage {
        DeliveryMessage::new(
            data_id,
            format!(r#"{{"data":[{}]}}"#, data_id),
            PayloadKind::Metrics,
            "test",
        )
    }

    #[test]
    fn test_config_zero_means_default() {
        let config = DeliveryConfig::default()
            .with_queue_capacity(0)
            .with_workers(0);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.workers, DEFAULT_WORKERS);

        let config = DeliveryConfig::default()
            .with_queue_capacity(8)
            .with_workers(3);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.workers, 3);
    }

    #[tokio::test]
    async fn test_delivers_in_fifo_order() {
        let pipeline = DeliveryPipeline::new(DeliveryConfig::default(), CancellationToken::new());
        let producer = pipeline.producer();
        for data_id in 1..=3 {
            assert!(producer.enqueue(message(data_id)).await);
        }
        drop(producer);

        let sink = Arc::new(RecordingSink::default());
        let stats = pipeline.run(sink.clone()).await.unwrap();

        let ids: Vec<i32> = sink.messages().iter().map(|m| m.data_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_send_failures_are_not_retried() {
        let pipeline = DeliveryPipeline::new(
            DeliveryConfig::default().with_workers(2),
            CancellationToken::new(),
        );
        let producer = pipeline.producer();
        for data_id in 0..4 {
            producer.enqueue(message(data_id)).await;
        }
        drop(producer);

        let sink = Arc::new(FailingSink::default());
        let stats = pipeline.run(sink.clone()).await.unwrap();

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.sent, 0);
    }

    #[tokio::test]
    async fn test_sink_startup_failure_is_fatal() {
        let pipeline = DeliveryPipeline::new(DeliveryConfig::default(), CancellationToken::new());
        let err = pipeline.run(Arc::new(UnstartableSink)).await.unwrap_err();
        assert!(matches!(err, Error::SinkStartup(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_idle_workers_exit_on_cancel() {
        let token = CancellationToken::new();
        let pipeline = DeliveryPipeline::new(DeliveryConfig::default().with_workers(3), token.clone());
        let _producer = pipeline.producer();

        let handle = tokio::spawn(pipeline.run(Arc::new(RecordingSink::default())));
        tokio::task::yield_now().await;
        token.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(stats.sent, 0);
    }

    #[tokio::test]
    async fn test_blocked_producer_gives_up_on_cancel() {
        let token = CancellationToken::new();
        let pipeline =
            DeliveryPipeline::new(DeliveryConfig::default().with_queue_capacity(1), token.clone());
        let producer = pipeline.producer();

        assert!(producer.enqueue(message(1)).await);
        assert_eq!(producer.queued(), 1);

        let blocked = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.enqueue(message(2)).await })
        };
        tokio::task::yield_now().await;
        token.cancel();

        assert!(!blocked.await.unwrap());
        assert_eq!(pipeline.stats().snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn test_queued_messages_abandoned_at_shutdown() {
        let token = CancellationToken::new();
        let pipeline = DeliveryPipeline::new(DeliveryConfig::default(), token.clone());
        let producer = pipeline.producer();
        for data_id in 0..3 {
            producer.enqueue(message(data_id)).await;
        }
        token.cancel();

        let sink = Arc::new(RecordingSink::default());
        let stats = pipeline.run(sink.clone()).await.unwrap();

        assert!(sink.messages().is_empty());
        assert_eq!(stats.dropped, 3);
    }
}
