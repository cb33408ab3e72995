use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use strata_events::{EventEnvelope, Projector};

/// Counters reported by a worker when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Handle to stop and join a background projection worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting events, apply everything already queued, and wait for the task.
    pub async fn shutdown(mut self) -> WorkerStats {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.join.take() {
            Some(join) => match join.await {
                Ok(stats) => stats,
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "projection worker task failed");
                    WorkerStats::default()
                }
            },
            None => WorkerStats::default(),
        }
    }
}

/// Projector that forwards envelopes into a worker's bounded queue.
///
/// Subscribe it on the bus in place of the wrapped projector. `handle` waits
/// for queue capacity, so a slow projector slows publishers down instead of
/// growing memory. It fails once the worker has stopped.
#[derive(Debug, Clone)]
pub struct QueuedProjector {
    name: String,
    sender: mpsc::Sender<EventEnvelope>,
}

#[async_trait]
impl Projector for QueuedProjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.sender
            .send(envelope.clone())
            .await
            .map_err(|_| anyhow::anyhow!("projection worker '{}' has stopped", self.name))
    }
}

/// Runs a projector on its own task behind a bounded channel.
///
/// - events are applied one at a time, in the order they were queued
/// - projector failures are logged and counted; the worker keeps going
/// - nothing is persisted: queued events are lost if the process dies
///   (rebuild the projection from the store to recover)
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker for `projector` with a queue of `capacity` envelopes (at least 1).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        projector: Arc<dyn Projector>,
        capacity: usize,
    ) -> (Arc<QueuedProjector>, WorkerHandle) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(worker_loop(name.clone(), projector, rx, shutdown_rx));

        let queued = Arc::new(QueuedProjector {
            name: name.clone(),
            sender: tx,
        });
        let handle = WorkerHandle {
            name,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        };
        (queued, handle)
    }
}

async fn worker_loop(
    name: String,
    projector: Arc<dyn Projector>,
    mut rx: mpsc::Receiver<EventEnvelope>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut shutdown_open = true;

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown_rx, if shutdown_open => match signal {
                Ok(()) => break,
                // Handle dropped without shutdown: keep running until all senders are gone.
                Err(_) => shutdown_open = false,
            },
            next = rx.recv() => match next {
                Some(envelope) => apply(&name, projector.as_ref(), &envelope, &mut stats).await,
                None => return stats,
            },
        }
    }

    // Drain what was queued before shutdown; new sends now fail.
    rx.close();
    while let Some(envelope) = rx.recv().await {
        apply(&name, projector.as_ref(), &envelope, &mut stats).await;
    }

    tracing::debug!(
        worker = %name,
        processed = stats.processed,
        failed = stats.failed,
        "projection worker stopped"
    );
    stats
}

async fn apply(
    name: &str,
    projector: &dyn Projector,
    envelope: &EventEnvelope,
    stats: &mut WorkerStats,
) {
    stats.processed += 1;
    if let Err(err) = projector.handle(envelope).await {
        stats.failed += 1;
        warn!(
            worker = name,
            tenant_id = %envelope.tenant_id(),
            aggregate_id = %envelope.aggregate_id(),
            sequence_number = envelope.sequence_number(),
            error = %err,
            "projection worker handler failed"
        );
    }
}
