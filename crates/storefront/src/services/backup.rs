//! Write-behind backup of live cart lines.
//!
//! Cart mutations hit the cache synchronously and hand a [`BackupJob`] to the
//! [`BackupQueue`]. A fixed pool of workers applies the jobs to the durable
//! store. Each user is pinned to one worker so that user's jobs are applied in
//! the order they were enqueued, and a delete never lands before an earlier
//! upsert of the same line.
//!
//! The queue never blocks a request: a full worker queue drops the job with a
//! warning. Jobs are not retried; a failed write is only logged.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tillpoint_core::{ProductId, UserId};

use crate::config::BackupConfig;
use crate::models::DurableCartRow;
use crate::store::CartBackupStore;

/// One change to a user's durable cart.
#[derive(Debug, Clone)]
pub enum BackupJob {
    Upsert(DurableCartRow),
    Delete(UserId, ProductId),
    Clear(UserId),
}

impl BackupJob {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::Upsert(row) => row.user_id,
            Self::Delete(user_id, _) | Self::Clear(user_id) => *user_id,
        }
    }
}

/// Handle used by request paths to enqueue cart backups.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct BackupQueue {
    senders: Arc<[mpsc::Sender<BackupJob>]>,
}

/// Owner of the worker tasks, used to drain them on shutdown.
pub struct BackupWorkers {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    config: BackupConfig,
}

impl BackupQueue {
    /// Spawn the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(store: Arc<dyn CartBackupStore>, config: BackupConfig) -> (Self, BackupWorkers) {
        let workers = config.workers.max(1);
        let cancel = CancellationToken::new();
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                worker,
                rx,
                Arc::clone(&store),
                cancel.clone(),
            )));
        }

        info!(workers, capacity = config.queue_capacity, "Cart backup workers started");

        (
            Self {
                senders: senders.into(),
            },
            BackupWorkers {
                handles,
                cancel,
                config,
            },
        )
    }

    /// Queue a durable cart change without waiting.
    pub fn enqueue(&self, job: BackupJob) {
        let user_id = job.user_id();
        let Some(sender) = self.senders.get(self.route(user_id)) else {
            return;
        };

        match sender.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(user_id = %user_id, ?job, "Cart backup queue full, dropping backup");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(user_id = %user_id, ?job, "Cart backup queue closed, dropping backup");
            }
        }
    }

    fn route(&self, user_id: UserId) -> usize {
        let workers = self.senders.len().max(1) as u128;
        usize::try_from(user_id.as_uuid().as_u128() % workers).unwrap_or(0)
    }
}

impl BackupWorkers {
    /// Stop accepting backups and wait for queued ones to be written.
    ///
    /// Gives up after the configured drain timeout; anything still queued then
    /// is lost.
    pub async fn shutdown(self) {
        let Self {
            handles,
            cancel,
            config,
        } = self;
        cancel.cancel();

        let drain = async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Cart backup worker panicked");
                }
            }
        };

        if tokio::time::timeout(config.drain_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                timeout_secs = config.drain_timeout.as_secs(),
                "Cart backup drain timed out, abandoning queued backups"
            );
        } else {
            info!("Cart backup queue drained");
        }
    }
}

async fn run_worker(
    worker: usize,
    mut rx: mpsc::Receiver<BackupJob>,
    store: Arc<dyn CartBackupStore>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => apply(store.as_ref(), &job).await,
                None => break,
            },
            () = cancel.cancelled() => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    apply(store.as_ref(), &job).await;
                }
                break;
            }
        }
    }
    debug!(worker, "Cart backup worker stopped");
}

async fn apply(store: &dyn CartBackupStore, job: &BackupJob) {
    let result = match job {
        BackupJob::Upsert(row) => store.upsert(row).await,
        BackupJob::Delete(user_id, product_id) => store.delete(*user_id, *product_id).await,
        BackupJob::Clear(user_id) => store.delete_all(*user_id).await,
    };

    match result {
        Ok(()) => debug!(?job, "Cart backup applied"),
        Err(e) => warn!(?job, error = %e, "Cart backup failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;

    fn row(user_id: UserId, product_id: ProductId, quantity: i32) -> BackupJob {
        let now = Utc::now();
        BackupJob::Upsert(DurableCartRow {
            user_id,
            product_id,
            quantity,
            note: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn config(workers: usize, queue_capacity: usize) -> BackupConfig {
        BackupConfig {
            workers,
            queue_capacity,
            drain_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_backups() {
        let store = MemoryStore::new();
        let (queue, workers) = BackupQueue::start(Arc::new(store.clone()), config(2, 16));
        let user = UserId::generate();
        let product = ProductId::generate();

        queue.enqueue(row(user, product, 1));
        queue.enqueue(row(user, product, 2));
        queue.enqueue(row(user, product, 3));
        workers.shutdown().await;

        let rows = store.list(user).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, 3, "last enqueued backup wins");
    }

    #[tokio::test]
    async fn test_delete_applies_after_earlier_upsert() {
        let store = MemoryStore::new();
        let (queue, workers) = BackupQueue::start(Arc::new(store.clone()), config(2, 16));
        let user = UserId::generate();
        let kept = ProductId::generate();
        let removed = ProductId::generate();

        queue.enqueue(row(user, kept, 1));
        queue.enqueue(row(user, removed, 2));
        queue.enqueue(BackupJob::Delete(user, removed));
        workers.shutdown().await;

        let rows = store.list(user).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, kept);
    }

    #[tokio::test]
    async fn test_clear_applies_after_earlier_upserts() {
        let store = MemoryStore::new();
        let (queue, workers) = BackupQueue::start(Arc::new(store.clone()), config(1, 16));
        let user = UserId::generate();

        queue.enqueue(row(user, ProductId::generate(), 1));
        queue.enqueue(row(user, ProductId::generate(), 4));
        queue.enqueue(BackupJob::Clear(user));
        workers.shutdown().await;

        assert!(store.list(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let store = MemoryStore::new();
        let (queue, workers) = BackupQueue::start(Arc::new(store.clone()), config(1, 4));
        workers.shutdown().await;

        let user = UserId::generate();
        queue.enqueue(row(user, ProductId::generate(), 1));
        assert!(store.list(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_route_is_stable_per_user() {
        let store = MemoryStore::new();
        let (queue, workers) = BackupQueue::start(Arc::new(store), config(4, 4));
        let user = UserId::generate();

        let first = queue.route(user);
        assert!(first < 4);
        assert_eq!(queue.route(user), first);
        workers.shutdown().await;
    }
}
