//! Elastic sender pool.
//!
//! # Responsibilities
//! - Track live senders with an owned atomic counter
//! - Start the result serializer, then spawn senders on scale requests
//! - Stop managing after the first spawn cycle in fixed-size mode

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::output::sender::{RequestSender, SenderContext};
use crate::sink::ResultSerializer;

/// Senders started by a dynamic pool before any load is observed.
pub const INITIAL_DYNAMIC_WORKERS: usize = 10;

/// Live sender accounting shared by the pool, the senders and the intake gate.
#[derive(Debug, Default)]
pub struct ActiveWorkers {
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicU64,
}

impl ActiveWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Senders currently alive.
    pub fn get(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of senders alive at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Senders started since the pool was created.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Register a new sender. Returns its id.
    pub(crate) fn join(&self) -> u64 {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        metrics::record_active_workers(now);
        self.started.fetch_add(1, Ordering::SeqCst)
    }

    /// Leave the pool because of idleness. Refuses when this sender is the
    /// last one alive.
    pub(crate) fn try_retire(&self) -> bool {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current <= 1 {
                return false;
            }
            match self.active.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    metrics::record_active_workers(current - 1);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Leave the pool unconditionally (the intake is closed).
    pub(crate) fn leave(&self) {
        let prev = self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::record_active_workers(prev.saturating_sub(1));
    }
}

/// One sender's membership in the pool.
///
/// Leaves the pool when dropped, so a sender that unwinds or is aborted is
/// never counted as alive. Idle retirement goes through `try_retire`, which
/// keeps the floor of one.
pub(crate) struct WorkerSlot {
    workers: Arc<ActiveWorkers>,
    id: u64,
    released: bool,
}

impl WorkerSlot {
    pub fn join(workers: Arc<ActiveWorkers>) -> Self {
        let id = workers.join();
        Self {
            workers,
            id,
            released: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn workers(&self) -> &ActiveWorkers {
        &self.workers
    }

    /// Give up the slot because of idleness. Refuses for the last sender.
    pub fn try_retire(&mut self) -> bool {
        if self.released {
            return true;
        }
        self.released = self.workers.try_retire();
        self.released
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        if !self.released {
            self.workers.leave();
        }
    }
}

/// Handles of the pool's long-running tasks.
pub(crate) struct PoolHandle {
    pub manager: JoinHandle<()>,
    pub serializer: JoinHandle<u64>,
}

/// Owns the elastic set of senders.
pub(crate) struct PoolManager {
    ctx: SenderContext,
    scale_requests: mpsc::Receiver<usize>,
}

impl PoolManager {
    pub fn new(ctx: SenderContext, scale_requests: mpsc::Receiver<usize>) -> Self {
        Self {
            ctx,
            scale_requests,
        }
    }

    /// Start the result serializer, then the management loop.
    pub fn start(self, serializer: ResultSerializer) -> PoolHandle {
        let serializer = serializer.spawn();
        let manager = tokio::spawn(self.run());
        PoolHandle {
            manager,
            serializer,
        }
    }

    async fn run(mut self) {
        while let Some(requested) = self.scale_requests.recv().await {
            tracing::debug!(
                requested,
                active = self.ctx.workers.get(),
                "Starting senders"
            );
            for _ in 0..requested {
                self.spawn_sender();
            }

            if !self.ctx.config.is_dynamic() {
                tracing::info!(workers = requested, "Fixed sender pool started");
                return;
            }
        }
        tracing::debug!("Pool manager stopped");
    }

    fn spawn_sender(&self) {
        let sender = RequestSender::start(self.ctx.clone());
        tokio::spawn(sender.run());
    }
}
