//! Request senders.
//!
//! # Responsibilities
//! - Own one outbound client for the sender's lifetime
//! - Pull one captured request at a time from the pending queue
//! - Time the exchange and emit result, response and analytics records
//! - Retire after sustained idleness in a dynamic pool, never below one

use bytes::Bytes;
use chrono::Local;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;

use crate::analytics::ResponseAnalyzer;
use crate::client::{OutboundClient, SharedClientFactory};
use crate::config::OutputConfig;
use crate::observability::metrics;
use crate::output::pool::{ActiveWorkers, WorkerSlot};
use crate::output::records::{ResponseRecord, ResultRecord};
use crate::payload;

/// How long a sender waits for work before counting an idle cycle.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Idle cycles a dynamic sender tolerates before trying to retire.
pub const IDLE_CYCLES_BEFORE_EXIT: u32 = 20;

/// Queues and collaborators shared by every sender of one output.
#[derive(Clone)]
pub(crate) struct SenderContext {
    pub config: Arc<OutputConfig>,
    pub pending: flume::Receiver<Bytes>,
    pub results: mpsc::Sender<ResultRecord>,
    pub responses: flume::Sender<ResponseRecord>,
    pub clients: SharedClientFactory,
    pub analyzer: Option<Arc<dyn ResponseAnalyzer>>,
    pub workers: Arc<ActiveWorkers>,
}

pub(crate) struct RequestSender {
    id: u64,
    ctx: SenderContext,
    client: Box<dyn OutboundClient>,
    // Released on every exit path, including unwinding and task abort.
    slot: WorkerSlot,
}

impl RequestSender {
    /// Build the client and join the pool.
    pub fn start(ctx: SenderContext) -> Self {
        let client = ctx.clients.build();
        let slot = WorkerSlot::join(ctx.workers.clone());
        Self {
            id: slot.id(),
            ctx,
            client,
            slot,
        }
    }

    pub async fn run(mut self) {
        let mut idle_cycles = 0u32;

        loop {
            match time::timeout(IDLE_POLL_INTERVAL, self.ctx.pending.recv_async()).await {
                Ok(Ok(request)) => {
                    let dispatched = AssertUnwindSafe(self.dispatch(request))
                        .catch_unwind()
                        .await;
                    if dispatched.is_err() {
                        metrics::record_dropped_payload("panic");
                        tracing::error!(worker = self.id, "Dispatch panicked, request dropped");
                    }
                    idle_cycles = 0;
                }
                Ok(Err(_)) => {
                    // Intake dropped and the queue is drained.
                    tracing::trace!(worker = self.id, "Sender stopped, intake closed");
                    return;
                }
                Err(_) => {
                    if !self.ctx.config.is_dynamic() {
                        continue;
                    }
                    idle_cycles = idle_cycles.saturating_add(1);
                    if idle_cycles > IDLE_CYCLES_BEFORE_EXIT && self.slot.try_retire() {
                        tracing::trace!(
                            worker = self.id,
                            remaining = self.slot.workers().get(),
                            "Idle sender retired"
                        );
                        return;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, request: Bytes) {
        let meta = payload::meta(&request);
        if self.ctx.config.debug {
            tracing::debug!(
                worker = self.id,
                meta = %String::from_utf8_lossy(&meta.join(&b' ')),
                "Dispatching request"
            );
        }

        if meta.len() < 2 {
            metrics::record_dropped_payload("metadata");
            return;
        }
        let id = request.slice_ref(meta[1]);

        let body = payload::body(&request);
        if !payload::is_http_request(body) {
            metrics::record_dropped_payload("body");
            return;
        }
        let body = request.slice_ref(body);

        let started = Local::now();
        let clock = Instant::now();
        let outcome = self.client.send(body).await;
        let round_trip = clock.elapsed();
        let stopped = started
            + chrono::Duration::from_std(round_trip).unwrap_or_else(|_| chrono::Duration::zero());

        if let Some(e) = &outcome.error {
            tracing::debug!(
                worker = self.id,
                id = %String::from_utf8_lossy(&id),
                error = %e,
                "Request error"
            );
        }

        let status = payload::response_status(&outcome.payload);
        metrics::record_dispatch(status, round_trip);

        let record = ResultRecord {
            status,
            started_at: started,
            duration: round_trip,
        };
        if self.ctx.results.send(record).await.is_err() {
            tracing::debug!(worker = self.id, "Result serializer gone, dropping record");
        }

        if self.ctx.config.track_responses {
            let response = ResponseRecord {
                id,
                payload: outcome.payload.clone(),
                round_trip,
                started_at: started.timestamp_nanos_opt().unwrap_or_default(),
            };
            if self.ctx.responses.send_async(response).await.is_err() {
                tracing::debug!(worker = self.id, "Response reader gone, dropping response");
            }
        }

        if let Some(analyzer) = &self.ctx.analyzer {
            analyzer.analyze(&request, &outcome.payload, started, stopped);
        }
    }
}
