//! HTTP replay output.
//!
//! # Data Flow
//! ```text
//! write(payload) ── intake gate: request filter, copy, enqueue ──┐
//!        │                                                       ▼
//!        │ depth > active senders              pending queue (bounded, MPMC)
//!        ▼                                                       │
//! scale queue (cap 1) ──▶ pool.rs PoolManager ──spawns──▶ sender.rs RequestSender × N
//!                                                                │
//!                      ┌─────────────────────────┬───────────────┴─────────┐
//!                      ▼                         ▼                         ▼
//!               result queue              response queue             analytics
//!                      │                         │
//!          sink::ResultSerializer      read() ── response gate
//! ```
//!
//! # Design Decisions
//! - Coordination is queue hand-off plus one atomic counter, no locks
//! - A full pending queue blocks `write` (backpressure, not an error)
//! - Non-request payloads are accepted and silently dropped
//! - Completion order, not submission order, reaches sinks and readers

pub mod error;
pub mod pool;
pub mod records;
pub mod sender;

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use url::Url;

use crate::analytics::{ElasticAnalyzer, ResponseAnalyzer};
use crate::client::{ClientFactory, HttpClientConfig, HttpClientFactory, SharedClientFactory};
use crate::config::validation::validate_output;
use crate::config::OutputConfig;
use crate::observability::metrics::{self, MetricsGauge, QueueGauge};
use crate::payload;
use crate::sink::{ResultSerializer, ResultSink, TsvSink};

pub use error::OutputError;
pub use pool::{ActiveWorkers, INITIAL_DYNAMIC_WORKERS};
pub use records::{ResponseRecord, ResultRecord, RESULT_HEADER};
pub use sender::{IDLE_CYCLES_BEFORE_EXIT, IDLE_POLL_INTERVAL};

use pool::{PoolHandle, PoolManager};
use sender::SenderContext;

/// Replays captured requests against a target through an elastic sender pool.
pub struct HttpOutput {
    address: Url,
    config: Arc<OutputConfig>,
    pending: flume::Sender<Bytes>,
    responses: flume::Receiver<ResponseRecord>,
    scale_requests: mpsc::Sender<usize>,
    workers: Arc<ActiveWorkers>,
    gauge: Option<Arc<dyn QueueGauge>>,
    pool: PoolHandle,
}

impl HttpOutput {
    /// Start an output with the default collaborators.
    /// Must be called inside a Tokio runtime.
    pub fn new(address: &str, config: OutputConfig) -> Result<Self, OutputError> {
        Self::builder(address, config).build()
    }

    pub fn builder(address: impl Into<String>, config: OutputConfig) -> HttpOutputBuilder {
        HttpOutputBuilder {
            address: address.into(),
            config,
            sinks: Vec::new(),
            clients: None,
            analyzer: None,
            gauge: None,
        }
    }

    /// Accept one captured payload.
    ///
    /// Only request payloads are queued; anything else is reported as written
    /// and dropped. The bytes are copied, so the caller may reuse `data` as
    /// soon as this returns. Waits while the pending queue is full.
    pub async fn write(&self, data: &[u8]) -> Result<usize, OutputError> {
        if !payload::is_request_payload(data) {
            metrics::record_dropped_payload("kind");
            return Ok(data.len());
        }

        let request = Bytes::copy_from_slice(data);
        self.pending
            .send_async(request)
            .await
            .map_err(|_| OutputError::Closed)?;

        let depth = self.pending.len();
        if let Some(gauge) = &self.gauge {
            gauge.report(depth);
        }

        if self.config.is_dynamic() {
            let active = self.workers.get();
            // At most one scale request is outstanding; a full slot is fine.
            if depth > active && self.scale_requests.try_send(depth).is_ok() {
                metrics::record_scale_request();
                tracing::debug!(depth, active, "Requested more senders");
            }
        }

        Ok(data.len())
    }

    /// Wait for the next replayed response, in completion order.
    pub async fn next_response(&self) -> Result<ResponseRecord, OutputError> {
        receive(&self.responses, self.config.debug).await
    }

    /// Write the next response into `buf` as header + raw payload.
    ///
    /// One response per call. If `buf` is too small the response is consumed
    /// and `BufferTooSmall` is returned.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, OutputError> {
        let frame = self.next_response().await?.frame();
        if buf.len() < frame.len() {
            return Err(OutputError::BufferTooSmall {
                needed: frame.len(),
                available: buf.len(),
            });
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    /// A handle on the response gate that outlives `shutdown`.
    ///
    /// Responses produced while draining are still delivered to it. It ends
    /// once every sender has stopped. Every handle competes for the same
    /// responses.
    pub fn responses(&self) -> Responses {
        Responses {
            inner: self.responses.clone(),
            debug: self.config.debug,
        }
    }

    /// Requests waiting for a sender.
    pub fn queue_len(&self) -> usize {
        self.pending.len()
    }

    /// Senders currently alive.
    pub fn active_workers(&self) -> usize {
        self.workers.get()
    }

    /// Highest number of senders alive at once.
    pub fn peak_workers(&self) -> usize {
        self.workers.peak()
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Stop accepting work and drain the pool.
    ///
    /// Queued requests are still dispatched, every result is written and the
    /// sinks are flushed. Responses nobody holds a [`Responses`] handle for
    /// are discarded. Returns the number of result rows written.
    pub async fn shutdown(self, grace: Duration) -> Result<u64, OutputError> {
        let HttpOutput {
            pending,
            responses,
            scale_requests,
            pool,
            ..
        } = self;
        drop(pending);
        drop(scale_requests);
        drop(responses);

        let PoolHandle {
            manager,
            serializer,
        } = pool;
        let drained = async move {
            manager.await?;
            let rows = serializer.await?;
            Ok::<u64, OutputError>(rows)
        };

        let rows = time::timeout(grace, drained)
            .await
            .map_err(|_| OutputError::ShutdownTimeout(grace))??;
        tracing::info!(rows, "HTTP output drained");
        Ok(rows)
    }
}

/// Response gate handle returned by [`HttpOutput::responses`].
#[derive(Clone)]
pub struct Responses {
    inner: flume::Receiver<ResponseRecord>,
    debug: bool,
}

impl Responses {
    /// Next replayed response, or `Closed` once every sender has stopped.
    pub async fn recv(&self) -> Result<ResponseRecord, OutputError> {
        receive(&self.inner, self.debug).await
    }
}

async fn receive(
    responses: &flume::Receiver<ResponseRecord>,
    debug: bool,
) -> Result<ResponseRecord, OutputError> {
    let response = responses
        .recv_async()
        .await
        .map_err(|_| OutputError::Closed)?;

    if debug {
        tracing::debug!(
            id = %String::from_utf8_lossy(&response.id),
            payload = %String::from_utf8_lossy(&response.payload),
            "Received response"
        );
    }
    Ok(response)
}

impl fmt::Display for HttpOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP output: {}", self.address)
    }
}

/// Collaborators injected before the pool starts.
pub struct HttpOutputBuilder {
    address: String,
    config: OutputConfig,
    sinks: Vec<Box<dyn ResultSink>>,
    clients: Option<SharedClientFactory>,
    analyzer: Option<Arc<dyn ResponseAnalyzer>>,
    gauge: Option<Arc<dyn QueueGauge>>,
}

impl HttpOutputBuilder {
    /// Add a result sink next to the configured result log.
    pub fn sink(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Replace the HTTP client every sender builds.
    pub fn client_factory(mut self, factory: impl ClientFactory + 'static) -> Self {
        self.clients = Some(Arc::new(factory));
        self
    }

    /// Use this analyzer instead of the configured analytics endpoint.
    pub fn analyzer(mut self, analyzer: impl ResponseAnalyzer + 'static) -> Self {
        self.analyzer = Some(Arc::new(analyzer));
        self
    }

    /// Report queue depth here, whether or not `stats` is set.
    pub fn gauge(mut self, gauge: impl QueueGauge + 'static) -> Self {
        self.gauge = Some(Arc::new(gauge));
        self
    }

    /// Open sinks, start the serializer and the initial senders.
    pub fn build(self) -> Result<HttpOutput, OutputError> {
        let HttpOutputBuilder {
            address,
            config,
            mut sinks,
            clients,
            analyzer,
            gauge,
        } = self;

        validate_output(&config).map_err(OutputError::Config)?;
        let address = parse_target(&address)?;

        if let Some(path) = &config.result_log {
            sinks.insert(0, Box::new(TsvSink::create(path)?));
        }

        let analyzer = match (analyzer, &config.analytics_endpoint) {
            (Some(analyzer), _) => Some(analyzer),
            (None, Some(endpoint)) => {
                Some(Arc::new(ElasticAnalyzer::new(endpoint)?) as Arc<dyn ResponseAnalyzer>)
            }
            (None, None) => None,
        };

        let gauge = match gauge {
            Some(gauge) => Some(gauge),
            None if config.stats => {
                Some(Arc::new(MetricsGauge::new("output_http")) as Arc<dyn QueueGauge>)
            }
            None => None,
        };

        let clients = clients.unwrap_or_else(|| {
            Arc::new(HttpClientFactory::new(
                address.clone(),
                HttpClientConfig::from(&config),
            ))
        });

        let config = Arc::new(config);
        let (pending_tx, pending_rx) = flume::bounded(config.queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.result_queue_capacity);
        let (responses_tx, responses_rx) = flume::bounded(config.response_queue_capacity);
        let (scale_tx, scale_rx) = mpsc::channel(1);

        let initial = if config.is_dynamic() {
            INITIAL_DYNAMIC_WORKERS
        } else {
            config.workers
        };
        scale_tx.try_send(initial).map_err(|_| OutputError::Closed)?;

        let workers = Arc::new(ActiveWorkers::new());
        let ctx = SenderContext {
            config: config.clone(),
            pending: pending_rx,
            results: results_tx,
            responses: responses_tx,
            clients,
            analyzer,
            workers: workers.clone(),
        };
        let pool = PoolManager::new(ctx, scale_rx).start(ResultSerializer::new(sinks, results_rx));

        tracing::info!(
            target_url = %address,
            dynamic = config.is_dynamic(),
            workers = initial,
            track_responses = config.track_responses,
            "HTTP output started"
        );

        Ok(HttpOutput {
            address,
            config,
            pending: pending_tx,
            responses: responses_rx,
            scale_requests: scale_tx,
            workers,
            gauge,
            pool,
        })
    }
}

/// Accepts "host:port" or a full `http://` URL.
fn parse_target(address: &str) -> Result<Url, OutputError> {
    let invalid = |reason: String| OutputError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;

    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
