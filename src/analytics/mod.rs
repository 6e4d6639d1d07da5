//! Response analytics.
//!
//! # Data Flow
//! ```text
//! sender (after every exchange)
//!     → ResponseAnalyzer::analyze (record-and-return, never blocks)
//!     → elastic.rs bounded buffer
//!     → background task POSTs one JSON document per exchange
//! ```
//!
//! # Design Decisions
//! - Analysis is fire-and-forget from the sender's point of view
//! - The analyzer owns its buffering and I/O; a full buffer drops documents

pub mod elastic;

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::payload;

pub use elastic::ElasticAnalyzer;

/// Errors building an analyzer.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("invalid analytics endpoint: {0}")]
    Endpoint(String),

    #[error("analytics client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Consumer of completed exchanges.
pub trait ResponseAnalyzer: Send + Sync {
    fn analyze(
        &self,
        request: &[u8],
        response: &[u8],
        started: DateTime<Local>,
        stopped: DateTime<Local>,
    );
}

/// Summary of one exchange as indexed by the analytics store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsDocument {
    pub req_method: String,
    pub req_url: String,
    pub req_host: String,
    pub req_user_agent: String,
    pub resp_status: Option<u16>,
    pub resp_content_length: Option<u64>,
    pub resp_content_type: String,
    pub rtt_ms: f64,
    pub timestamp: String,
}

impl AnalyticsDocument {
    /// Build from a captured request payload (metadata line optional) and
    /// the raw replayed response.
    pub fn from_exchange(
        request: &[u8],
        response: &[u8],
        started: DateTime<Local>,
        stopped: DateTime<Local>,
    ) -> Self {
        let http = if payload::is_http_request(request) {
            request
        } else {
            payload::body(request)
        };

        let mut doc = Self {
            req_method: String::new(),
            req_url: String::new(),
            req_host: String::new(),
            req_user_agent: String::new(),
            resp_status: payload::response_status(response),
            resp_content_length: None,
            resp_content_type: String::new(),
            rtt_ms: (stopped - started).num_microseconds().unwrap_or_default() as f64 / 1000.0,
            timestamp: started.to_rfc3339(),
        };

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers);
        if req.parse(http).is_ok() {
            doc.req_method = req.method.unwrap_or_default().to_string();
            doc.req_url = req.path.unwrap_or_default().to_string();
            for h in req.headers.iter() {
                if h.name.eq_ignore_ascii_case("host") {
                    doc.req_host = String::from_utf8_lossy(h.value).into_owned();
                } else if h.name.eq_ignore_ascii_case("user-agent") {
                    doc.req_user_agent = String::from_utf8_lossy(h.value).into_owned();
                }
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut resp = httparse::Response::new(&mut headers);
        if resp.parse(response).is_ok() {
            for h in resp.headers.iter() {
                if h.name.eq_ignore_ascii_case("content-length") {
                    doc.resp_content_length = std::str::from_utf8(h.value)
                        .ok()
                        .and_then(|v| v.trim().parse().ok());
                } else if h.name.eq_ignore_ascii_case("content-type") {
                    doc.resp_content_type = String::from_utf8_lossy(h.value).into_owned();
                }
            }
        }

        doc
    }
}
