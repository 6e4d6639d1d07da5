//! Outbound client subsystem.
//!
//! # Data Flow
//! ```text
//! captured request body (raw HTTP bytes)
//!     → OutboundClient::send
//!         → http.rs (parse head, rewrite target/Host, hyper exchange,
//!                    follow redirects, serialize response)
//!     → SendOutcome { payload, error }
//! ```
//!
//! # Design Decisions
//! - Each sender owns one client, built through a ClientFactory
//! - A failed exchange never raises: the error travels alongside whatever
//!   bytes were received so the sender keeps looping
//! - Timeouts are enforced inside the client, not by the pool

pub mod http;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use http::{HttpClient, HttpClientConfig, HttpClientFactory};

/// Failures of a single exchange with the target.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The captured request could not be turned into an HTTP request.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Connection or protocol failure.
    #[error("upstream error: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// Request construction failed.
    #[error("request build error: {0}")]
    Build(#[from] axum::http::Error),

    /// A request target or redirect location could not be resolved.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The exchange exceeded the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Reading the response body failed part way.
    #[error("response body error: {0}")]
    Body(String),
}

/// Result of one exchange: whatever response bytes arrived plus the error,
/// if any, that cut it short.
#[derive(Debug, Default)]
pub struct SendOutcome {
    pub payload: Bytes,
    pub error: Option<TransportError>,
}

impl SendOutcome {
    pub fn ok(payload: Bytes) -> Self {
        Self {
            payload,
            error: None,
        }
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            payload: Bytes::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A client that re-issues one captured request and waits for the answer.
pub trait OutboundClient: Send + Sync {
    fn send(&self, request: Bytes) -> BoxFuture<'_, SendOutcome>;
}

/// Builds the client owned by each new sender.
pub trait ClientFactory: Send + Sync {
    fn build(&self) -> Box<dyn OutboundClient>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Box<dyn OutboundClient> + Send + Sync,
{
    fn build(&self) -> Box<dyn OutboundClient> {
        self()
    }
}

/// Shared handle to a factory.
pub type SharedClientFactory = Arc<dyn ClientFactory>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl OutboundClient for Echo {
        fn send(&self, request: Bytes) -> BoxFuture<'_, SendOutcome> {
            Box::pin(async move { SendOutcome::ok(request) })
        }
    }

    #[tokio::test]
    async fn closures_are_factories() {
        let factory: SharedClientFactory = Arc::new(|| Box::new(Echo) as Box<dyn OutboundClient>);
        let client = factory.build();
        let outcome = client.send(Bytes::from_static(b"ping")).await;
        assert!(outcome.is_ok());
        assert_eq!(&outcome.payload[..], b"ping");
    }

    #[test]
    fn failed_outcome_has_no_payload() {
        let outcome = SendOutcome::failed(TransportError::Timeout(Duration::from_millis(5)));
        assert!(!outcome.is_ok());
        assert!(outcome.payload.is_empty());
        assert_eq!(
            outcome.error.unwrap().to_string(),
            "request timed out after 5ms"
        );
    }
}
