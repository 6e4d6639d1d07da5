//! HTTP client that re-issues captured requests against the target.
//!
//! # Responsibilities
//! - Parse the captured request head and rebuild it against the target origin
//! - Rewrite the Host header unless the original host is preserved
//! - Follow a bounded number of redirects
//! - Serialize the response back to raw HTTP/1.x bytes, capped in size
//!
//! # Design Decisions
//! - Framing headers are dropped and hyper re-frames the body
//! - Chunked captured bodies are de-chunked before forwarding
//! - Only plain `http` targets are supported

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};
use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use tokio::time;
use url::Url;

use crate::client::{ClientFactory, OutboundClient, SendOutcome, TransportError};
use crate::config::OutputConfig;
use crate::payload;

/// Headers that describe the captured connection rather than the request.
const SKIPPED_HEADERS: [&str; 4] = ["connection", "keep-alive", "proxy-connection", "content-length"];

/// Settings each client is built with.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub redirect_limit: usize,
    pub timeout: Duration,
    pub preserve_original_host: bool,
    pub response_buffer_size: usize,
    pub debug: bool,
}

impl From<&OutputConfig> for HttpClientConfig {
    fn from(config: &OutputConfig) -> Self {
        Self {
            redirect_limit: config.redirect_limit,
            timeout: config.timeout(),
            preserve_original_host: config.preserve_original_host,
            response_buffer_size: config.response_buffer_size,
            debug: config.debug,
        }
    }
}

/// Client bound to a single target.
pub struct HttpClient {
    target: Url,
    config: HttpClientConfig,
    inner: Client<HttpConnector, Body>,
}

impl HttpClient {
    pub fn new(target: Url, config: HttpClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout));
        connector.set_nodelay(true);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            target,
            config,
            inner,
        }
    }

    /// Send a raw captured request and wait for the response.
    pub async fn send_raw(&self, raw: Bytes) -> SendOutcome {
        let outcome = match time::timeout(self.config.timeout, self.exchange(raw)).await {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::failed(TransportError::Timeout(self.config.timeout)),
        };

        if self.config.debug {
            tracing::debug!(
                target_url = %self.target,
                status = ?payload::response_status(&outcome.payload),
                bytes = outcome.payload.len(),
                "Exchange finished"
            );
        }
        outcome
    }

    async fn exchange(&self, raw: Bytes) -> SendOutcome {
        match self.fetch(raw).await {
            Ok(response) => read_response(response, self.config.response_buffer_size).await,
            Err(e) => SendOutcome::failed(e),
        }
    }

    async fn fetch(&self, raw: Bytes) -> Result<Response<Incoming>, TransportError> {
        let (request, mut location_base) = self.build_request(raw)?;
        let mut response = self.inner.request(request).await?;

        for _ in 0..self.config.redirect_limit {
            if !response.status().is_redirection() {
                break;
            }
            let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                break;
            };

            let next = location_base.join(location)?;
            tracing::debug!(location = %next, "Following redirect");

            let request = Request::get(next.as_str())
                .header(header::HOST, authority(&next))
                .body(Body::empty())?;
            location_base = next;
            response = self.inner.request(request).await?;
        }

        Ok(response)
    }

    /// Rebuild a captured request against the target. Also returns the URL
    /// relative redirect locations resolve against.
    fn build_request(&self, raw: Bytes) -> Result<(Request<Body>, Url), TransportError> {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut headers);
        let head_len = match parsed.parse(&raw) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                return Err(TransportError::MalformedRequest("incomplete request head".into()))
            }
            Err(e) => return Err(TransportError::MalformedRequest(e.to_string())),
        };

        let method = parsed
            .method
            .ok_or_else(|| TransportError::MalformedRequest("missing method".into()))?;
        let path = parsed
            .path
            .ok_or_else(|| TransportError::MalformedRequest("missing path".into()))?;
        let url = self.target_url(path)?;

        let mut builder = Request::builder().method(method).uri(url.as_str());
        let mut original_host = None;
        let mut chunked = false;

        for h in parsed.headers.iter() {
            if h.name.eq_ignore_ascii_case("host") {
                original_host = Some(h.value);
            } else if h.name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = String::from_utf8_lossy(h.value)
                    .to_ascii_lowercase()
                    .contains("chunked");
            } else if !SKIPPED_HEADERS.iter().any(|s| h.name.eq_ignore_ascii_case(s)) {
                builder = builder.header(h.name, h.value);
            }
        }

        let host = match original_host {
            Some(value) if self.config.preserve_original_host => HeaderValue::from_bytes(value)
                .map_err(|e| TransportError::MalformedRequest(e.to_string()))?,
            _ => HeaderValue::from_str(&authority(&self.target))
                .map_err(|e| TransportError::MalformedRequest(e.to_string()))?,
        };
        builder = builder.header(header::HOST, host);

        let mut body = raw.slice(head_len..);
        if chunked {
            body = payload::decode_chunked(&body)
                .ok_or_else(|| TransportError::MalformedRequest("broken chunked body".into()))?;
        }

        Ok((builder.body(Body::from(body))?, url))
    }

    /// Resolve an origin-form or absolute-form request target on the target.
    fn target_url(&self, path: &str) -> Result<Url, TransportError> {
        if path.starts_with('/') {
            return Ok(self.target.join(path)?);
        }
        let absolute = Url::parse(path)?;
        let mut url = self.target.join(absolute.path())?;
        url.set_query(absolute.query());
        Ok(url)
    }
}

impl OutboundClient for HttpClient {
    fn send(&self, request: Bytes) -> BoxFuture<'_, SendOutcome> {
        Box::pin(self.send_raw(request))
    }
}

/// Builds an `HttpClient` for every new sender.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    target: Url,
    config: HttpClientConfig,
}

impl HttpClientFactory {
    pub fn new(target: Url, config: HttpClientConfig) -> Self {
        Self { target, config }
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self) -> Box<dyn OutboundClient> {
        Box::new(HttpClient::new(self.target.clone(), self.config.clone()))
    }
}

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Serialize a response to raw bytes, keeping at most `limit` bytes.
async fn read_response(response: Response<Incoming>, limit: usize) -> SendOutcome {
    let (parts, body) = response.into_parts();

    let mut buf = BytesMut::with_capacity(limit.min(16 * 1024));
    buf.extend_from_slice(
        format!(
            "{:?} {} {}\r\n",
            parts.version,
            parts.status.as_str(),
            parts.status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in parts.headers.iter() {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");

    let mut error = None;
    let mut stream = Body::new(body).into_data_stream();
    while buf.len() < limit {
        match stream.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(e)) => {
                error = Some(TransportError::Body(e.to_string()));
                break;
            }
            None => break,
        }
    }
    buf.truncate(limit);

    SendOutcome {
        payload: buf.freeze(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(preserve_original_host: bool) -> HttpClient {
        HttpClient::new(
            Url::parse("http://127.0.0.1:8080").unwrap(),
            HttpClientConfig {
                redirect_limit: 0,
                timeout: Duration::from_secs(1),
                preserve_original_host,
                response_buffer_size: 1024,
                debug: false,
            },
        )
    }

    const CAPTURED: &[u8] =
        b"POST /orders?id=7 HTTP/1.1\r\nHost: shop.example.com\r\nContent-Length: 5\r\nConnection: keep-alive\r\nX-Trace: t1\r\n\r\nhello";

    #[tokio::test]
    async fn rewrites_host_to_target() {
        let (req, base) = client(false).build_request(Bytes::from_static(CAPTURED)).unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.uri().to_string(), "http://127.0.0.1:8080/orders?id=7");
        assert_eq!(req.headers()[header::HOST], "127.0.0.1:8080");
        assert_eq!(req.headers()["x-trace"], "t1");
        assert!(req.headers().get(header::CONNECTION).is_none());
        assert!(req.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(base.path(), "/orders");

        let body = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn keeps_original_host_when_asked() {
        let (req, _) = client(true).build_request(Bytes::from_static(CAPTURED)).unwrap();
        assert_eq!(req.headers()[header::HOST], "shop.example.com");
    }

    #[tokio::test]
    async fn dechunks_captured_body() {
        let raw = b"PUT /u HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let (req, _) = client(false).build_request(Bytes::from_static(raw)).unwrap();
        assert!(req.headers().get(header::TRANSFER_ENCODING).is_none());
        let body = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn absolute_form_targets_are_rebased() {
        let raw = b"GET http://origin.example.com/a/b?q=1 HTTP/1.1\r\n\r\n";
        let (req, _) = client(false).build_request(Bytes::from_static(raw)).unwrap();
        assert_eq!(req.uri().to_string(), "http://127.0.0.1:8080/a/b?q=1");
    }

    #[tokio::test]
    async fn incomplete_head_is_malformed() {
        let err = client(false)
            .build_request(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: a\r\n"))
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedRequest(_)));
    }

    #[test]
    fn authority_keeps_explicit_port() {
        assert_eq!(authority(&Url::parse("http://example.com:81/x").unwrap()), "example.com:81");
        assert_eq!(authority(&Url::parse("http://example.com/x").unwrap()), "example.com");
    }
}
