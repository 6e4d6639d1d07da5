//! Shared utilities for integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use http_replay::client::{ClientFactory, OutboundClient, SendOutcome, TransportError};
use http_replay::config::OutputConfig;
use http_replay::sink::{ResultSink, SinkError};

/// Captured request payload as the capture tool frames it.
pub fn request_payload(id: &str, path: &str) -> Vec<u8> {
    format!(
        "1 {} 1500000000000000000\nGET {} HTTP/1.1\r\nHost: example.com\r\nUser-Agent: replay-test\r\n\r\n",
        id, path
    )
    .into_bytes()
}

/// Output config without a result log file.
pub fn output_config(workers: usize) -> OutputConfig {
    OutputConfig {
        workers,
        result_log: None,
        ..OutputConfig::default()
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a backend that answers every request with the raw response `f`
/// builds from the request head.
pub async fn start_raw_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let response = f(head).await;
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let f = Arc::new(f);
    start_raw_backend(move |head| {
        let f = f.clone();
        async move {
            let (status, body) = f(head).await;
            let status_text = match status {
                200 => "200 OK",
                404 => "404 Not Found",
                500 => "500 Internal Server Error",
                503 => "503 Service Unavailable",
                _ => "200 OK",
            };
            format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_text,
                body.len(),
                body
            )
        }
    })
    .await
}

/// Result sink that keeps rows in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MemorySink {
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }
}

impl ResultSink for MemorySink {
    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError> {
        self.rows.lock().unwrap().push(row.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Shared state behind every client a `FakeClients` factory builds.
#[derive(Default)]
struct FakeState {
    built: AtomicUsize,
    seen: Mutex<Vec<Bytes>>,
}

/// Client factory whose clients answer "200 ok" after an optional delay,
/// an optional gate, or fail outright.
#[derive(Clone)]
pub struct FakeClients {
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    fail: bool,
    state: Arc<FakeState>,
}

impl FakeClients {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            gate: None,
            fail: false,
            state: Arc::default(),
        }
    }

    /// Every exchange waits for a permit from the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let clients = Self {
            gate: Some(gate.clone()),
            ..Self::new(Duration::ZERO)
        };
        (clients, gate)
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Clients built so far, one per sender.
    pub fn built(&self) -> usize {
        self.state.built.load(Ordering::SeqCst)
    }

    /// Request bodies received, in completion order.
    pub fn seen(&self) -> Vec<Bytes> {
        self.state.seen.lock().unwrap().clone()
    }
}

impl ClientFactory for FakeClients {
    fn build(&self) -> Box<dyn OutboundClient> {
        self.state.built.fetch_add(1, Ordering::SeqCst);
        Box::new(self.clone())
    }
}

impl OutboundClient for FakeClients {
    fn send(&self, request: Bytes) -> BoxFuture<'_, SendOutcome> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.state.seen.lock().unwrap().push(request);

            if self.fail {
                SendOutcome::failed(TransportError::Timeout(Duration::from_millis(1)))
            } else {
                SendOutcome::ok(Bytes::from_static(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
                ))
            }
        })
    }
}

/// Poll `check` every 20ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
