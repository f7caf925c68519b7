//! Shared fakes and helpers for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use mixgate::adapter::{AdapterError, Checker, CheckerBuilder, ConsumerError, ReportConsumer};
use mixgate::config::{ConfigSchema, FieldKind, TypedParams, TypedValue};
use mixgate::control::{CheckError, CheckErrorCode, CheckRequest, ReportRequest};

/// Start a programmable HTTP backend on an ephemeral port.
///
/// Every request, whatever its path, is answered with `f()`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// A backend that always serves `body` with 200.
pub async fn start_static_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// Writes `yaml` to a fresh temp file.
pub fn services_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Replaces the contents of `file` with `yaml`.
pub fn rewrite(file: &tempfile::NamedTempFile, yaml: &str) {
    std::fs::write(file.path(), yaml).unwrap();
}

/// Checker kind `counting`: denies with its `Reason` param when set.
pub struct CountingBuilder {
    pub builds: AtomicUsize,
}

impl CountingBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            builds: AtomicUsize::new(0),
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

struct CountingChecker {
    reason: Option<String>,
}

impl Checker for CountingChecker {
    fn name(&self) -> &str {
        "counting"
    }

    fn check(&self, _request: &CheckRequest) -> Result<Option<CheckError>, AdapterError> {
        Ok(self
            .reason
            .as_ref()
            .map(|r| CheckError::new(CheckErrorCode::PermissionDenied, r.clone())))
    }
}

impl CheckerBuilder for CountingBuilder {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("Reason", FieldKind::String)
    }

    fn build_checker(&self, params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let reason = match params.get("Reason") {
            Some(TypedValue::String(r)) => Some(r.clone()),
            _ => None,
        };
        Ok(Arc::new(CountingChecker { reason }))
    }
}

/// Report consumer that keeps everything it receives.
pub struct MemoryConsumer {
    name: String,
    pub received: Mutex<Vec<Arc<ReportRequest>>>,
}

impl MemoryConsumer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Arc<ReportRequest>> {
        self.received.lock().unwrap().clone()
    }
}

impl ReportConsumer for MemoryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
        self.received.lock().unwrap().extend(reports.iter().cloned());
        Ok(())
    }
}
