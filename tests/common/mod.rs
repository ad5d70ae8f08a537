//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ogc_secure_proxy::audit::AuditQueue;
use ogc_secure_proxy::catalogue::{CatalogueDocument, RuleSource};
use ogc_secure_proxy::config::AuditSinkConfig;
use ogc_secure_proxy::observability::ProxyStats;
use ogc_secure_proxy::policy::{SnapshotRefresher, SnapshotStore};
use ogc_secure_proxy::{HttpServer, ProxyConfig, ProxyOrchestrator, Shutdown};

/// Canned origin answer.
#[derive(Clone)]
pub struct MockReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl MockReply {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, content_type, body)
    }

    pub fn with_status(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }
}

/// A programmable origin server. Every request target (path and query) is
/// recorded, the reply comes from the closure.
pub struct MockOrigin {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub fn url(&self) -> String {
        format!("http://{}/ows", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_target(&self) -> Option<String> {
        self.requests.lock().unwrap().last().cloned()
    }
}

pub async fn start_mock_origin<F>(f: F) -> MockOrigin
where
    F: Fn(&str) -> MockReply + Send + Sync + 'static,
{
    start_mock_origin_at("127.0.0.1:0".parse().unwrap(), f).await
}

/// Same as [`start_mock_origin`] on a fixed address, e.g. one handed out
/// earlier by [`closed_port`].
pub async fn start_mock_origin_at<F>(addr: SocketAddr, f: F) -> MockOrigin
where
    F: Fn(&str) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let f = f.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 4096];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head);
                let target = text
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                recorded.lock().unwrap().push(target.clone());

                let reply = f(&target);
                let status_text = match reply.status {
                    200 => "200 OK",
                    400 => "400 Bad Request",
                    403 => "403 Forbidden",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_text,
                    reply.content_type,
                    reply.body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&reply.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockOrigin { addr, requests }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy wired to an in-memory catalogue.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub audit: Arc<AuditQueue>,
    pub store: Arc<SnapshotStore>,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
}

impl TestProxy {
    pub fn url(&self, service: &str, query: &str) -> String {
        format!("http://{}/proxy/{}?{}", self.addr, service, query)
    }

    pub async fn get(&self, service: &str, query: &str) -> reqwest::Response {
        self.client.get(self.url(service, query)).send().await.unwrap()
    }

    pub async fn get_as(&self, service: &str, query: &str, user: &str, groups: &str) -> reqwest::Response {
        self.client
            .get(self.url(service, query))
            .header("x-auth-user", user)
            .header("x-auth-groups", groups)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config(audit_sink: AuditSinkConfig) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.timeouts.connect_secs = 1;
    config.timeouts.upstream_secs = 5;
    config.timeouts.request_secs = 10;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 20;
    config.audit.sink = audit_sink;
    config
}

/// Start the proxy on an ephemeral port. `catalogue` is a TOML catalogue
/// document; `{public}` in it is replaced by the proxy's own base URL.
pub async fn start_proxy(catalogue: &str, mut config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.public.base_url = format!("http://{addr}");

    let doc: CatalogueDocument = toml::from_str(catalogue).unwrap();
    let store = Arc::new(SnapshotStore::new(ogc_secure_proxy::policy::RuleSnapshot::empty()));
    SnapshotRefresher::new(store.clone(), RuleSource::Static(doc), Duration::from_secs(3600))
        .refresh_once()
        .await
        .unwrap();

    let audit = Arc::new(AuditQueue::new(config.audit.queue_capacity));
    let proxy = Arc::new(
        ProxyOrchestrator::new(&config, store.clone(), audit.clone(), Arc::new(ProxyStats::new())).unwrap(),
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, proxy);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestProxy {
        addr,
        audit,
        store,
        shutdown,
        client: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
    }
}

/// Wait until the audit queue holds at least `n` entries.
pub async fn wait_for_audit(queue: &AuditQueue, n: usize) {
    for _ in 0..100 {
        if queue.len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("audit queue never reached {n} entries");
}
