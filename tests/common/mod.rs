//! Shared utilities for integration tests.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use service_harness::http::{HttpServer, ServeOutcome};
use service_harness::lifecycle::Shutdown;
use service_harness::net::Listener;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// A config file in its own temp directory, removed on drop.
///
/// Stores point at port 1 so they fail fast without a real MySQL or Redis.
pub struct TempConfig {
    _dir: TempDir,
    pub path: PathBuf,
    pub log_file: PathBuf,
}

#[allow(dead_code)]
impl TempConfig {
    pub fn write(server_section: &str) -> Self {
        Self::write_on_port(0, server_section)
    }

    pub fn write_on_port(port: u16, server_section: &str) -> Self {
        let dir = tempfile::Builder::new().prefix("harness-it-").tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let log_file = dir.path().join("logs").join("service.log");

        let content = format!(
            r#"
name = "harness-it"
version = "0.0.1"
mode = "release"
port = {port}

[log]
level = "debug"
filename = "{log}"
max_size = 10
max_age = 1
max_backups = 2

[mysql]
host = "127.0.0.1"
port = 1
user = "root"
password = "secret"
dbname = "app"
max_open_conns = 4
max_idle_conns = 1

[redis]
host = "127.0.0.1"
port = 1
db = 0
password = ""
pool_size = 4

{server_section}
"#,
            log = log_file.display(),
        );
        fs::write(&path, content).unwrap();

        Self {
            _dir: dir,
            path,
            log_file,
        }
    }

    /// Every JSON line written to the log file so far.
    pub fn log_lines(&self) -> Vec<serde_json::Value> {
        fs::read_to_string(&self.log_file)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).expect("log line is JSON"))
            .collect()
    }
}

/// A server on a loopback port, driven directly without the harness.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<ServeOutcome>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start(router: Router, drain: Duration) -> Self {
        let listener = Listener::bind(SocketAddr::from(([127, 0, 0, 1], 0)), 128)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(HttpServer::new(router, drain).run(listener, shutdown.subscribe()));
        Self { addr, shutdown, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) -> ServeOutcome {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server stops")
            .unwrap()
    }
}

/// Send a bare HTTP/1.1 GET and return every byte the server wrote back.
#[allow(dead_code)]
pub async fn raw_get(addr: SocketAddr, path: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received)).await;
    received
}
