//! Server startup and job API integration tests.
//!
//! Each test spawns the real binary with a temp config (orchestrator
//! disabled, so no generation service is contacted) and talks to it over
//! HTTP.

use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::time::sleep;

use spotnik_core::testing::fixtures;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config
fn minimal_config(port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[generation]
base_url = "https://genapi.example.com"
api_key = "test-key"
"#,
        port
    )
}

/// Spawn the server and return a handle
fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_spotnik"))
        .env("SPOTNIK_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

struct TestServer {
    port: u16,
    _child: tokio::process::Child,
    _config: NamedTempFile,
}

impl TestServer {
    async fn start() -> Self {
        let port = get_available_port();
        let mut config = NamedTempFile::new().unwrap();
        config
            .write_all(minimal_config(port).as_bytes())
            .unwrap();
        config.flush().unwrap();

        let child = spawn_server(config.path());
        assert!(
            wait_for_server(port, 100).await,
            "Server did not start in time"
        );

        Self {
            port,
            _child: child,
            _config: config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client
        .get(server.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint_redacts_api_key() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client
        .get(server.url("/api/v1/config"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body = response.text().await.unwrap();
    assert!(!body.contains("test-key"), "API key must be redacted");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["generation"]["api_key_configured"], true);
}

#[tokio::test]
async fn test_job_submit_get_cancel_flow() {
    let server = TestServer::start().await;
    let client = Client::new();

    // Submit: with the orchestrator disabled the job stays pending.
    let spec = fixtures::job_spec("Solar Kettle");
    let response = client
        .post(server.url("/api/v1/jobs"))
        .json(&spec)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submitted: serde_json::Value = response.json().await.unwrap();
    let id = submitted["id"].as_str().unwrap().to_string();
    assert_eq!(submitted["status"], "pending");

    // Get
    let response = client
        .get(server.url(&format!("/api/v1/jobs/{}", id)))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let job: serde_json::Value = response.json().await.unwrap();
    assert_eq!(job["spec"]["product"]["name"], "Solar Kettle");
    assert_eq!(job["status"], "pending");

    // List with status filter
    let response = client
        .get(server.url("/api/v1/jobs?status=pending"))
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = response.json().await.unwrap();
    assert_eq!(list["jobs"].as_array().unwrap().len(), 1);

    // Retrying a pending job conflicts
    let response = client
        .post(server.url(&format!("/api/v1/jobs/{}/retry", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Cancel
    let response = client
        .delete(server.url(&format!("/api/v1/jobs/{}", id)))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // Gone
    let response = client
        .get(server.url(&format!("/api/v1/jobs/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_unknown_status_filter_is_rejected() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client
        .get(server.url("/api/v1/jobs?status=imaginary"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client.get(server.url("/metrics")).send().await.unwrap();
    assert!(response.status().is_success());
    let text = response.text().await.unwrap();
    assert!(text.contains("spotnik_jobs_by_status"));
    assert!(text.contains("# HELP"));
}
