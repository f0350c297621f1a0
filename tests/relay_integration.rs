//! Integration tests for the relay upload/download/delete flow.
//!
//! These tests start an in-process server and exercise the full flow using
//! real HTTP requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::oneshot;

use pindrop::{Config, FileRegistry, FsStorage, router};

/// The redacted record as clients see it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    original_name: String,
    storage_key: String,
    size_bytes: u64,
    #[allow(dead_code)]
    origin_device: String,
    nickname: String,
    created_at: u64,
    expires_at: u64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    file: CatalogEntry,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    #[allow(dead_code)]
    detail: Option<String>,
}

/// Test server handle that manages the server lifecycle.
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    #[allow(dead_code)]
    runtime: Arc<tokio::runtime::Runtime>,
    _storage_dir: TempDir,
}

impl TestServer {
    /// Start a test server with production-like defaults.
    fn start() -> Self {
        Self::start_with(Duration::from_secs(600), Duration::from_secs(60), 64 * 1024)
    }

    /// Start a test server with explicit TTL, sweep interval, and upload cap.
    fn start_with(ttl: Duration, sweep_interval: Duration, max_upload_bytes: u64) -> Self {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());

        let storage_dir = TempDir::new().expect("Failed to create temp storage dir");

        let storage = FsStorage::new(storage_dir.path());
        runtime.block_on(async {
            storage.init().await.expect("Failed to init storage");
        });
        let storage = Arc::new(storage);

        let registry = Arc::new(FileRegistry::new(ttl));

        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            storage_path: storage_dir.path().to_path_buf(),
            public_url: None,
            max_upload_bytes,
            ttl,
            sweep_interval,
            keepalive_interval: Duration::from_secs(300),
        };

        // Run the sweep the way main does, on the server runtime.
        {
            let _guard = runtime.enter();
            tokio::spawn(pindrop::sweep::run(
                Arc::clone(&registry),
                Arc::clone(&storage),
                sweep_interval,
            ));
        }

        let app = router(registry, storage, &config);

        let listener = runtime.block_on(async {
            tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind")
        });
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let rt = Arc::clone(&runtime);
        std::thread::spawn(move || {
            rt.block_on(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("Server error");
            });
        });

        std::thread::sleep(Duration::from_millis(50));

        TestServer {
            addr,
            shutdown_tx: Some(shutdown_tx),
            runtime,
            _storage_dir: storage_dir,
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn blob_exists(&self, key: &str) -> bool {
        self._storage_dir.path().join("blobs").join(key).exists()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn upload(
    client: &Client,
    server: &TestServer,
    name: &str,
    data: &[u8],
    pin: &str,
    nickname: &str,
) -> reqwest::blocking::Response {
    let form = Form::new()
        .text("pin", pin.to_string())
        .text("nickname", nickname.to_string())
        .part("file", Part::bytes(data.to_vec()).file_name(name.to_string()));

    client
        .post(format!("{}/upload", server.url()))
        .multipart(form)
        .send()
        .expect("Upload request failed")
}

fn download_body(key: &str, pin: &str) -> serde_json::Value {
    json!({ "filename": key, "pin": pin })
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_upload_download_roundtrip() {
    let server = TestServer::start();
    let client = Client::new();

    let resp = upload(&client, &server, "report.txt", b"hello relay", "1234", "laptop");
    assert!(resp.status().is_success(), "Status: {}", resp.status());

    let body: UploadResponse = resp.json().expect("Failed to parse upload response");
    assert!(body.success);
    assert_eq!(body.file.original_name, "report.txt");
    assert_eq!(body.file.size_bytes, 11);
    assert_eq!(body.file.nickname, "laptop");
    assert!(body.file.expires_at > body.file.created_at);
    assert!(server.blob_exists(&body.file.storage_key));

    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&body.file.storage_key, "1234"))
        .send()
        .expect("Download request failed");

    assert!(resp.status().is_success());
    let disposition = resp
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        disposition.contains("report.txt"),
        "Content-Disposition was {disposition:?}"
    );
    assert_eq!(resp.bytes().unwrap().as_ref(), b"hello relay");
}

#[test]
fn test_filename_with_consecutive_dots_uploads_cleanly() {
    // "a..b.txt" is a legitimate filename; the derived key must be one the
    // blob store accepts, so the whole flow has to succeed.
    let server = TestServer::start();
    let client = Client::new();

    let resp = upload(&client, &server, "a..b.txt", b"dotted", "1234", "");
    assert!(resp.status().is_success(), "Status: {}", resp.status());

    let body: UploadResponse = resp.json().unwrap();
    assert!(!body.file.storage_key.contains(".."));
    assert!(server.blob_exists(&body.file.storage_key));

    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&body.file.storage_key, "1234"))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.bytes().unwrap().as_ref(), b"dotted");
}

#[test]
fn test_missing_blob_is_not_found() {
    // A record whose bytes vanished out from under it (manual cleanup,
    // disk trouble) must surface as a plain 404, not a 500.
    let server = TestServer::start();
    let client = Client::new();

    let body: UploadResponse = upload(&client, &server, "a.txt", b"data", "1234", "")
        .json()
        .unwrap();
    let key = body.file.storage_key;

    std::fs::remove_file(server._storage_dir.path().join("blobs").join(&key)).unwrap();

    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    let err: ErrorResponse = resp.json().expect("error body should be JSON");
    assert!(!err.error.is_empty());
}

#[test]
fn test_wrong_pin_is_forbidden() {
    let server = TestServer::start();
    let client = Client::new();

    let body: UploadResponse = upload(&client, &server, "a.txt", b"data", "1234", "")
        .json()
        .unwrap();

    for endpoint in ["download", "delete"] {
        let resp = client
            .post(format!("{}/{endpoint}", server.url()))
            .json(&download_body(&body.file.storage_key, "9999"))
            .send()
            .unwrap();
        assert_eq!(resp.status().as_u16(), 403, "endpoint {endpoint}");

        let error: ErrorResponse = resp.json().unwrap();
        assert!(!error.error.is_empty());
    }

    // The file is still there for the correct PIN.
    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&body.file.storage_key, "1234"))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
}

#[test]
fn test_unknown_key_is_not_found() {
    let server = TestServer::start();
    let client = Client::new();

    for endpoint in ["download", "delete"] {
        let resp = client
            .post(format!("{}/{endpoint}", server.url()))
            .json(&download_body("no-such-key", "1234"))
            .send()
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404, "endpoint {endpoint}");
    }
}

#[test]
fn test_upload_without_pin_is_rejected() {
    let server = TestServer::start();
    let client = Client::new();

    let form = Form::new().part("file", Part::bytes(b"data".to_vec()).file_name("a.txt"));
    let resp = client
        .post(format!("{}/upload", server.url()))
        .multipart(form)
        .send()
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let error: ErrorResponse = resp.json().unwrap();
    assert!(!error.error.is_empty());
}

#[test]
fn test_upload_without_file_is_rejected() {
    let server = TestServer::start();
    let client = Client::new();

    let form = Form::new().text("pin", "1234");
    let resp = client
        .post(format!("{}/upload", server.url()))
        .multipart(form)
        .send()
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}

#[test]
fn test_delete_removes_record_and_blob() {
    let server = TestServer::start();
    let client = Client::new();

    let body: UploadResponse = upload(&client, &server, "a.txt", b"data", "1234", "")
        .json()
        .unwrap();
    let key = body.file.storage_key;
    assert!(server.blob_exists(&key));

    let resp = client
        .post(format!("{}/delete", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
    let body: DeleteResponse = resp.json().unwrap();
    assert!(body.success);
    assert!(!server.blob_exists(&key));

    // Gone for good: both endpoints now report 404.
    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = client
        .post(format!("{}/delete", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[test]
fn test_duplicate_names_get_distinct_keys() {
    let server = TestServer::start();
    let client = Client::new();

    let first: UploadResponse = upload(&client, &server, "same.txt", b"one", "1111", "")
        .json()
        .unwrap();
    let second: UploadResponse = upload(&client, &server, "same.txt", b"two", "2222", "")
        .json()
        .unwrap();

    assert_ne!(first.file.storage_key, second.file.storage_key);

    // Each PIN only opens its own file.
    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&second.file.storage_key, "1111"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&second.file.storage_key, "2222"))
        .send()
        .unwrap();
    assert_eq!(resp.bytes().unwrap().as_ref(), b"two");
}

#[test]
fn test_oversized_upload_is_rejected() {
    // 1 KiB cap; the 4 KiB body must be cut short with 413 and leave no blob.
    let server = TestServer::start_with(
        Duration::from_secs(600),
        Duration::from_secs(60),
        1024,
    );
    let client = Client::new();

    let resp = upload(&client, &server, "big.bin", &vec![0u8; 4096], "1234", "");
    assert_eq!(resp.status().as_u16(), 413);

    let blobs = std::fs::read_dir(server._storage_dir.path().join("blobs"))
        .unwrap()
        .count();
    assert_eq!(blobs, 0, "oversized upload left a blob behind");
}

#[test]
fn test_expired_files_are_swept() {
    // 200ms TTL, 100ms sweep: the file should be gone well within a second.
    let server = TestServer::start_with(
        Duration::from_millis(200),
        Duration::from_millis(100),
        64 * 1024,
    );
    let client = Client::new();

    let body: UploadResponse = upload(&client, &server, "brief.txt", b"data", "1234", "")
        .json()
        .unwrap();
    let key = body.file.storage_key;

    // Present immediately after upload.
    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert!(resp.status().is_success());

    std::thread::sleep(Duration::from_millis(800));

    let resp = client
        .post(format!("{}/download", server.url()))
        .json(&download_body(&key, "1234"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404, "expired file still served");
    assert!(!server.blob_exists(&key), "expired blob not deleted");
}

#[test]
fn test_healthz() {
    let server = TestServer::start();
    let client = Client::new();

    let resp = client
        .get(format!("{}/healthz", server.url()))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().unwrap(), "ok");
}

#[test]
fn test_catalog_stream_sends_snapshot_on_connect() {
    use std::io::{BufRead, BufReader};

    let server = TestServer::start();
    let client = Client::new();

    let body: UploadResponse = upload(&client, &server, "seen.txt", b"data", "1234", "")
        .json()
        .unwrap();

    // A fresh subscriber gets the current catalog as its first event.
    let resp = client
        .get(format!("{}/events", server.url()))
        .timeout(Duration::from_secs(5))
        .send()
        .unwrap();
    assert!(resp.status().is_success());

    let mut reader = BufReader::new(resp);
    let mut data_line = String::new();
    for _ in 0..10 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if let Some(rest) = line.strip_prefix("data:") {
            data_line = rest.trim().to_string();
            break;
        }
    }

    assert!(!data_line.is_empty(), "no SSE data line received");
    let snapshot: Vec<serde_json::Value> = serde_json::from_str(&data_line).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0]["storageKey"], body.file.storage_key);
    // The PIN must never appear in any broadcast.
    assert!(!data_line.contains("1234"));
    assert!(!data_line.to_lowercase().contains("pin"));
}
