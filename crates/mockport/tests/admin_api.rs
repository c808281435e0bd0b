//! Integration tests for the admin API
//!
//! These tests drive the JSON API in-process and then talk to the mock
//! endpoints it creates over real sockets.

use mockport::admin_api::AdminApiServer;
use mockport::{EndpointManager, Settings};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct Harness {
    _dir: tempfile::TempDir,
    base_url: String,
    client: Client,
}

/// Start an admin API on an ephemeral port backed by a fresh data directory
async fn start_admin() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::new(dir.path()).with_bind_host("127.0.0.1");
    let manager = Arc::new(EndpointManager::open(settings).await.unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(AdminApiServer::serve(listener, manager));

    Harness {
        _dir: dir,
        base_url,
        client: Client::builder().timeout(TEST_TIMEOUT).build().unwrap(),
    }
}

fn free_port() -> u16 {
    port_check::free_local_port().expect("no free port")
}

impl Harness {
    async fn create(&self, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/api/mocks", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("create request failed");
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let h = start_admin().await;
    let resp = h
        .client
        .get(format!("{}/health", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_http_mock_and_port_conflict() {
    let h = start_admin().await;
    let port = free_port();

    let (status, created) = h
        .create(json!({
            "name": "ping",
            "protocol": "http",
            "port": port,
            "path": "/ping",
            "content": "pong",
            "charset": "UTF-8"
        }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "running");

    let resp = h
        .client
        .get(format!("http://127.0.0.1:{port}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/plain; charset=UTF-8"
    );
    assert_eq!(resp.text().await.unwrap(), "pong");

    let resp = h
        .client
        .get(format!("http://127.0.0.1:{port}/other"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let (status, body) = h
        .create(json!({"name": "tcp", "protocol": "tcp", "port": port, "content": "x"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "port_in_use");

    let list: Value = h
        .client
        .get(format!("{}/api/mocks", h.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_is_observable() {
    let h = start_admin().await;
    let port = free_port();

    let (_, created) = h
        .create(json!({"name": "tcp", "protocol": "tcp", "port": port, "content": "v1"}))
        .await;
    let id = created["id"].as_str().unwrap();

    let resp = h
        .client
        .put(format!("{}/api/mocks/{id}", h.base_url))
        .json(&json!({"content": "v2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["content"], "v2");
    assert_eq!(updated["status"], "running");

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "v2");
}

#[tokio::test]
async fn test_delete_frees_port() {
    let h = start_admin().await;
    let port = free_port();

    let (_, created) = h
        .create(json!({"name": "web", "protocol": "http", "port": port, "content": "x"}))
        .await;
    let id = created["id"].as_str().unwrap();

    let resp = h
        .client
        .delete(format!("{}/api/mocks/{id}", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h
        .client
        .get(format!("{}/api/mocks/{id}", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn test_bad_requests() {
    let h = start_admin().await;

    let resp = h
        .client
        .post(format!("{}/api/mocks", h.base_url))
        .header("content-type", "application/json")
        .body("{oops")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, body) = h
        .create(json!({"name": "zero", "protocol": "http", "port": 0}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_port");

    let resp = h
        .client
        .delete(format!("{}/api/mocks/nope", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .client
        .get(format!("{}/unknown", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_file_management() {
    let h = start_admin().await;
    let port = free_port();

    let (status, created) = h
        .create(json!({"name": "drop", "protocol": "ftp", "port": port}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();
    let files_url = format!("{}/api/mocks/{id}/files", h.base_url);

    let resp = h
        .client
        .post(&files_url)
        .query(&[("path", "in"), ("name", "hello.txt")])
        .body("hi there")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let uploaded: Value = resp.json().await.unwrap();
    assert_eq!(uploaded["path"], "in/hello.txt");
    assert_eq!(uploaded["size"], 8);

    let listing: Value = h
        .client
        .get(&files_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["files"][0]["name"], "in");
    assert_eq!(listing["files"][0]["is_dir"], true);

    let listing: Value = h
        .client
        .get(&files_url)
        .query(&[("path", "in")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["current_path"], "in");
    let entry = &listing["files"][0];
    assert_eq!(entry["name"], "hello.txt");
    assert_eq!(entry["path"], "in/hello.txt");
    assert_eq!(entry["size"], 8);
    assert_eq!(entry["is_dir"], false);

    let resp = h
        .client
        .get(format!("{files_url}/in/hello.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("hello.txt"));
    assert_eq!(resp.text().await.unwrap(), "hi there");

    let resp = h
        .client
        .get(format!("{files_url}/in/missing.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h.client.get(format!("{files_url}/in")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h.client.delete(format!("{files_url}/in")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let listing: Value = h
        .client
        .get(&files_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["files"], json!([]));
}

#[tokio::test]
async fn test_file_paths_stay_inside_root() {
    let h = start_admin().await;
    let port = free_port();

    let (_, created) = h
        .create(json!({"name": "drop", "protocol": "sftp", "port": port}))
        .await;
    let id = created["id"].as_str().unwrap();
    let files_url = format!("{}/api/mocks/{id}/files", h.base_url);

    let resp = h
        .client
        .get(&files_url)
        .query(&[("path", "../..")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "access_denied");

    let resp = h
        .client
        .get(format!("{files_url}/..%2Fsecret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h
        .client
        .post(&files_url)
        .query(&[("name", "../../escaped.txt")])
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h
        .client
        .delete(format!("{files_url}/in%2F.."))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_files_need_a_file_endpoint() {
    let h = start_admin().await;
    let port = free_port();

    let (_, created) = h
        .create(json!({"name": "web", "protocol": "http", "port": port, "content": "x"}))
        .await;
    let id = created["id"].as_str().unwrap();

    let resp = h
        .client
        .get(format!("{}/api/mocks/{id}/files", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "no_file_root");

    let resp = h
        .client
        .get(format!("{}/api/mocks/nope/files", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .client
        .post(format!("{}/api/mocks/{id}/files", h.base_url))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors() {
    let h = start_admin().await;

    let resp = h
        .client
        .request(reqwest::Method::OPTIONS, format!("{}/api/mocks", h.base_url))
        .header("Origin", "http://ui.example")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "GET, POST, PUT, DELETE, OPTIONS"
    );

    let resp = h
        .client
        .get(format!("{}/health", h.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
