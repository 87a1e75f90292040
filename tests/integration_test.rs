//! Tests de integración para el servidor HTTP
//! tests/integration_test.rs
//!
//! Cada test levanta su propio servidor en un puerto efímero, con backends
//! stub, y habla con él por TCP como lo haría un cliente real.

use audio_jobs::config::Config;
use audio_jobs::error::JobError;
use audio_jobs::jobs::generation::{InferencePlan, ModelRef, ModelStore, MusicGenerator};
use audio_jobs::jobs::separation::Separator;
use audio_jobs::jobs::{Backends, JobContext, JobManager, JobManagerConfig};
use audio_jobs::server::Server;
use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ==================== Stubs ====================

struct InstantStems;

impl Separator for InstantStems {
    fn model(&self) -> &str {
        "stub-model"
    }

    fn separate(
        &self,
        _input: &Path,
        out_dir: &Path,
        _ctx: &JobContext,
    ) -> Result<Vec<PathBuf>, JobError> {
        let vocals = out_dir.join("in_(Vocals).wav");
        let instrumental = out_dir.join("in_(Instrumental).wav");
        fs::write(&vocals, b"RIFF")?;
        fs::write(&instrumental, b"RIFF")?;
        Ok(vec![vocals, instrumental])
    }
}

struct AnyModel;

impl ModelStore for AnyModel {
    fn resolve(&self, model: &ModelRef) -> Result<PathBuf, JobError> {
        Ok(PathBuf::from("/models").join(&model.repo_id))
    }
}

/// Generador lento: da tiempo a cancelar
struct SlowGenerator;

impl MusicGenerator for SlowGenerator {
    fn command(&self, plan: &InferencePlan) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("echo 'Starting stage 1'; sleep 1; printf RIFF > out.wav")
            .current_dir(&plan.output_dir);
        cmd
    }
}

// ==================== Helpers ====================

/// Servidor corriendo en background
struct TestServer {
    addr: SocketAddr,
    root: tempfile::TempDir,
}

fn start_server() -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let manager_config = JobManagerConfig {
        separated_dir: root.path().join("outputs/separated"),
        generated_dir: root.path().join("outputs/generated"),
        uploads_dir: root.path().join("uploads"),
        models_dir: root.path().join("models"),
        ..JobManagerConfig::default()
    };
    let manager = JobManager::with_backends(
        manager_config,
        Backends {
            separator: Arc::new(InstantStems),
            models: Arc::new(AnyModel),
            generator: Arc::new(SlowGenerator),
        },
    );

    let config = Config {
        max_body_bytes: 4096,
        ..Config::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::with_manager(config, Arc::new(manager));
    thread::spawn(move || server.serve(listener));

    TestServer { addr, root }
}

/// Helper: envía un request HTTP y retorna la response completa
fn send_raw(addr: SocketAddr, raw: &[u8]) -> Result<String, Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(addr)?;

    // Configurar timeouts
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    stream.write_all(raw)?;
    stream.flush()?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;

    Ok(String::from_utf8_lossy(&response).into_owned())
}

fn send(addr: SocketAddr, method: &str, path: &str, body: &str) -> String {
    let raw = format!(
        "{} {} HTTP/1.0\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    send_raw(addr, raw.as_bytes()).expect("Failed to send request")
}

/// Helper: extrae el body JSON de una response HTTP
fn extract_json(response: &str) -> Value {
    let body = match response.find("\r\n\r\n") {
        Some(pos) => &response[pos + 4..],
        None => "",
    };
    serde_json::from_str(body).unwrap_or(Value::Null)
}

fn wait_status(addr: SocketAddr, id: &str, wanted: &str) -> Value {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let job = extract_json(&send(addr, "GET", &format!("/jobs/status?id={}", id), ""));
        if job["status"] == wanted || Instant::now() > deadline {
            return job;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

// ==================== Separación ====================

#[test]
fn test_separation_over_http() {
    let server = start_server();
    let uploads = server.root.path().join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    let input = uploads.join("track.wav");
    fs::write(&input, b"RIFF").unwrap();

    let body = serde_json::json!({ "input_path": input, "filename": "track.wav" }).to_string();
    let response = send(server.addr, "POST", "/jobs/submit?kind=separation", &body);

    assert!(response.contains("200 OK"), "Expected 200 OK, got: {}", response);
    let submitted = extract_json(&response);
    assert_eq!(submitted["status"], "queued");
    let id = submitted["job_id"].as_str().unwrap().to_string();

    let job = wait_status(server.addr, &id, "completed");
    assert_eq!(job["status"], "completed", "job: {}", job);
    assert_eq!(job["progress"], 100);
    assert_eq!(job["kind"], "separation");
    assert_eq!(job["output_files"].as_array().unwrap().len(), 2);
    assert_eq!(job["result"]["original_path"], "/uploads/track.wav");
}

#[test]
fn test_separation_missing_input_is_400() {
    let server = start_server();
    let response = send(
        server.addr,
        "POST",
        "/jobs/submit?kind=separation",
        r#"{"input_path": "/definitely/not/here.wav"}"#,
    );
    assert!(response.contains("400 Bad Request"), "got: {}", response);
}

// ==================== Generación y cancelación ====================

#[cfg(unix)]
#[test]
fn test_generation_cancel_over_http() {
    let server = start_server();
    let body = r#"{"genre": "ambient", "lyrics": "[intro]\nla la", "options": {"title": "Drift"}}"#;

    let submitted = extract_json(&send(
        server.addr,
        "POST",
        "/jobs/submit?kind=generation",
        body,
    ));
    let id = submitted["job_id"].as_str().unwrap().to_string();

    let running = wait_status(server.addr, &id, "processing");
    assert_eq!(running["status"], "processing");

    let response = send(server.addr, "POST", &format!("/jobs/cancel?id={}", id), "");
    assert!(response.contains("200 OK"), "got: {}", response);
    let cancelled = extract_json(&response);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["message"], "Cancellation requested");

    let again = send(server.addr, "POST", &format!("/jobs/cancel?id={}", id), "");
    assert!(again.contains("409 Conflict"), "got: {}", again);

    // Aunque el proceso termine, el estado no cambia
    thread::sleep(Duration::from_millis(1500));
    let job = extract_json(&send(server.addr, "GET", &format!("/jobs/status?id={}", id), ""));
    assert_eq!(job["status"], "cancelled");
    assert!(job["result"].is_null());
}

#[test]
fn test_generation_unknown_option_is_400() {
    let server = start_server();
    let response = send(
        server.addr,
        "POST",
        "/jobs/submit?kind=generation",
        r#"{"genre": "rock", "lyrics": "x", "options": {"tempo": 120}}"#,
    );
    assert!(response.contains("400 Bad Request"), "got: {}", response);
}

// ==================== Errores de protocolo ====================

#[test]
fn test_not_found() {
    let server = start_server();
    let response = send(server.addr, "GET", "/nonexistent", "");
    assert!(response.contains("404 Not Found"));
}

#[test]
fn test_unknown_job_is_404() {
    let server = start_server();
    let response = send(server.addr, "GET", "/jobs/status?id=does-not-exist", "");
    assert!(response.contains("404 Not Found"));
    assert!(extract_json(&response)["error"].is_string());
}

#[test]
fn test_wrong_method_is_405() {
    let server = start_server();
    let response = send(server.addr, "GET", "/jobs/cancel?id=x", "");
    assert!(response.contains("405 Method Not Allowed"));
    assert!(response.contains("Allow: POST"));
}

#[test]
fn test_body_too_large_is_413() {
    let server = start_server();
    let lyrics = "la ".repeat(3000);
    let body = format!(r#"{{"genre": "pop", "lyrics": "{}"}}"#, lyrics);
    let response = send(server.addr, "POST", "/jobs/submit?kind=generation", &body);
    assert!(response.contains("413 Payload Too Large"), "got: {}", response);
}

#[test]
fn test_malformed_request_is_400() {
    let server = start_server();
    let response = send_raw(server.addr, b"HELLO\r\n\r\n").unwrap();
    assert!(response.contains("400 Bad Request"));
}

#[test]
fn test_list_and_request_id() {
    let server = start_server();
    let uploads = server.root.path().join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    let input = uploads.join("a.wav");
    fs::write(&input, b"RIFF").unwrap();

    let body = serde_json::json!({ "input_path": input }).to_string();
    send(server.addr, "POST", "/jobs/submit?kind=separation", &body);

    let response = send(server.addr, "GET", "/jobs", "");
    assert!(response.contains("X-Request-Id:"));
    let listed = extract_json(&response);
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["jobs"][0]["kind"], "separation");
}

#[test]
fn test_concurrent_clients() {
    let server = start_server();
    let addr = server.addr;

    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(move || send(addr, "GET", "/jobs", "")))
        .collect();

    for handle in handles {
        let response = handle.join().unwrap();
        assert!(response.contains("200 OK"));
    }
}
