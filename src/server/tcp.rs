//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Servidor HTTP/1.0 con un thread por conexión. Cada conexión lee un
//! request (headers + body según `Content-Length`), lo despacha al router y
//! cierra. Los handlers nunca esperan a un job: solo leen o escriben el
//! registro.

use crate::config::Config;
use crate::http::request::header_end;
use crate::http::{Method, Request, Response, StatusCode};
use crate::jobs::manager::{JobManager, JobManagerConfig};
use crate::jobs::handlers as job_handlers;
use crate::router::Router;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Límite del bloque de headers
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Tiempo máximo esperando bytes del cliente
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes que se descartan tras rechazar un request demasiado grande
const DRAIN_LIMIT: u64 = 8 * 1024 * 1024;

/// Resultado de leer un request del socket
#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
    /// El peer cerró sin mandar nada
    Closed,

    /// Bytes crudos del request completo
    Request(Vec<u8>),

    /// Headers o body por encima del límite
    TooLarge,
}

/// Servidor HTTP/1.0 concurrente
pub struct Server {
    config: Config,
    router: Arc<Router<JobManager>>,
    job_manager: Arc<JobManager>,
}

impl Server {
    /// Crea el servidor con un `JobManager` armado desde la configuración
    pub fn new(config: Config) -> Self {
        let job_manager = JobManager::new(JobManagerConfig::from_config(&config));
        Self::with_manager(config, Arc::new(job_manager))
    }

    /// Crea el servidor sobre un `JobManager` existente
    pub fn with_manager(config: Config, job_manager: Arc<JobManager>) -> Self {
        Self {
            config,
            router: Arc::new(Self::build_router()),
            job_manager,
        }
    }

    /// Rutas de la API de jobs
    pub fn build_router() -> Router<JobManager> {
        let mut router = Router::new();
        router.register(Method::POST, "/jobs/submit", job_handlers::submit_handler);
        router.register(Method::GET, "/jobs/status", job_handlers::status_handler);
        router.register(Method::POST, "/jobs/cancel", job_handlers::cancel_handler);
        router.register(Method::GET, "/jobs", job_handlers::list_handler);
        router
    }

    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.job_manager
    }

    /// Hace bind en la dirección configurada y atiende para siempre
    pub fn run(&self) -> io::Result<()> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)?;
        tracing::info!(%address, "server listening (one thread per connection)");
        self.serve(listener)
    }

    /// Atiende conexiones de un listener ya abierto
    pub fn serve(&self, listener: TcpListener) -> io::Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let router = Arc::clone(&self.router);
                    let job_manager = Arc::clone(&self.job_manager);
                    let max_body = self.config.max_body_bytes;

                    let spawned = thread::Builder::new()
                        .name("http-conn".to_string())
                        .spawn(move || {
                            if let Err(e) =
                                Self::handle_connection(stream, &router, &job_manager, max_body)
                            {
                                tracing::warn!(error = %e, "connection error");
                            }
                        });

                    if let Err(e) = spawned {
                        tracing::error!(error = %e, "failed to spawn connection thread");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                }
            }
        }

        Ok(())
    }

    fn handle_connection(
        mut stream: TcpStream,
        router: &Router<JobManager>,
        job_manager: &JobManager,
        max_body: usize,
    ) -> io::Result<()> {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("request", id = %short_request_id(&request_id));
        let _enter = span.enter();

        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let raw = match read_request(&mut stream, max_body)? {
            ReadOutcome::Closed => {
                tracing::debug!("connection closed without request");
                return Ok(());
            }
            ReadOutcome::TooLarge => None,
            ReadOutcome::Request(raw) => Some(raw),
        };

        let rejected = raw.is_none();
        let (mut response, method, path) = match raw {
            None => (
                Response::error(
                    StatusCode::PayloadTooLarge,
                    &format!("Request exceeds {} bytes", max_body),
                ),
                "-",
                "-".to_string(),
            ),
            Some(raw) => match Request::parse(&raw) {
                Ok(request) => {
                    let response = router.route(&request, job_manager);
                    (response, request.method().as_str(), request.path().to_string())
                }
                Err(e) => (
                    Response::error(StatusCode::BadRequest, &format!("Invalid request: {}", e)),
                    "-",
                    "-".to_string(),
                ),
            },
        };

        response.add_header("X-Request-Id", &request_id);

        stream.write_all(&response.to_bytes())?;
        stream.flush()?;
        if rejected {
            drain(&mut stream);
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let status = response.status().as_u16();
        if response.status().is_server_error() {
            tracing::warn!(method, %path, status, latency_ms, "request handled");
        } else {
            tracing::info!(method, %path, status, latency_ms, "request handled");
        }

        Ok(())
    }
}

/// Lee headers y luego el body declarado en `Content-Length`
///
/// Un peer que cierra antes de completar el body deja un request truncado;
/// el parser y los handlers lo rechazan después.
fn read_request<R: Read>(stream: &mut R, max_body: usize) -> io::Result<ReadOutcome> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_len = loop {
        if let Some(end) = header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Ok(ReadOutcome::TooLarge);
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(ReadOutcome::Closed);
            }
            return Ok(ReadOutcome::Request(buffer));
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let content_length = declared_length(&buffer[..head_len]);
    if content_length > max_body {
        return Ok(ReadOutcome::TooLarge);
    }

    let total = head_len + content_length;
    while buffer.len() < total {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    buffer.truncate(total);

    Ok(ReadOutcome::Request(buffer))
}

/// Descarta el resto del request: cerrar con datos sin leer envía RST
fn drain(stream: &mut TcpStream) {
    let _ = stream.shutdown(Shutdown::Write);
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let _ = io::copy(&mut Read::take(&mut *stream, DRAIN_LIMIT), &mut io::sink());
}

fn short_request_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// `Content-Length` del bloque de headers (0 si falta o es inválido)
fn declared_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Entrega los bytes de a pocos, como un socket lento
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(self.data.len()).min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn manager(root: &std::path::Path) -> JobManager {
        JobManager::new(JobManagerConfig {
            separated_dir: root.join("separated"),
            generated_dir: root.join("generated"),
            uploads_dir: root.join("uploads"),
            models_dir: root.join("models"),
            ..JobManagerConfig::default()
        })
    }

    /// Atiende una sola conexión y retorna la respuesta cruda
    fn roundtrip(raw: &[u8], max_body: usize) -> String {
        let tmp = tempfile::tempdir().unwrap();
        let job_manager = manager(tmp.path());
        let router = Server::build_router();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(raw).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let (stream, _) = listener.accept().unwrap();
        Server::handle_connection(stream, &router, &job_manager, max_body).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    // ==================== Lectura del request ====================

    #[test]
    fn test_read_request_waits_for_full_body() {
        let raw = b"POST /jobs/submit HTTP/1.0\r\nContent-Length: 11\r\n\r\n{\"a\":\"bc\"}\nEXTRA";
        let mut reader = Trickle { data: raw, step: 3 };

        let outcome = read_request(&mut reader, 1024).unwrap();
        let expected = &raw[..raw.len() - 5];
        assert_eq!(outcome, ReadOutcome::Request(expected.to_vec()));
    }

    #[test]
    fn test_read_request_rejects_large_body() {
        let raw = b"POST /jobs/submit HTTP/1.0\r\nContent-Length: 5000\r\n\r\n";
        let outcome = read_request(&mut &raw[..], 1024).unwrap();
        assert_eq!(outcome, ReadOutcome::TooLarge);
    }

    #[test]
    fn test_read_request_closed() {
        assert_eq!(read_request(&mut &b""[..], 10).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_declared_length_is_case_insensitive() {
        assert_eq!(declared_length(b"GET / HTTP/1.0\r\ncontent-LENGTH: 42\r\n\r\n"), 42);
        assert_eq!(declared_length(b"GET / HTTP/1.0\r\n\r\n"), 0);
        assert_eq!(declared_length(b"GET / HTTP/1.0\r\nContent-Length: nope\r\n\r\n"), 0);
    }

    // ==================== Conexiones ====================

    #[test]
    fn test_list_jobs_over_tcp() {
        let text = roundtrip(b"GET /jobs HTTP/1.0\r\n\r\n", 1024);
        assert!(text.starts_with("HTTP/1.0 200 OK"));
        assert!(text.contains("X-Request-Id:"));
        assert!(text.contains(r#""count":0"#));
    }

    #[test]
    fn test_unknown_route_is_404() {
        let text = roundtrip(b"GET /nope HTTP/1.0\r\n\r\n", 1024);
        assert!(text.contains("404 Not Found"));
    }

    #[test]
    fn test_wrong_method_is_405() {
        let text = roundtrip(b"GET /jobs/submit?kind=generation HTTP/1.0\r\n\r\n", 1024);
        assert!(text.contains("405 Method Not Allowed"));
        assert!(text.contains("Allow: POST"));
    }

    #[test]
    fn test_parse_error_is_400() {
        let text = roundtrip(b"\x00\x01\x02\x03garbage\r\n\r\n", 1024);
        assert!(text.contains("400 Bad Request"));
        assert!(text.contains("Invalid request"));
    }

    #[test]
    fn test_oversized_body_is_413() {
        let text = roundtrip(
            b"POST /jobs/submit?kind=generation HTTP/1.0\r\nContent-Length: 99\r\n\r\n{}",
            16,
        );
        assert!(text.contains("413 Payload Too Large"));
    }

    #[test]
    fn test_peer_closed_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let job_manager = manager(tmp.path());
        let router = Server::build_router();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(TcpStream::connect(addr).unwrap());

        let (stream, _) = listener.accept().unwrap();
        Server::handle_connection(stream, &router, &job_manager, 1024).unwrap();
    }
}
