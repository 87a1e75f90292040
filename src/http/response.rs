//! # Respuestas HTTP
//! src/http/response.rs
//!
//! Todas las respuestas de la API son JSON. `Content-Length` se calcula al
//! serializar, así que nunca queda desfasado del body.
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: application/json\r\n
//! X-Request-Id: 9f2c...\r\n
//! Content-Length: 38\r\n
//! \r\n
//! {"job_id":"5f0c...","status":"queued"}
//! ```

use super::StatusCode;
use serde::Serialize;

const JSON: &str = "application/json";

/// Respuesta lista para escribirse en el socket
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,

    /// En orden de inserción; un nombre repetido reemplaza al anterior
    headers: Vec<(String, String)>,

    body: Vec<u8>,
}

impl Response {
    /// Respuesta sin body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Respuesta 200 con `value` serializado como JSON
    ///
    /// ```
    /// use audio_jobs::http::Response;
    ///
    /// let response = Response::json(&serde_json::json!({"status": "queued"}));
    /// assert_eq!(response.body(), br#"{"status":"queued"}"#);
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json_with_status(StatusCode::Ok, value)
    }

    /// JSON con cualquier código; si `value` no serializa, 500
    pub fn json_with_status<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status).with_header("Content-Type", JSON).with_body(body),
            Err(e) => Self::error(
                StatusCode::InternalServerError,
                &format!("failed to serialize response: {}", e),
            ),
        }
    }

    /// `{"error": message}` con el código dado
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status)
            .with_header("Content-Type", JSON)
            .with_body(body.into_bytes())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega o reemplaza un header (nombre sin distinguir mayúsculas)
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Status line, headers, `Content-Length`, línea vacía y body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.0 {}\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Valor de un header (sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
