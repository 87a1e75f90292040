//! # Módulo HTTP
//! src/http/mod.rs
//!
//! HTTP/1.0 mínimo sobre `TcpStream` para la API de jobs:
//!
//! - `request`: parsing de la request line, headers y body (`Content-Length`)
//! - `response`: respuestas JSON serializadas a bytes
//! - `status`: los códigos que la API puede devolver
//!
//! Una conexión, un request, una respuesta. No hay keep-alive ni chunked
//! transfer encoding.

pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, Request};
pub use response::Response;
pub use status::StatusCode;
