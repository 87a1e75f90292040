//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Solo los códigos que la API de jobs puede devolver. Cada error del
//! dominio cae en uno de ellos (ver `jobs::handlers::error_response`).

use std::fmt;

/// Código de estado de una respuesta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 200,

    /// Query o body inválido
    BadRequest = 400,

    /// Ruta o job inexistente
    NotFound = 404,

    /// La ruta existe con otro método
    MethodNotAllowed = 405,

    /// Transición de estado imposible (cancelar un job terminado)
    Conflict = 409,

    /// Body por encima de `max_body_bytes`
    PayloadTooLarge = 413,

    InternalServerError = 500,
}

impl StatusCode {
    /// Valor numérico
    ///
    /// ```
    /// use audio_jobs::http::StatusCode;
    /// assert_eq!(StatusCode::Conflict.as_u16(), 409);
    /// ```
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reason phrase de la status line
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    pub fn is_success(self) -> bool {
        self.as_u16() / 100 == 2
    }

    /// 5xx: se loguea como warning en el servidor
    pub fn is_server_error(self) -> bool {
        self.as_u16() / 100 == 5
    }
}

impl fmt::Display for StatusCode {
    /// `"409 Conflict"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
