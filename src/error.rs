//! # Errores del Sistema de Jobs
//! src/error.rs
//!
//! Taxonomía única de errores. Los errores síncronos (id desconocido, input
//! inválido) llegan directo al cliente; los que ocurren dentro de un job se
//! convierten en estado terminal `failed` en el `TaskRunner`.

use crate::jobs::record::JobStatus;
use thiserror::Error;

/// Error de cualquier operación sobre jobs
#[derive(Debug, Error)]
pub enum JobError {
    /// El id no corresponde a ningún job registrado
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Input malformado, se rechaza antes de crear el job
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Falta un componente externo (binario, script, pesos del modelo)
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    /// El proceso externo terminó con código distinto de cero
    #[error("{}", external_process_message(.code))]
    ExternalProcess { program: String, code: Option<i32> },

    /// Transición no permitida por la máquina de estados
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Cualquier otra falla inesperada dentro de la ejecución
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn external_process_message(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("Process exited with code {}", code),
        None => "Process terminated by signal".to_string(),
    }
}

/// Alias de resultado para el crate
pub type Result<T> = std::result::Result<T, JobError>;

impl JobError {
    /// Traduce un error de `spawn` a la categoría correcta
    ///
    /// Un binario inexistente es una dependencia faltante, no un fallo interno.
    pub fn from_spawn(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            JobError::DependencyMissing(format!("'{}' could not be executed: {}", program, err))
        } else {
            JobError::Io(err)
        }
    }

    /// Errores que el cliente provocó (no son fallos del servidor)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JobError::NotFound(_) | JobError::Validation(_) | JobError::InvalidTransition { .. }
        )
    }
}
