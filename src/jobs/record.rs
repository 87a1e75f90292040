//! # Registro de un Job
//! src/jobs/record.rs
//!
//! Define `JobRecord`, la entidad que representa un trabajo asíncrono, y su
//! máquina de estados:
//!
//! ```text
//! queued -> processing -> { completed | failed | cancelled }
//! queued -> { failed | cancelled }
//! ```
//!
//! Una vez terminal, el registro no vuelve a cambiar de estado ni de progreso.
//! Los logs son append-only.

use crate::error::JobError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Progreso máximo que puede escribirse antes del cierre exitoso
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Estado de un job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Creado, esperando que arranque su thread
    Queued,

    /// La unidad de trabajo está corriendo
    Processing,

    /// Terminó bien, `result` está presente
    Completed,

    /// Terminó con error, `error` está presente
    Failed,

    /// Cancelado por el cliente
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tipo de trabajo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Separation,
    Generation,
}

impl JobKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "separation" => Some(JobKind::Separation),
            "generation" => Some(JobKind::Generation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Separation => "separation",
            JobKind::Generation => "generation",
        }
    }
}

/// Snapshot serializable de un job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// ID único, inmutable
    pub id: String,

    pub kind: JobKind,

    pub status: JobStatus,

    /// Progreso (0-100)
    pub progress: u8,

    /// Líneas de diagnóstico en orden de llegada
    pub logs: Vec<String>,

    /// Mensaje de error (solo si `failed`)
    pub error: Option<String>,

    /// Artefactos producidos (solo si `completed`)
    pub result: Option<serde_json::Value>,

    /// Listado del namespace de salida, refrescado en cada consulta
    pub output_files: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Contexto del cliente (nombre original, opciones pedidas)
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl JobRecord {
    /// Crea un registro nuevo en estado `queued`
    pub fn new(
        id: String,
        kind: JobKind,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            progress: 0,
            logs: Vec::new(),
            error: None,
            result: None,
            output_files: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            metadata,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition_error(&self, to: JobStatus) -> JobError {
        JobError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// Marca el job como iniciado (`queued -> processing`)
    pub fn mark_processing(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Queued {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Agrega una línea al log
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Sube el progreso sin bajarlo nunca
    ///
    /// Solo tiene efecto mientras el job está `processing`; el tope es
    /// `MAX_RUNNING_PROGRESS` porque el 100 lo escribe `mark_completed`.
    /// Retorna true si el valor cambió.
    pub fn advance(&mut self, progress: u8) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let capped = progress.min(MAX_RUNNING_PROGRESS);
        if capped > self.progress {
            self.progress = capped;
            true
        } else {
            false
        }
    }

    /// Marca el job como completado con resultado
    pub fn mark_completed(&mut self, result: serde_json::Value) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Marca el job como fallido; el progreso queda congelado
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        if self.is_terminal() {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Marca el job como cancelado; el progreso queda congelado
    pub fn mark_cancelled(&mut self) -> Result<(), JobError> {
        if self.is_terminal() {
            return Err(self.transition_error(JobStatus::Cancelled));
        }
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new("job-1".to_string(), JobKind::Generation, BTreeMap::new())
    }

    #[test]
    fn test_job_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_job_kind_from_name() {
        assert_eq!(JobKind::from_name("Separation"), Some(JobKind::Separation));
        assert_eq!(JobKind::from_name("generation"), Some(JobKind::Generation));
        assert_eq!(JobKind::from_name("trim"), None);
    }

    #[test]
    fn test_new_record_is_queued() {
        let job = record();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.logs.is_empty());
        assert!(job.result.is_none() && job.error.is_none());
    }

    #[test]
    fn test_record_lifecycle() {
        let mut job = record();
        job.mark_processing().unwrap();
        assert!(job.started_at.is_some());

        assert!(job.advance(40));
        assert!(!job.advance(30));
        assert_eq!(job.progress, 40);

        job.mark_completed(serde_json::json!({"ok": true})).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_advance_never_reaches_100() {
        let mut job = record();
        job.mark_processing().unwrap();
        job.advance(250);
        assert_eq!(job.progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_advance_ignored_when_not_processing() {
        let mut job = record();
        assert!(!job.advance(10));
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_failed_keeps_progress() {
        let mut job = record();
        job.mark_processing().unwrap();
        job.advance(37);
        job.mark_failed("boom").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 37);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = record();
        job.mark_processing().unwrap();
        job.mark_cancelled().unwrap();

        assert!(job.mark_completed(serde_json::json!({})).is_err());
        assert!(job.mark_failed("late").is_err());
        assert!(job.mark_cancelled().is_err());
        assert!(!job.advance(80));
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
    }

    #[test]
    fn test_cancel_from_queued() {
        let mut job = record();
        job.mark_cancelled().unwrap();
        assert!(matches!(
            job.mark_processing(),
            Err(JobError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = record();
        assert!(job.mark_completed(serde_json::json!({})).is_err());
    }
}
