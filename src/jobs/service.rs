//! # Contrato Público de un Servicio de Jobs
//! src/jobs/service.rs
//!
//! `submit` valida y retorna el id sin esperar al trabajo; `status` y
//! `cancel` son comunes a todos los tipos y vienen implementados por defecto.

use crate::error::JobError;
use crate::jobs::output::OutputArea;
use crate::jobs::record::{JobKind, JobRecord};
use crate::jobs::registry::JobRegistry;
use std::sync::Arc;

pub trait JobService {
    /// Request de entrada propio del tipo de job
    type Input;

    fn kind(&self) -> JobKind;

    fn registry(&self) -> &Arc<JobRegistry>;

    /// Área donde el servicio escribe los artefactos de cada job
    fn output(&self) -> &OutputArea;

    /// Valida el input, crea el job y lo lanza en segundo plano
    fn submit(&self, input: Self::Input) -> Result<String, JobError>;

    /// Snapshot del job con `output_files` recalculado desde disco
    ///
    /// El listado es best-effort: puede incluir archivos a medio escribir.
    fn status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let mut job = self.registry().get(job_id)?;
        if job.kind != self.kind() {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        job.output_files = self.output().list_artifacts(job_id);
        Ok(job)
    }

    /// Pide cancelación cooperativa
    ///
    /// Solo mueve el estado hacia `cancelled`; el trabajo en vuelo termina
    /// por su cuenta y su resultado se descarta.
    fn cancel(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.status(job_id)?;

        let snapshot = self.registry().update(job_id, |job| {
            job.mark_cancelled()?;
            job.push_log("Cancellation requested");
            Ok::<_, JobError>(job.clone())
        })??;

        tracing::info!(job = %job_id, kind = self.kind().as_str(), "cancellation requested");
        Ok(snapshot)
    }
}
