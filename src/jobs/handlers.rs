//! # Handlers HTTP para Jobs
//! src/jobs/handlers.rs
//!
//! Implementa los endpoints del sistema de jobs:
//! - `POST /jobs/submit?kind=separation|generation`
//! - `GET  /jobs/status?id=JOBID`
//! - `POST /jobs/cancel?id=JOBID`
//! - `GET  /jobs`

use crate::error::JobError;
use crate::http::{Request, Response, StatusCode};
use crate::jobs::manager::JobManager;
use crate::jobs::record::JobKind;
use serde_json::json;

/// Traduce un `JobError` a su respuesta HTTP
pub fn error_response(error: &JobError) -> Response {
    let status = match error {
        JobError::NotFound(_) => StatusCode::NotFound,
        JobError::Validation(_) => StatusCode::BadRequest,
        JobError::InvalidTransition { .. } => StatusCode::Conflict,
        JobError::DependencyMissing(_)
        | JobError::ExternalProcess { .. }
        | JobError::Internal(_)
        | JobError::Io(_) => StatusCode::InternalServerError,
    };

    if error.is_client_error() {
        tracing::debug!(error = %error, "job request rejected");
    } else {
        tracing::error!(error = %error, "job request failed");
    }

    Response::error(status, &error.to_string())
}

fn required_param<'a>(req: &'a Request, name: &str) -> Result<&'a str, Response> {
    req.query_param(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            Response::error(
                StatusCode::BadRequest,
                &format!("Missing required parameter: {}", name),
            )
        })
}

/// Handler para `POST /jobs/submit?kind=KIND`
///
/// El body es el JSON del request del tipo:
///
/// - separation: `{"input_path": "...", "filename": "..."}`
/// - generation: `{"genre": "...", "lyrics": "...", "options": {...}}`
///
/// # Ejemplo de response
/// ```json
/// {"job_id": "5f0c...", "status": "queued"}
/// ```
pub fn submit_handler(req: &Request, job_manager: &JobManager) -> Response {
    let kind = match required_param(req, "kind") {
        Ok(k) => k,
        Err(response) => return response,
    };

    let kind = match JobKind::from_name(kind) {
        Some(kind) => kind,
        None => {
            return Response::error(
                StatusCode::BadRequest,
                &format!("Unknown job kind: {}", kind),
            );
        }
    };

    match job_manager.submit_json(kind, req.body()) {
        Ok(job_id) => Response::json(&json!({ "job_id": job_id, "status": "queued" })),
        Err(error) => error_response(&error),
    }
}

/// Handler para `GET /jobs/status?id=JOBID`
///
/// Retorna el snapshot completo del job.
///
/// # Ejemplo de response
/// ```json
/// {
///   "id": "5f0c...",
///   "kind": "generation",
///   "status": "processing",
///   "progress": 42,
///   "logs": ["Starting stage 1", "21/50 ["],
///   "error": null,
///   "result": null,
///   "output_files": []
/// }
/// ```
pub fn status_handler(req: &Request, job_manager: &JobManager) -> Response {
    let job_id = match required_param(req, "id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match job_manager.status(job_id) {
        Ok(record) => Response::json(&record),
        Err(error) => error_response(&error),
    }
}

/// Handler para `POST /jobs/cancel?id=JOBID`
///
/// Solo mueve el estado a `cancelled`; el trabajo en vuelo no se mata.
pub fn cancel_handler(req: &Request, job_manager: &JobManager) -> Response {
    let job_id = match required_param(req, "id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match job_manager.cancel(job_id) {
        Ok(record) => Response::json(&json!({
            "job_id": record.id,
            "status": record.status,
            "message": "Cancellation requested",
        })),
        Err(error) => error_response(&error),
    }
}

/// Handler para `GET /jobs`
pub fn list_handler(_req: &Request, job_manager: &JobManager) -> Response {
    let jobs = job_manager.list();
    Response::json(&json!({ "count": jobs.len(), "jobs": jobs }))
}
