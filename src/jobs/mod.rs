//! # Sistema de Jobs
//! src/jobs/mod.rs
//!
//! Jobs largos de audio que corren en threads propios sin bloquear las
//! conexiones HTTP. El cliente recibe un `job_id` y hace polling.
//!
//! ## Endpoints
//!
//! - `/jobs/submit?kind=separation|generation` - Crear job
//! - `/jobs/status?id=JOBID` - Consultar estado, progreso y logs
//! - `/jobs/cancel?id=JOBID` - Cancelar job
//! - `/jobs` - Listar jobs
//!
//! ## Ciclo de vida
//!
//! ```text
//! queued → processing → completed | failed
//!    └──────────┴──────→ cancelled
//! ```

pub mod generation;
pub mod handlers;
pub mod manager;
pub mod output;
pub mod progress;
pub mod record;
pub mod registry;
pub mod runner;
pub mod separation;
pub mod service;
pub mod slots;
pub mod ticker;

pub use generation::{GenerationOptions, GenerationRequest, GenerationService};
pub use manager::{Backends, JobManager, JobManagerConfig};
pub use record::{JobKind, JobRecord, JobStatus};
pub use registry::JobRegistry;
pub use runner::{JobContext, TaskRunner};
pub use separation::{SeparationRequest, SeparationService};
pub use service::JobService;
