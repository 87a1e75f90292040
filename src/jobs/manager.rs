//! # Gestor Central de Jobs
//! src/jobs/manager.rs
//!
//! Fachada sobre los dos servicios. Comparten un único `JobRegistry` y un
//! único `TaskRunner`; `status` y `cancel` despachan según el `kind` del job.

use crate::error::JobError;
use crate::jobs::generation::{
    GenerationRequest, GenerationService, InferenceScript, LocalModelStore, ModelStore,
    MusicGenerator,
};
use crate::jobs::output::OutputArea;
use crate::jobs::record::{JobKind, JobRecord};
use crate::jobs::registry::JobRegistry;
use crate::jobs::runner::TaskRunner;
use crate::jobs::separation::{CommandSeparator, SeparationRequest, SeparationService, Separator};
use crate::jobs::service::JobService;
use crate::jobs::slots::JobSlots;
use crate::jobs::ticker::TickerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuración del Job Manager
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Raíz de los stems separados (`<root>/<job_id>/`)
    pub separated_dir: PathBuf,

    /// Raíz de las canciones generadas
    pub generated_dir: PathBuf,

    /// Donde viven los archivos subidos por los clientes
    pub uploads_dir: PathBuf,

    /// Jobs simultáneos (0 = sin límite)
    pub max_concurrent_jobs: usize,

    /// Ticker de la separación
    pub ticker: TickerConfig,

    /// Binario del separador
    pub separator_program: String,

    /// Modelo del separador
    pub separator_model: String,

    /// Intérprete para la inferencia
    pub python: PathBuf,

    /// Script de inferencia
    pub inference_script: PathBuf,

    /// Directorio de trabajo del script (opcional)
    pub inference_workdir: Option<PathBuf>,

    /// Cache local de modelos
    pub models_dir: PathBuf,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            separated_dir: PathBuf::from("./outputs/separated"),
            generated_dir: PathBuf::from("./outputs/generated"),
            uploads_dir: PathBuf::from("./uploads"),
            max_concurrent_jobs: 0,
            ticker: TickerConfig::default(),
            separator_program: "audio-separator".to_string(),
            separator_model: crate::jobs::separation::DEFAULT_SEPARATION_MODEL.to_string(),
            python: PathBuf::from("python3"),
            inference_script: PathBuf::from("infer.py"),
            inference_workdir: None,
            models_dir: PathBuf::from("./models"),
        }
    }
}

impl JobManagerConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &crate::config::Config) -> Self {
        let output_root = PathBuf::from(&config.output_dir);
        Self {
            separated_dir: output_root.join("separated"),
            generated_dir: output_root.join("generated"),
            uploads_dir: PathBuf::from(&config.uploads_dir),
            max_concurrent_jobs: config.max_concurrent_jobs,
            ticker: TickerConfig {
                interval: Duration::from_millis(config.ticker_interval_ms),
                step: config.ticker_step,
                cap: config.ticker_cap,
            },
            separator_program: config.separator_program.clone(),
            separator_model: config.separator_model.clone(),
            python: PathBuf::from(&config.python),
            inference_script: PathBuf::from(&config.inference_script),
            inference_workdir: config.inference_workdir.as_ref().map(PathBuf::from),
            models_dir: PathBuf::from(&config.models_dir),
        }
    }
}

/// Colaboradores externos de los servicios
///
/// Los tests reemplazan estos por stubs.
pub struct Backends {
    pub separator: Arc<dyn Separator>,
    pub models: Arc<dyn ModelStore>,
    pub generator: Arc<dyn MusicGenerator>,
}

impl Backends {
    /// Backends reales según la configuración
    pub fn from_config(config: &JobManagerConfig) -> Self {
        Self {
            separator: Arc::new(CommandSeparator::new(
                config.separator_program.clone(),
                config.separator_model.clone(),
            )),
            models: Arc::new(LocalModelStore::new(config.models_dir.clone())),
            generator: Arc::new(InferenceScript {
                python: config.python.clone(),
                script: config.inference_script.clone(),
                workdir: config.inference_workdir.clone(),
            }),
        }
    }
}

/// Gestor central de jobs
pub struct JobManager {
    registry: Arc<JobRegistry>,
    separation: SeparationService,
    generation: GenerationService,
}

impl JobManager {
    /// Crea un manager con los backends reales
    pub fn new(config: JobManagerConfig) -> Self {
        let backends = Backends::from_config(&config);
        Self::with_backends(config, backends)
    }

    /// Crea un manager con backends explícitos
    pub fn with_backends(config: JobManagerConfig, backends: Backends) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let slots = JobSlots::new(config.max_concurrent_jobs);
        let runner = TaskRunner::new(Arc::clone(&registry), slots);

        let separation = SeparationService::new(
            runner.clone(),
            OutputArea::new(&config.separated_dir, "/outputs/separated"),
            config.uploads_dir.clone(),
            backends.separator,
            config.ticker,
        );
        let generation = GenerationService::new(
            runner,
            OutputArea::new(&config.generated_dir, "/outputs/generated"),
            backends.models,
            backends.generator,
        );

        tracing::info!(
            separated = %config.separated_dir.display(),
            generated = %config.generated_dir.display(),
            max_concurrent_jobs = config.max_concurrent_jobs,
            "job manager ready"
        );

        Self {
            registry,
            separation,
            generation,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn separation(&self) -> &SeparationService {
        &self.separation
    }

    pub fn generation(&self) -> &GenerationService {
        &self.generation
    }

    pub fn submit_separation(&self, request: SeparationRequest) -> Result<String, JobError> {
        self.separation.submit(request)
    }

    pub fn submit_generation(&self, request: GenerationRequest) -> Result<String, JobError> {
        self.generation.submit(request)
    }

    /// Envía un job a partir de un body JSON
    ///
    /// Un body que no matchea el request del tipo es un error de validación.
    pub fn submit_json(&self, kind: JobKind, body: &[u8]) -> Result<String, JobError> {
        let invalid = |e: serde_json::Error| JobError::Validation(e.to_string());
        match kind {
            JobKind::Separation => {
                self.submit_separation(serde_json::from_slice(body).map_err(invalid)?)
            }
            JobKind::Generation => {
                self.submit_generation(serde_json::from_slice(body).map_err(invalid)?)
            }
        }
    }

    /// Snapshot de cualquier job
    pub fn status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        match self.registry.get(job_id)?.kind {
            JobKind::Separation => self.separation.status(job_id),
            JobKind::Generation => self.generation.status(job_id),
        }
    }

    /// Cancelación cooperativa de cualquier job
    pub fn cancel(&self, job_id: &str) -> Result<JobRecord, JobError> {
        match self.registry.get(job_id)?.kind {
            JobKind::Separation => self.separation.cancel(job_id),
            JobKind::Generation => self.generation.cancel(job_id),
        }
    }

    /// Todos los jobs en orden de creación, con `output_files` al día
    pub fn list(&self) -> Vec<JobRecord> {
        self.registry
            .list()
            .into_iter()
            .map(|mut job| {
                job.output_files = match job.kind {
                    JobKind::Separation => self.separation.output().list_artifacts(&job.id),
                    JobKind::Generation => self.generation.output().list_artifacts(&job.id),
                };
                job
            })
            .collect()
    }
}
