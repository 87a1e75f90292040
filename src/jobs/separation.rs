//! # Separación Vocal / Instrumental
//! src/jobs/separation.rs
//!
//! Separa un archivo de audio en dos stems: voces e instrumental. El
//! separador en sí es una caja negra (`Separator`) que no reporta progreso,
//! así que mientras corre se usa el ticker simulado.
//!
//! ## Etapas
//!
//! | Progreso | Etapa                                   |
//! |----------|-----------------------------------------|
//! | 5        | Inicio                                  |
//! | 10       | Namespace de salida listo               |
//! | 20       | Carga del modelo                        |
//! | 20..95   | Ticker mientras corre el separador      |
//! | 100      | Stems identificados y renombrados       |

use crate::error::JobError;
use crate::jobs::output::{list_audio_files, OutputArea};
use crate::jobs::progress::NoProgress;
use crate::jobs::record::JobKind;
use crate::jobs::registry::JobRegistry;
use crate::jobs::runner::{JobContext, TaskRunner, WorkResult};
use crate::jobs::service::JobService;
use crate::jobs::ticker::TickerConfig;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Modelo por defecto del separador
pub const DEFAULT_SEPARATION_MODEL: &str = "MDX23C-8KFFT-InstVoc_HQ.ckpt";

/// Nombres finales de los stems
pub const VOCALS_FILE: &str = "vocals.wav";
pub const INSTRUMENTAL_FILE: &str = "instrumental.wav";

/// Body de `POST /jobs/submit?kind=separation`
#[derive(Debug, Clone, Deserialize)]
pub struct SeparationRequest {
    /// Archivo de entrada ya subido al servidor
    pub input_path: PathBuf,

    /// Nombre original que dio el cliente
    #[serde(default)]
    pub filename: Option<String>,
}

/// Caja negra que produce los stems
///
/// Debe escribir sus archivos dentro de `out_dir` y retornar sus rutas.
/// Puede bloquear todo lo que haga falta.
pub trait Separator: Send + Sync {
    /// Nombre del modelo, solo para los logs
    fn model(&self) -> &str;

    fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
        ctx: &JobContext,
    ) -> Result<Vec<PathBuf>, JobError>;
}

/// Separador que invoca el CLI `audio-separator`
#[derive(Debug, Clone)]
pub struct CommandSeparator {
    program: String,
    model: String,
}

impl CommandSeparator {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }

    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(input)
            .arg("--model_filename")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(out_dir)
            .arg("--output_format")
            .arg("WAV");
        cmd
    }
}

impl Default for CommandSeparator {
    fn default() -> Self {
        Self::new("audio-separator", DEFAULT_SEPARATION_MODEL)
    }
}

impl Separator for CommandSeparator {
    fn model(&self) -> &str {
        &self.model
    }

    fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
        ctx: &JobContext,
    ) -> Result<Vec<PathBuf>, JobError> {
        let status = ctx.run_process(self.command(input, out_dir), &NoProgress)?;
        if !status.success() {
            return Err(JobError::ExternalProcess {
                program: self.program.clone(),
                code: status.code(),
            });
        }

        Ok(list_audio_files(out_dir)
            .into_iter()
            .map(|name| out_dir.join(name))
            .collect())
    }
}

/// Servicio de separación
pub struct SeparationService {
    runner: TaskRunner,
    output: OutputArea,
    uploads_root: PathBuf,
    separator: Arc<dyn Separator>,
    ticker: TickerConfig,
}

impl SeparationService {
    pub fn new(
        runner: TaskRunner,
        output: OutputArea,
        uploads_root: impl Into<PathBuf>,
        separator: Arc<dyn Separator>,
        ticker: TickerConfig,
    ) -> Self {
        Self {
            runner,
            output,
            uploads_root: uploads_root.into(),
            separator,
            ticker,
        }
    }

    /// Ruta pública del original: `/uploads/<nombre>` si vive en uploads
    fn public_original_path(&self, input: &Path) -> String {
        match (input.parent(), input.file_name()) {
            (Some(parent), Some(name)) if parent.starts_with(&self.uploads_root) => {
                format!("/uploads/{}", name.to_string_lossy())
            }
            _ => input.display().to_string(),
        }
    }
}

impl JobService for SeparationService {
    type Input = SeparationRequest;

    fn kind(&self) -> JobKind {
        JobKind::Separation
    }

    fn registry(&self) -> &Arc<JobRegistry> {
        self.runner.registry()
    }

    fn output(&self) -> &OutputArea {
        &self.output
    }

    fn submit(&self, request: SeparationRequest) -> Result<String, JobError> {
        if !request.input_path.is_file() {
            return Err(JobError::Validation(format!(
                "input file not found: {}",
                request.input_path.display()
            )));
        }

        let filename = request.filename.clone().unwrap_or_else(|| {
            request
                .input_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let original_path = self.public_original_path(&request.input_path);

        let mut metadata = BTreeMap::new();
        metadata.insert("filename".to_string(), json!(filename));
        metadata.insert("original_path".to_string(), json!(original_path));

        let job = self.registry().create(JobKind::Separation, metadata);
        tracing::info!(job = %job.id, input = %request.input_path.display(), "separation job queued");

        let work = SeparationWork {
            output: self.output.clone(),
            separator: Arc::clone(&self.separator),
            ticker: self.ticker,
            input: request.input_path,
            original_path,
        };
        self.runner.launch(&job.id, move |ctx| work.run(ctx))?;

        Ok(job.id)
    }
}

/// Todo lo que el thread del job necesita, movido fuera del servicio
struct SeparationWork {
    output: OutputArea,
    separator: Arc<dyn Separator>,
    ticker: TickerConfig,
    input: PathBuf,
    original_path: String,
}

impl SeparationWork {
    fn run(self, ctx: &JobContext) -> WorkResult {
        ctx.milestone(5, "Starting separation...");

        let out_dir = self.output.create(ctx.id())?;
        ctx.milestone(10, format!("Output directory ready: {}", out_dir.display()));

        ctx.milestone(20, format!("Loading model: {} ...", self.separator.model()));

        let ticker = ctx.start_ticker(self.ticker)?;
        let produced = self.separator.separate(&self.input, &out_dir, ctx);
        // Sin ticks posibles a partir de aquí
        ticker.stop();
        let produced = produced?;

        if ctx.is_cancelled() {
            ctx.log("Separation cancelled by user.");
            return Ok(serde_json::Value::Null);
        }

        let vocals = find_stem(&produced, "Vocals");
        let instrumental = find_stem(&produced, "Instrumental");

        let (vocals, instrumental) = match (vocals, instrumental) {
            (Some(v), Some(i)) if v != i => (v, i),
            _ => {
                let names: Vec<String> = produced
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect();
                return Err(JobError::Internal(format!(
                    "could not identify stems from: {:?}",
                    names
                )));
            }
        };

        let vocals_path = out_dir.join(VOCALS_FILE);
        let instrumental_path = out_dir.join(INSTRUMENTAL_FILE);
        fs::rename(vocals, &vocals_path)?;
        fs::rename(instrumental, &instrumental_path)?;

        ctx.log("Separation completed successfully.");

        Ok(json!({
            "vocals_url": self.output.url_for(ctx.id(), VOCALS_FILE),
            "instrumental_url": self.output.url_for(ctx.id(), INSTRUMENTAL_FILE),
            "vocals_path": vocals_path.display().to_string(),
            "instrumental_path": instrumental_path.display().to_string(),
            "original_path": self.original_path,
            "output_files": list_audio_files(&out_dir),
        }))
    }
}

/// Etiqueta del stem: el último `(...)` del nombre
///
/// El separador escribe `<entrada>_(Vocals)_<modelo>.wav`; la entrada puede
/// traer sus propios paréntesis, por eso se toma el último grupo.
fn stem_label(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_string_lossy();
    let close = name.rfind(')')?;
    let open = name[..close].rfind('(')?;
    Some(name[open + 1..close].to_string())
}

/// Primer archivo cuya etiqueta es `label`
fn find_stem<'a>(produced: &'a [PathBuf], label: &str) -> Option<&'a PathBuf> {
    produced.iter().find(|path| {
        stem_label(path)
            .map(|found| found.eq_ignore_ascii_case(label))
            .unwrap_or(false)
    })
}
