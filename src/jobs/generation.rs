//! # Generación de Música
//! src/jobs/generation.rs
//!
//! Genera una canción a partir de un prompt de género y una letra, usando
//! un script de inferencia en dos etapas. El script sí imprime su avance
//! (`Starting stage N`, barras `N/M [`), así que el progreso sale de
//! `GenerationProgress` en lugar del ticker.
//!
//! ## Flujo
//!
//! 1. `submit`: valida, crea el namespace, escribe `genre.txt` y `lyrics.txt`
//! 2. Resolución de modelos (hitos 2, 5 y 8)
//! 3. Proceso de inferencia, progreso desde su salida
//! 4. Renombrado de artefactos con el título

use crate::error::JobError;
use crate::jobs::output::{prefix_artifacts, sanitize_title, OutputArea};
use crate::jobs::progress::GenerationProgress;
use crate::jobs::record::JobKind;
use crate::jobs::registry::JobRegistry;
use crate::jobs::runner::{JobContext, TaskRunner, WorkResult};
use crate::jobs::service::JobService;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

/// Título por defecto de los artefactos
pub const DEFAULT_TITLE: &str = "My Song";

/// Modelo de etapa 2 por defecto
pub const DEFAULT_STAGE2_MODEL: &str = "Doctor-Shotgun/YuE-s2-1B-general-exl2";

/// Revisión fija del modelo de etapa 2
pub const STAGE2_REVISION: &str = "8.0bpw-h8";

const STAGE1_MODEL_EN: &str = "Doctor-Shotgun/YuE-s1-7B-anneal-en-cot-exl2";
const STAGE1_MODEL_JA: &str = "bartowski/YuE-s1-7B-anneal-jp-kr-cot-exl2";

// ==================== Opciones ====================

/// Estilo vocal, se antepone al prompt de género
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocalType {
    #[default]
    Female,
    Male,
    #[serde(rename = "none")]
    Instrumental,
}

impl VocalType {
    fn tag(&self) -> &'static str {
        match self {
            VocalType::Female => "female vocals",
            VocalType::Male => "male vocals",
            VocalType::Instrumental => "instrumental",
        }
    }

    /// Antepone la etiqueta al género si no está ya presente
    pub fn apply(&self, genre: &str) -> String {
        let tag = self.tag();
        if genre.to_lowercase().contains(tag) {
            genre.to_string()
        } else {
            format!("{}, {}", tag, genre)
        }
    }
}

/// Calidad de la cuantización del modelo de etapa 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Fast,
    Balanced,
    Best,
}

impl Quality {
    pub fn revision(&self) -> &'static str {
        match self {
            Quality::Fast => "4.25bpw-h6",
            Quality::Balanced => "6.0bpw-h6",
            Quality::Best => "8.0bpw-h8",
        }
    }
}

/// Idioma foco del modelo de etapa 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ja => "ja",
        }
    }

    fn stage1_repo(&self) -> &'static str {
        match self {
            Language::En => STAGE1_MODEL_EN,
            Language::Ja => STAGE1_MODEL_JA,
        }
    }
}

/// Opciones de generación; todas tienen default
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    pub vocal_type: VocalType,
    pub quality: Quality,
    pub language: Language,

    /// Segmentos de la canción (`--run_n_segments`)
    pub segments: u32,

    pub max_new_tokens: u32,

    /// Prefijo de los archivos producidos
    pub title: Option<String>,

    /// Repositorio alternativo para la etapa 2
    pub stage2_model: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            vocal_type: VocalType::default(),
            quality: Quality::default(),
            language: Language::default(),
            segments: 2,
            max_new_tokens: 3000,
            title: None,
            stage2_model: None,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.segments == 0 {
            return Err(JobError::Validation("segments must be at least 1".to_string()));
        }
        if self.max_new_tokens == 0 {
            return Err(JobError::Validation(
                "max_new_tokens must be greater than 0".to_string(),
            ));
        }
        if let Some(model) = &self.stage2_model {
            if model.trim().is_empty() {
                return Err(JobError::Validation("stage2_model cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Título saneado, con fallback al default
    pub fn file_title(&self) -> String {
        self.title
            .as_deref()
            .and_then(sanitize_title)
            .or_else(|| sanitize_title(DEFAULT_TITLE))
            .unwrap_or_else(|| "My_Song".to_string())
    }
}

/// Body de `POST /jobs/submit?kind=generation`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub genre: String,
    pub lyrics: String,

    #[serde(default)]
    pub options: GenerationOptions,
}

// ==================== Modelos ====================

/// Modelo identificado por repositorio y revisión
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub repo_id: String,
    pub revision: String,
}

impl ModelRef {
    pub fn new(repo_id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            revision: revision.into(),
        }
    }

    pub fn stage1(language: Language, quality: Quality) -> Self {
        Self::new(language.stage1_repo(), quality.revision())
    }

    pub fn stage2(repo_id: Option<&str>) -> Self {
        Self::new(repo_id.unwrap_or(DEFAULT_STAGE2_MODEL), STAGE2_REVISION)
    }
}

/// Fuente de pesos de modelos
pub trait ModelStore: Send + Sync {
    /// Ruta local del modelo, o `DependencyMissing` si no está disponible
    fn resolve(&self, model: &ModelRef) -> Result<PathBuf, JobError>;
}

/// Cache local: `<root>/<owner>--<name>/<revision>/`
#[derive(Debug, Clone)]
pub struct LocalModelStore {
    root: PathBuf,
}

impl LocalModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, model: &ModelRef) -> PathBuf {
        self.root
            .join(model.repo_id.replace('/', "--"))
            .join(&model.revision)
    }
}

impl ModelStore for LocalModelStore {
    fn resolve(&self, model: &ModelRef) -> Result<PathBuf, JobError> {
        let path = self.path_for(model);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(JobError::DependencyMissing(format!(
                "model {} ({}) not found in {}",
                model.repo_id,
                model.revision,
                self.root.display()
            )))
        }
    }
}

// ==================== Inferencia ====================

/// Entradas resueltas para una corrida de inferencia
#[derive(Debug, Clone)]
pub struct InferencePlan {
    pub stage1_model: PathBuf,
    pub stage2_model: PathBuf,
    pub genre_file: PathBuf,
    pub lyrics_file: PathBuf,
    pub output_dir: PathBuf,
    pub segments: u32,
    pub max_new_tokens: u32,
}

/// Caja negra que arma el proceso de generación
pub trait MusicGenerator: Send + Sync {
    fn command(&self, plan: &InferencePlan) -> Command;
}

/// Script de inferencia corrido con un intérprete de Python
#[derive(Debug, Clone)]
pub struct InferenceScript {
    pub python: PathBuf,
    pub script: PathBuf,
    pub workdir: Option<PathBuf>,
}

impl MusicGenerator for InferenceScript {
    fn command(&self, plan: &InferencePlan) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg("--stage1_use_exl2")
            .arg("--stage1_model")
            .arg(&plan.stage1_model)
            .args(["--stage1_cache_mode", "Q4"])
            .arg("--stage2_use_exl2")
            .arg("--stage2_model")
            .arg(&plan.stage2_model)
            .args(["--stage2_cache_mode", "Q4"])
            .args(["--stage2_cache_size", "16384"])
            .arg("--genre_txt")
            .arg(&plan.genre_file)
            .arg("--lyrics_txt")
            .arg(&plan.lyrics_file)
            .arg("--output_dir")
            .arg(&plan.output_dir)
            .arg("--run_n_segments")
            .arg(plan.segments.to_string())
            .arg("--max_new_tokens")
            .arg(plan.max_new_tokens.to_string())
            .args(["--repetition_penalty", "1.1"])
            .args(["--cuda_idx", "0"])
            .env("PYTHONUNBUFFERED", "1");

        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Línea de comando legible, para el log del job
fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

// ==================== Servicio ====================

/// Servicio de generación
pub struct GenerationService {
    runner: TaskRunner,
    output: OutputArea,
    models: Arc<dyn ModelStore>,
    generator: Arc<dyn MusicGenerator>,
}

impl GenerationService {
    pub fn new(
        runner: TaskRunner,
        output: OutputArea,
        models: Arc<dyn ModelStore>,
        generator: Arc<dyn MusicGenerator>,
    ) -> Self {
        Self {
            runner,
            output,
            models,
            generator,
        }
    }
}

impl JobService for GenerationService {
    type Input = GenerationRequest;

    fn kind(&self) -> JobKind {
        JobKind::Generation
    }

    fn registry(&self) -> &Arc<JobRegistry> {
        self.runner.registry()
    }

    fn output(&self) -> &OutputArea {
        &self.output
    }

    fn submit(&self, request: GenerationRequest) -> Result<String, JobError> {
        if request.genre.trim().is_empty() {
            return Err(JobError::Validation("genre cannot be empty".to_string()));
        }
        if request.lyrics.trim().is_empty() {
            return Err(JobError::Validation("lyrics cannot be empty".to_string()));
        }
        request.options.validate()?;

        let options = request.options;
        let genre = options.vocal_type.apply(&request.genre);

        let mut metadata = BTreeMap::new();
        metadata.insert("genre".to_string(), json!(genre));
        metadata.insert("language".to_string(), json!(options.language.as_str()));
        metadata.insert("title".to_string(), json!(options.file_title()));

        let job = self.registry().create(JobKind::Generation, metadata);

        let prepared = self.output.create(&job.id).and_then(|dir| {
            let genre_file = dir.join("genre.txt");
            let lyrics_file = dir.join("lyrics.txt");
            fs::write(&genre_file, &genre)?;
            fs::write(&lyrics_file, &request.lyrics)?;
            Ok((dir, genre_file, lyrics_file))
        });
        let (dir, genre_file, lyrics_file) = match prepared {
            Ok(paths) => paths,
            Err(e) => {
                // El job ya existe: dejarlo terminal antes de reportar
                let message = format!("failed to prepare job directory: {}", e);
                tracing::error!(job = %job.id, error = %message, "job failed");
                let _ = self.registry().update(&job.id, |j| {
                    j.push_log(format!("FAILED: {}", message));
                    j.mark_failed(message.clone())
                });
                return Err(JobError::Io(e));
            }
        };

        tracing::info!(job = %job.id, language = options.language.as_str(), "generation job queued");

        let work = GenerationWork {
            models: Arc::clone(&self.models),
            generator: Arc::clone(&self.generator),
            output: self.output.clone(),
            options,
            dir,
            genre_file,
            lyrics_file,
        };
        self.runner.launch(&job.id, move |ctx| work.run(ctx))?;

        Ok(job.id)
    }
}

struct GenerationWork {
    models: Arc<dyn ModelStore>,
    generator: Arc<dyn MusicGenerator>,
    output: OutputArea,
    options: GenerationOptions,
    dir: PathBuf,
    genre_file: PathBuf,
    lyrics_file: PathBuf,
}

impl GenerationWork {
    fn run(self, ctx: &JobContext) -> WorkResult {
        let stage1 = ModelRef::stage1(self.options.language, self.options.quality);
        ctx.log(format!(
            "Using {} focus model: {} ({})",
            self.options.language.as_str().to_uppercase(),
            stage1.repo_id,
            stage1.revision
        ));

        ctx.milestone(2, format!("Ensuring Stage 1 model {} is available...", stage1.repo_id));
        let stage1_path = self.models.resolve(&stage1)?;
        ctx.milestone(5, format!("Stage 1 model ready: {}", stage1_path.display()));

        let stage2 = ModelRef::stage2(self.options.stage2_model.as_deref());
        let stage2_path = self.models.resolve(&stage2)?;
        ctx.milestone(8, format!("Stage 2 model ready: {}", stage2_path.display()));

        let plan = InferencePlan {
            stage1_model: stage1_path,
            stage2_model: stage2_path,
            genre_file: self.genre_file.clone(),
            lyrics_file: self.lyrics_file.clone(),
            output_dir: self.dir.clone(),
            segments: self.options.segments,
            max_new_tokens: self.options.max_new_tokens,
        };

        let cmd = self.generator.command(&plan);
        let program = cmd.get_program().to_string_lossy().into_owned();
        ctx.log(format!("Command: {}", describe(&cmd)));

        let status = ctx.run_process(cmd, &GenerationProgress::default())?;
        if !status.success() {
            return Err(JobError::ExternalProcess {
                program,
                code: status.code(),
            });
        }

        if ctx.is_cancelled() {
            ctx.log("Generation cancelled by user.");
            return Ok(serde_json::Value::Null);
        }

        let title = self.options.file_title();
        let files = prefix_artifacts(&self.dir, &title);
        let urls: Vec<String> = files
            .iter()
            .map(|name| self.output.url_for(ctx.id(), name))
            .collect();

        ctx.log("Generation completed successfully.");

        Ok(json!({
            "title": title,
            "output_files": files,
            "output_urls": urls,
        }))
    }
}
