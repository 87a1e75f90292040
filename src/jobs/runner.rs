//! # Ejecutor de Jobs
//! src/jobs/runner.rs
//!
//! `TaskRunner` lanza cada unidad de trabajo en su propio thread, la lleva
//! hasta un estado terminal y escribe todo a través del `JobRegistry`.
//!
//! ## Contrato
//!
//! 1. `queued -> processing` cuando el thread realmente arranca.
//! 2. La unidad de trabajo recibe un `JobContext` para loguear, marcar hitos,
//!    correr procesos externos y arrancar el ticker.
//! 3. Cualquier error, o un panic, termina en `failed` con mensaje.
//! 4. Si el job fue cancelado mientras corría, el resultado se descarta y el
//!    estado final sigue siendo `cancelled`.

use crate::error::JobError;
use crate::jobs::progress::ProgressEstimator;
use crate::jobs::record::JobStatus;
use crate::jobs::registry::JobRegistry;
use crate::jobs::slots::JobSlots;
use crate::jobs::ticker::{short_id, ProgressTicker, TickerConfig};
use std::io::{self, BufRead, BufReader, Read};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Resultado de una unidad de trabajo: el payload de `result`
pub type WorkResult = Result<serde_json::Value, JobError>;

/// Handle que recibe la unidad de trabajo
pub struct JobContext {
    id: String,
    registry: Arc<JobRegistry>,
}

impl JobContext {
    pub fn new(id: impl Into<String>, registry: Arc<JobRegistry>) -> Self {
        Self {
            id: id.into(),
            registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Agrega una línea al log del job
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(job = %self.id, "{}", line);
        let _ = self.registry.update(&self.id, |job| job.push_log(line));
    }

    /// Hito con nombre: sube el progreso y deja una línea en el log
    pub fn milestone(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(job = %self.id, progress, "{}", message);
        let _ = self.registry.update(&self.id, |job| {
            job.push_log(message);
            job.advance(progress);
        });
    }

    /// ¿Alguien pidió cancelar este job?
    ///
    /// Lee el estado bajo el lock, sin copiar el registro.
    pub fn is_cancelled(&self) -> bool {
        self.registry
            .update(&self.id, |job| job.status == JobStatus::Cancelled)
            .unwrap_or(false)
    }

    /// Arranca un ticker de progreso simulado
    ///
    /// Hay que detenerlo (`stop`) antes de retornar el resultado del trabajo.
    pub fn start_ticker(&self, config: TickerConfig) -> Result<ProgressTicker, JobError> {
        ProgressTicker::start(Arc::clone(&self.registry), self.id.clone(), config)
            .map_err(JobError::from)
    }

    /// Corre un proceso externo y consume su salida línea por línea
    ///
    /// stdout y stderr se mezclan en un solo flujo; dentro de cada stream
    /// el orden se conserva. Cada línea se agrega al log y pasa por el
    /// `estimator` en la misma actualización atómica.
    pub fn run_process(
        &self,
        mut command: Command,
        estimator: &dyn ProgressEstimator,
    ) -> Result<ExitStatus, JobError> {
        let program = command.get_program().to_string_lossy().into_owned();

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| JobError::from_spawn(&program, e))?;

        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone())?);
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone())?);
        }
        drop(tx);

        // Termina cuando ambos streams cierran
        for line in rx {
            tracing::info!(job = %self.id, "[{}] {}", short_id(&self.id), line);
            let _ = self.registry.update(&self.id, |job| {
                let next = estimator.estimate(job.progress, &line);
                job.push_log(line);
                job.advance(next);
            });
        }

        for reader in readers {
            let _ = reader.join();
        }

        child.wait().map_err(JobError::from)
    }
}

fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>) -> io::Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("job-output".to_string())
        .spawn(move || {
            let result = for_each_line(BufReader::new(stream), |line| {
                tx.send(line.to_string()).is_ok()
            });
            if let Err(e) = result {
                tracing::warn!(error = %e, "error reading process output");
            }
        })
}

/// Recorre las líneas de un stream separando por `\n` y por `\r`
///
/// Las barras de progreso se redibujan con `\r`, sin salto de línea. Cada
/// línea se decodifica con reemplazo de bytes inválidos, se recorta y las
/// vacías se descartan. Si `f` retorna false se deja de leer.
pub fn for_each_line<R, F>(mut reader: R, mut f: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let mut pending: Vec<u8> = Vec::new();

    let emit = |bytes: &[u8], f: &mut F| -> bool {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            true
        } else {
            f(trimmed)
        }
    };

    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if buf.is_empty() {
            break;
        }

        let len = buf.len();
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' || *byte == b'\r' {
                pending.extend_from_slice(&buf[start..i]);
                start = i + 1;
                if !emit(&pending, &mut f) {
                    return Ok(());
                }
                pending.clear();
            }
        }
        pending.extend_from_slice(&buf[start..]);
        reader.consume(len);
    }

    if !pending.is_empty() {
        emit(&pending, &mut f);
    }
    Ok(())
}

/// Lanza unidades de trabajo en threads dedicados
#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<JobRegistry>,
    slots: Arc<JobSlots>,
}

impl TaskRunner {
    pub fn new(registry: Arc<JobRegistry>, slots: Arc<JobSlots>) -> Self {
        Self { registry, slots }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Lanza `work` para el job `job_id` y retorna de inmediato
    ///
    /// Si no se puede crear el thread, el job queda `failed` y se retorna
    /// el error al llamador.
    pub fn launch<F>(&self, job_id: &str, work: F) -> Result<(), JobError>
    where
        F: FnOnce(&JobContext) -> WorkResult + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let slots = Arc::clone(&self.slots);
        let id = job_id.to_string();

        let spawned = thread::Builder::new()
            .name(format!("job-{}", short_id(job_id)))
            .spawn(move || {
                let _slot = slots.acquire();
                let ctx = JobContext::new(id, registry);
                Self::drive(&ctx, work);
            });

        if let Err(e) = spawned {
            let message = format!("failed to start job thread: {}", e);
            tracing::error!(job = %job_id, "{}", message);
            let _ = self.registry.update(job_id, |job| {
                job.push_log(format!("FAILED: {}", message));
                job.mark_failed(message.clone())
            });
            return Err(JobError::Internal(message));
        }

        Ok(())
    }

    /// Lleva un job de `queued` a un estado terminal
    fn drive<F>(ctx: &JobContext, work: F)
    where
        F: FnOnce(&JobContext) -> WorkResult,
    {
        let started = ctx.registry.update(&ctx.id, |job| job.mark_processing());
        match started {
            Ok(Ok(())) => tracing::info!(job = %ctx.id, "job started"),
            Ok(Err(e)) => {
                // Cancelado mientras esperaba slot
                tracing::info!(job = %ctx.id, reason = %e, "job not started");
                return;
            }
            Err(e) => {
                tracing::error!(job = %ctx.id, error = %e, "job vanished before start");
                return;
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(ctx)))
            .unwrap_or_else(|payload| Err(JobError::Internal(panic_message(&*payload))));

        Self::finish(ctx, outcome);
    }

    /// Escribe el estado terminal en una sola actualización atómica
    fn finish(ctx: &JobContext, outcome: WorkResult) {
        let id = ctx.id.clone();
        let _ = ctx.registry.update(&id, |job| {
            if job.status == JobStatus::Cancelled {
                job.push_log("Job cancelled; discarding outcome.");
                tracing::info!(job = %id, "job cancelled by user");
                return;
            }

            match outcome {
                Ok(result) => {
                    if job.mark_completed(result).is_ok() {
                        tracing::info!(job = %id, "job completed");
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(job = %id, error = %message, "job failed");
                    job.push_log(format!("FAILED: {}", message));
                    let _ = job.mark_failed(message);
                }
            }
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("unexpected panic: {}", detail)
}
