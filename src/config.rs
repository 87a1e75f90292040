//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del orquestador de jobs con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./audio_jobs --port 8080 \
//!   --output-dir ./outputs \
//!   --models-dir ~/.cache/models \
//!   --max-concurrent-jobs 2
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 HTTP_HOST=0.0.0.0 INFERENCE_SCRIPT=/opt/yue/infer.py ./audio_jobs
//! ```

use clap::Parser;

/// Configuración del servidor de jobs de audio
#[derive(Debug, Clone, Parser)]
#[command(name = "audio_jobs")]
#[command(about = "Orquestador HTTP de jobs de separación y generación de audio")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Tamaño máximo del body de un request (bytes)
    #[arg(long = "max-body", default_value = "1048576", env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // === Directorios ===

    /// Raíz de salida; cada tipo de job usa un subdirectorio
    #[arg(long = "output-dir", default_value = "./outputs", env = "OUTPUT_DIR")]
    pub output_dir: String,

    /// Directorio de archivos subidos
    #[arg(long = "uploads-dir", default_value = "./uploads", env = "UPLOAD_DIR")]
    pub uploads_dir: String,

    /// Cache local de modelos de generación
    #[arg(long = "models-dir", default_value = "./models", env = "MODELS_DIR")]
    pub models_dir: String,

    // === Ejecución ===

    /// Jobs simultáneos (0 = un thread por job, sin límite)
    #[arg(long = "max-concurrent-jobs", default_value = "0", env = "MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: usize,

    /// Intervalo del ticker de progreso simulado (ms)
    #[arg(long = "ticker-interval-ms", default_value = "1000", env = "TICKER_INTERVAL_MS")]
    pub ticker_interval_ms: u64,

    /// Puntos por tick
    #[arg(long = "ticker-step", default_value = "1", env = "TICKER_STEP")]
    pub ticker_step: u8,

    /// Tope del progreso simulado
    #[arg(long = "ticker-cap", default_value = "95", env = "TICKER_CAP")]
    pub ticker_cap: u8,

    // === Separación ===

    /// Ejecutable del separador
    #[arg(long = "separator", default_value = "audio-separator", env = "SEPARATOR_BIN")]
    pub separator_program: String,

    /// Modelo del separador
    #[arg(
        long = "separator-model",
        default_value = "MDX23C-8KFFT-InstVoc_HQ.ckpt",
        env = "SEPARATOR_MODEL"
    )]
    pub separator_model: String,

    // === Generación ===

    /// Intérprete de Python para la inferencia
    #[arg(long, default_value = "python3", env = "VENV_PYTHON")]
    pub python: String,

    /// Script de inferencia
    #[arg(long = "inference-script", default_value = "infer.py", env = "INFERENCE_SCRIPT")]
    pub inference_script: String,

    /// Directorio de trabajo del script (opcional)
    #[arg(long = "inference-workdir", env = "INFERENCE_WORKDIR")]
    pub inference_workdir: Option<String>,

    // === Logging ===

    /// Nivel de log si RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use audio_jobs::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.max_body_bytes == 0 {
            return Err("Max body size must be > 0".to_string());
        }

        if self.ticker_interval_ms == 0 {
            return Err("Ticker interval must be > 0".to_string());
        }
        if self.ticker_step == 0 {
            return Err("Ticker step must be >= 1".to_string());
        }
        if self.ticker_cap == 0 || self.ticker_cap > 99 {
            return Err("Ticker cap must be 1-99".to_string());
        }

        if self.output_dir.trim().is_empty() {
            return Err("Output dir cannot be empty".to_string());
        }
        if self.separator_program.trim().is_empty() {
            return Err("Separator program cannot be empty".to_string());
        }
        if self.python.trim().is_empty() || self.inference_script.trim().is_empty() {
            return Err("Inference python and script cannot be empty".to_string());
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║               Audio Jobs Server Configuration                ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Max body:     {} bytes", self.max_body_bytes);
        println!();
        println!("📁 Directories:");
        println!("   Outputs:      {}", self.output_dir);
        println!("   Uploads:      {}", self.uploads_dir);
        println!("   Models:       {}", self.models_dir);
        println!();
        println!("👷 Jobs:");
        if self.max_concurrent_jobs > 0 {
            println!("   Concurrency:  {} jobs", self.max_concurrent_jobs);
        } else {
            println!("   Concurrency:  unbounded (one thread per job)");
        }
        println!(
            "   Ticker:       +{} every {} ms (cap {})",
            self.ticker_step, self.ticker_interval_ms, self.ticker_cap
        );
        println!("   Separator:    {} ({})", self.separator_program, self.separator_model);
        println!("   Inference:    {} {}", self.python, self.inference_script);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            max_body_bytes: 1024 * 1024,
            output_dir: "./outputs".to_string(),
            uploads_dir: "./uploads".to_string(),
            models_dir: "./models".to_string(),
            max_concurrent_jobs: 0,
            ticker_interval_ms: 1000,
            ticker_step: 1,
            ticker_cap: 95,
            separator_program: "audio-separator".to_string(),
            separator_model: "MDX23C-8KFFT-InstVoc_HQ.ckpt".to_string(),
            python: "python3".to_string(),
            inference_script: "infer.py".to_string(),
            inference_workdir: None,
            log_level: "info".to_string(),
        }
    }
}
