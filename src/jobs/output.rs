//! # Namespaces de Salida
//! src/jobs/output.rs
//!
//! Cada job escribe sus artefactos en `<root>/<job_id>/`, así dos jobs
//! concurrentes nunca comparten nombres. Aquí también vive el saneamiento
//! del título que se usa como prefijo de los archivos generados.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensiones que se consideran artefactos de audio
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// Área de salida de un tipo de job
#[derive(Debug, Clone)]
pub struct OutputArea {
    /// Directorio raíz en disco
    root: PathBuf,

    /// Prefijo público para construir URLs (ej: "/outputs/separated")
    url_prefix: String,
}

impl OutputArea {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directorio exclusivo del job
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Crea (si hace falta) el directorio del job
    pub fn create(&self, job_id: &str) -> io::Result<PathBuf> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// URL pública de un artefacto del job
    pub fn url_for(&self, job_id: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.url_prefix, job_id, file_name)
    }

    /// Lista los artefactos de audio del job, ordenados por nombre
    ///
    /// Best-effort: un directorio inexistente o entradas ilegibles dan una
    /// lista parcial, nunca un error.
    pub fn list_artifacts(&self, job_id: &str) -> Vec<String> {
        list_audio_files(&self.job_dir(job_id))
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Nombres de los archivos de audio de un directorio
pub fn list_audio_files(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_audio(path))
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect();

    names.sort();
    names
}

/// Sanea un título para usarlo como prefijo de archivo
///
/// Los espacios pasan a `_` y se conservan solo alfanuméricos, `-` y `_`.
/// Retorna `None` si no queda nada utilizable.
///
/// # Ejemplo
/// ```
/// use audio_jobs::jobs::output::sanitize_title;
///
/// assert_eq!(sanitize_title("My Song!").as_deref(), Some("My_Song"));
/// assert_eq!(sanitize_title("???"), None);
/// ```
pub fn sanitize_title(title: &str) -> Option<String> {
    let cleaned: String = title
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Antepone `<title>_` a los artefactos de audio que aún no lo tengan
///
/// Un rename fallido se registra y se omite. Retorna el listado final.
pub fn prefix_artifacts(dir: &Path, title: &str) -> Vec<String> {
    for name in list_audio_files(dir) {
        if name.starts_with(title) {
            continue;
        }
        let renamed = format!("{}_{}", title, name);
        match fs::rename(dir.join(&name), dir.join(&renamed)) {
            Ok(()) => tracing::info!(from = %name, to = %renamed, "renamed artifact"),
            Err(e) => tracing::warn!(file = %name, error = %e, "failed to rename artifact"),
        }
    }
    list_audio_files(dir)
}
