//! # Estimación de Progreso
//! src/jobs/progress.rs
//!
//! Los ejecutables externos no emiten un protocolo de progreso: solo texto
//! libre. Este módulo traduce cada línea a un porcentaje monótono.
//!
//! ## Reglas para la inferencia de generación
//!
//! | Línea                              | Progreso                      |
//! |------------------------------------|-------------------------------|
//! | `Starting stage 1`                 | 10                            |
//! | `Starting stage 2`                 | 50                            |
//! | `postprocessing` / `vocoder`       | 90                            |
//! | `N/M [` con progreso previo < 50   | `10 + 40·N/M` dentro de [10,50) |
//! | `N/M [` con progreso previo ≥ 50   | `50 + 40·N/M` dentro de [50,90) |
//!
//! Las líneas que no matchean dejan el progreso igual.

use crate::jobs::record::MAX_RUNNING_PROGRESS;
use regex::Regex;
use std::sync::OnceLock;

/// Traduce una línea de salida a un nuevo progreso
///
/// Implementaciones deben ser puras: el único estado es el piso
/// `previous` que pasa el llamador.
pub trait ProgressEstimator: Send + Sync {
    fn estimate(&self, previous: u8, line: &str) -> u8;
}

/// Estimador que nunca mueve el progreso
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressEstimator for NoProgress {
    fn estimate(&self, previous: u8, _line: &str) -> u8 {
        previous
    }
}

/// Checkpoint nombrado: substring → porcentaje fijo
#[derive(Debug, Clone)]
pub struct Milestone {
    pub needle: &'static str,
    pub percent: u8,
    pub ignore_case: bool,
}

impl Milestone {
    pub const fn new(needle: &'static str, percent: u8) -> Self {
        Self {
            needle,
            percent,
            ignore_case: false,
        }
    }

    pub const fn ignore_case(needle: &'static str, percent: u8) -> Self {
        Self {
            needle,
            percent,
            ignore_case: true,
        }
    }

    fn matches(&self, line: &str, lowered: &str) -> bool {
        if self.ignore_case {
            lowered.contains(&self.needle.to_lowercase())
        } else {
            line.contains(self.needle)
        }
    }
}

/// Banda `[start, end)` donde se interpolan los marcadores `N/M`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u8,
    pub end: u8,
}

impl Band {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Interpola `current/total` dentro de la banda, sin llegar a `end`
    fn interpolate(&self, current: u64, total: u64) -> u8 {
        let width = u64::from(self.end.saturating_sub(self.start));
        let offset = current.saturating_mul(width) / total;
        let value = u64::from(self.start) + offset;
        value.min(u64::from(self.end.saturating_sub(1))) as u8
    }
}

fn fraction_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Barras estilo tqdm: "12/50 [00:03<00:10, ...]"
        Regex::new(r"(\d+)/(\d+)\s*\[").expect("fraction pattern is valid")
    })
}

/// Reglas de progreso para la inferencia de música en dos etapas
#[derive(Debug, Clone)]
pub struct GenerationProgress {
    milestones: Vec<Milestone>,
    bands: Vec<Band>,
}

impl Default for GenerationProgress {
    fn default() -> Self {
        Self::new(
            vec![
                Milestone::new("Starting stage 1", 10),
                Milestone::new("Starting stage 2", 50),
                Milestone::ignore_case("postprocessing", 90),
                Milestone::ignore_case("vocoder", 90),
            ],
            vec![Band::new(10, 50), Band::new(50, 90)],
        )
    }
}

impl GenerationProgress {
    pub fn new(milestones: Vec<Milestone>, bands: Vec<Band>) -> Self {
        Self { milestones, bands }
    }

    /// Banda activa según el progreso ya alcanzado
    ///
    /// Antes de la primera banda se usa la primera; pasado el final de la
    /// última no hay banda y los marcadores se ignoran.
    fn band_for(&self, previous: u8) -> Option<Band> {
        let first = self.bands.first()?;
        if previous < first.start {
            return Some(*first);
        }
        self.bands
            .iter()
            .copied()
            .find(|band| previous >= band.start && previous < band.end)
    }

    fn fraction(line: &str) -> Option<(u64, u64)> {
        let caps = fraction_pattern().captures(line)?;
        let current: u64 = caps.get(1)?.as_str().parse().ok()?;
        let total: u64 = caps.get(2)?.as_str().parse().ok()?;
        if total == 0 || current > total {
            return None;
        }
        Some((current, total))
    }
}

impl ProgressEstimator for GenerationProgress {
    fn estimate(&self, previous: u8, line: &str) -> u8 {
        let interpolated = Self::fraction(line).and_then(|(current, total)| {
            self.band_for(previous)
                .map(|band| band.interpolate(current, total))
        });

        let lowered = line.to_lowercase();
        let milestone = self
            .milestones
            .iter()
            .filter(|m| m.matches(line, &lowered))
            .map(|m| m.percent)
            .max();

        // Una misma línea puede traer barra e hito: gana el mayor
        let candidate = interpolated.max(milestone);

        match candidate {
            Some(value) => previous.max(value.min(MAX_RUNNING_PROGRESS)),
            None => previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> GenerationProgress {
        GenerationProgress::default()
    }

    #[test]
    fn test_stage_milestones() {
        let e = estimator();
        assert_eq!(e.estimate(0, "Starting stage 1 ..."), 10);
        assert_eq!(e.estimate(30, "Starting stage 2"), 50);
        assert_eq!(e.estimate(60, "Running Vocoder"), 90);
        assert_eq!(e.estimate(60, "PostProcessing outputs"), 90);
    }

    #[test]
    fn test_fraction_and_milestone_on_same_line() {
        let e = estimator();
        assert_eq!(e.estimate(30, "Starting stage 2 0/2 ["), 50);
        assert_eq!(e.estimate(60, "vocoder 1/2 ["), 90);
        assert_eq!(e.estimate(0, "Starting stage 1 1/2 ["), 30);
    }

    #[test]
    fn test_stage_one_interpolation() {
        let e = estimator();
        assert_eq!(e.estimate(10, "12/50 [00:01<00:04]"), 19);
        assert_eq!(e.estimate(10, "25/50 ["), 30);
    }

    #[test]
    fn test_stage_one_stays_below_stage_two() {
        let e = estimator();
        assert_eq!(e.estimate(10, "50/50 ["), 49);
    }

    #[test]
    fn test_stage_two_interpolation() {
        let e = estimator();
        assert_eq!(e.estimate(50, "1/2 [00:30<00:30]"), 70);
        assert_eq!(e.estimate(70, "2/2 ["), 89);
    }

    #[test]
    fn test_never_decreases() {
        let e = estimator();
        assert_eq!(e.estimate(45, "1/50 ["), 45);
        assert_eq!(e.estimate(60, "Starting stage 1"), 60);
    }

    #[test]
    fn test_unrecognized_line_keeps_progress() {
        let e = estimator();
        assert_eq!(e.estimate(33, "loading tokenizer"), 33);
        assert_eq!(e.estimate(33, ""), 33);
    }

    #[test]
    fn test_malformed_fractions_are_ignored() {
        let e = estimator();
        assert_eq!(e.estimate(20, "3/0 ["), 20);
        assert_eq!(e.estimate(20, "9/3 ["), 20);
        assert_eq!(e.estimate(20, "99999999999999999999999/2 ["), 20);
        // Sin corchete no es una barra de progreso
        assert_eq!(e.estimate(20, "ratio 1/2"), 20);
    }

    #[test]
    fn test_fraction_past_last_band_is_ignored() {
        let e = estimator();
        assert_eq!(e.estimate(90, "1/2 ["), 90);
    }

    #[test]
    fn test_never_reaches_100() {
        let e = GenerationProgress::new(vec![Milestone::new("done", 100)], vec![]);
        assert_eq!(e.estimate(10, "done"), MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_no_progress_estimator() {
        assert_eq!(NoProgress.estimate(42, "Starting stage 2"), 42);
    }
}
