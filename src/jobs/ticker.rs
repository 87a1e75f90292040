//! # Ticker de Progreso Simulado
//! src/jobs/ticker.rs
//!
//! Para trabajos que no dan ninguna señal de progreso (la separación) se
//! avanza un paso fijo por intervalo desde un thread auxiliar, con tope
//! debajo de 100.
//!
//! El ticker se detiene cerrando su canal y se espera con `join` antes de
//! escribir el estado terminal: después de `stop()` ya no puede ocurrir
//! ningún tick.

use crate::jobs::registry::JobRegistry;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Parámetros del ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Tiempo entre ticks
    pub interval: Duration,

    /// Puntos que suma cada tick
    pub step: u8,

    /// Progreso máximo alcanzable por ticks
    pub cap: u8,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            step: 1,
            cap: 95,
        }
    }
}

/// Thread auxiliar que avanza el progreso de un job
pub struct ProgressTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Arranca el ticker para `job_id`
    pub fn start(
        registry: Arc<JobRegistry>,
        job_id: String,
        config: TickerConfig,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let name = format!("ticker-{}", short_id(&job_id));
        let handle = thread::Builder::new().name(name).spawn(move || loop {
            match stop_rx.recv_timeout(config.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                // Señal explícita o sender descartado: terminar
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let keep_going = registry.update(&job_id, |job| {
                if job.is_terminal() {
                    return false;
                }
                let next = job.progress.saturating_add(config.step).min(config.cap);
                job.advance(next);
                true
            });

            if !matches!(keep_going, Ok(true)) {
                break;
            }
        })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Detiene el ticker y espera a que su thread termine
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("progress ticker thread panicked");
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Prefijo corto de un id para nombres de threads y logs
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
