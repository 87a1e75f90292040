//! # Registro Concurrente de Jobs
//! src/jobs/registry.rs
//!
//! Única estructura mutable compartida del sistema. Cada job tiene su propio
//! `Mutex`, así que las actualizaciones sobre ids distintos no se bloquean
//! entre sí; el `RwLock` de la tabla solo se toma en escritura al crear.
//!
//! No hay persistencia: los registros viven lo que vive el proceso.

use crate::error::JobError;
use crate::jobs::record::{JobKind, JobRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

type Entry = Arc<Mutex<JobRecord>>;

/// Tabla interna: índice por id + orden de creación
#[derive(Default)]
struct Table {
    index: HashMap<String, Entry>,
    order: Vec<Entry>,
}

/// Store thread-safe de `JobRecord`
#[derive(Default)]
pub struct JobRegistry {
    table: RwLock<Table>,
}

// Un panic dentro de un mutador no invalida el registro: cada mutación es
// pequeña y deja el record en un estado coherente.
fn lock(entry: &Entry) -> MutexGuard<'_, JobRecord> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea un job nuevo en estado `queued` con un id fresco
    pub fn create(
        &self,
        kind: JobKind,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> JobRecord {
        let id = uuid::Uuid::new_v4().to_string();
        let record = JobRecord::new(id.clone(), kind, metadata);
        let snapshot = record.clone();
        let entry = Arc::new(Mutex::new(record));

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.index.insert(id, Arc::clone(&entry));
        table.order.push(entry);

        snapshot
    }

    fn entry(&self, id: &str) -> Result<Entry, JobError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Snapshot actual de un job
    pub fn get(&self, id: &str) -> Result<JobRecord, JobError> {
        let entry = self.entry(id)?;
        let record = lock(&entry).clone();
        Ok(record)
    }

    /// Aplica una mutación atómica sobre un job
    ///
    /// El mutador corre con el lock del registro tomado: ninguna otra
    /// actualización del mismo id puede intercalarse. El valor que retorna
    /// el mutador se devuelve al llamador.
    pub fn update<F, R>(&self, id: &str, mutator: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let entry = self.entry(id)?;
        let mut record = lock(&entry);
        Ok(mutator(&mut record))
    }

    /// Snapshot de todos los jobs en orden de creación
    ///
    /// Cada registro se copia con su propio lock; el conjunto no es un corte
    /// instantáneo.
    pub fn list(&self) -> Vec<JobRecord> {
        let entries: Vec<Entry> = {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            table.order.clone()
        };
        entries.iter().map(|entry| lock(entry).clone()).collect()
    }

    /// Número de jobs registrados
    pub fn count(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::JobStatus;
    use std::thread;

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let created = registry.create(JobKind::Separation, BTreeMap::new());

        let fetched = registry.get(&created.id).unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.kind, JobKind::Separation);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create(JobKind::Generation, BTreeMap::new());
        let b = registry.create(JobKind::Generation, BTreeMap::new());
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = JobRegistry::new();
        assert!(matches!(registry.get("nope"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let registry = JobRegistry::new();
        let result = registry.update("nope", |job| job.push_log("x"));
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_update_returns_mutator_value() {
        let registry = JobRegistry::new();
        let job = registry.create(JobKind::Generation, BTreeMap::new());

        let started = registry.update(&job.id, |r| r.mark_processing()).unwrap();
        assert!(started.is_ok());
        assert_eq!(registry.get(&job.id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_list_preserves_creation_order() {
        let registry = JobRegistry::new();
        let ids: Vec<String> = (0..5)
            .map(|_| registry.create(JobKind::Generation, BTreeMap::new()).id)
            .collect();

        let listed: Vec<String> = registry.list().into_iter().map(|r| r.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_concurrent_updates_do_not_interleave() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobKind::Generation, BTreeMap::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let id = job.id.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        registry
                            .update(&id, |r| {
                                // Dos pushes en la misma mutación deben quedar juntos
                                r.push_log(format!("{}-{}-a", t, i));
                                r.push_log(format!("{}-{}-b", t, i));
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let logs = registry.get(&job.id).unwrap().logs;
        assert_eq!(logs.len(), 8 * 50 * 2);
        for pair in logs.chunks(2) {
            let a = pair[0].trim_end_matches("-a");
            let b = pair[1].trim_end_matches("-b");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_panicking_mutator_does_not_poison_registry() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobKind::Generation, BTreeMap::new());

        let r = Arc::clone(&registry);
        let id = job.id.clone();
        let _ = thread::spawn(move || {
            let _ = r.update(&id, |_| panic!("mutator exploded"));
        })
        .join();

        assert!(registry.get(&job.id).is_ok());
    }
}
