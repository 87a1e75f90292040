//! # Límite de Jobs Concurrentes
//! src/jobs/slots.rs
//!
//! Semáforo contado con `Mutex` + `Condvar`. Con capacidad 0 no hay límite:
//! cada job corre en su propio thread apenas se envía. Con capacidad N, el
//! thread del job espera un slot y el job sigue `queued` mientras tanto.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Slots de ejecución compartidos
pub struct JobSlots {
    /// Slots ocupados
    busy: Mutex<usize>,

    /// Notifica cuando se libera un slot
    condvar: Condvar,

    /// Máximo de jobs simultáneos (0 = sin límite)
    capacity: usize,
}

impl JobSlots {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            busy: Mutex::new(0),
            condvar: Condvar::new(),
            capacity,
        })
    }

    /// Sin límite
    pub fn unbounded() -> Arc<Self> {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots ocupados en este momento
    pub fn busy(&self) -> usize {
        *self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bloquea hasta obtener un slot
    ///
    /// El slot se libera al soltar el `SlotGuard`.
    pub fn acquire(self: &Arc<Self>) -> SlotGuard {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);

        if self.capacity > 0 {
            while *busy >= self.capacity {
                busy = self
                    .condvar
                    .wait(busy)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        *busy += 1;

        SlotGuard {
            slots: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        *busy = busy.saturating_sub(1);
        self.condvar.notify_one();
    }
}

/// Slot ocupado; se devuelve en `Drop`
pub struct SlotGuard {
    slots: Arc<JobSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.release();
    }
}
