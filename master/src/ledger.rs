use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::operation::Operation;

type Entries = BTreeMap<usize, Operation>;

/// Registro de resultados de una fase: id de operación -> operación.
/// Éxitos y fallos tienen cada uno su propio lock; sólo se exponen
/// operaciones compuestas, nunca los mapas.
#[derive(Default)]
pub struct ResultLedger {
    succeeded: Mutex<Entries>,
    failed: Mutex<Entries>,
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pisa cualquier resultado anterior del mismo id.
    pub fn insert_success(&self, id: usize, operation: Operation) {
        lock(&self.succeeded).insert(id, operation);
    }

    /// Pisa cualquier resultado anterior del mismo id.
    pub fn insert_failure(&self, id: usize, operation: Operation) {
        lock(&self.failed).insert(id, operation);
    }

    /// Devuelve los fallos de la ronda (ordenados por id) y deja el mapa vacío.
    pub fn drain_failures(&self) -> Vec<Operation> {
        std::mem::take(&mut *lock(&self.failed)).into_values().collect()
    }

    pub fn success_count(&self) -> usize {
        lock(&self.succeeded).len()
    }

    pub fn failure_count(&self) -> usize {
        lock(&self.failed).len()
    }

    #[cfg(test)]
    pub fn succeeded_ids(&self) -> Vec<usize> {
        lock(&self.succeeded).keys().copied().collect()
    }

    #[cfg(test)]
    pub fn failed_ids(&self) -> Vec<usize> {
        lock(&self.failed).keys().copied().collect()
    }

    /// Vacía ambos mapas. Se usa al empezar una fase.
    pub fn clear(&self) {
        lock(&self.succeeded).clear();
        lock(&self.failed).clear();
    }
}
