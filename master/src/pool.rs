use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use common::WorkerId;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::rpc::RemoteWorker;

/// Pool de workers remotos.
///
/// - `acquire` espera hasta que haya un worker idle (FIFO entre los que esperan).
/// - `release` lo devuelve a la cola de idle.
/// - `retire` lo saca de rotación para siempre y lo publica en el canal de
///   retirados, para que un supervisor externo decida qué hacer.
///
/// Si todos los workers quedan retirados, `acquire` espera indefinidamente.
pub struct WorkerPool {
    idle: Mutex<VecDeque<RemoteWorker>>,
    available: Notify,
    retired_tx: mpsc::UnboundedSender<RemoteWorker>,
}

impl WorkerPool {
    /// Crea el pool vacío junto con el receptor de workers retirados.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteWorker>) {
        let (retired_tx, retired_rx) = mpsc::unbounded_channel();
        let pool = Self {
            idle: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            retired_tx,
        };
        (pool, retired_rx)
    }

    /// Alta de un worker recién registrado.
    pub fn register(&self, worker: RemoteWorker) {
        debug!("worker {} entra al pool ({})", worker.id, worker.address);
        self.push_idle(worker);
    }

    pub async fn acquire(&self) -> RemoteWorker {
        loop {
            if let Some(worker) = self.lock_idle().pop_front() {
                return worker;
            }
            // notify_one guarda un permiso si nadie espera todavía,
            // así que un release entre el pop y este await no se pierde
            self.available.notified().await;
        }
    }

    pub fn release(&self, worker: RemoteWorker) {
        self.push_idle(worker);
    }

    pub fn retire(&self, worker: RemoteWorker) {
        warn!("retirando worker {} ({})", worker.id, worker.address);
        if let Err(e) = self.retired_tx.send(worker) {
            warn!("nadie escucha el canal de retirados, se descarta {}", e.0.id);
        }
    }

    /// Ids de los workers idle en este momento, en orden de entrega.
    pub fn idle_ids(&self) -> Vec<WorkerId> {
        self.lock_idle().iter().map(|w| w.id.clone()).collect()
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn push_idle(&self, worker: RemoteWorker) {
        self.lock_idle().push_back(worker);
        self.available.notify_one();
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, VecDeque<RemoteWorker>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
