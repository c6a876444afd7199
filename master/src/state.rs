// master/src/state.rs

use common::{JobId, JobInfo, WorkerId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    pool::WorkerPool,
    rpc::{RemoteWorker, WorkerInvoker},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<Mutex<HashMap<JobId, JobInfo>>>,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    // workers idle + canal de retirados
    pub pool: Arc<WorkerPool>,
    // transporte de las RPC a workers
    pub invoker: Arc<dyn WorkerInvoker>,
}

impl AppState {
    /// Devuelve también el receptor de workers retirados, para el supervisor.
    pub fn new(
        config: Config,
        invoker: Arc<dyn WorkerInvoker>,
    ) -> (Self, mpsc::UnboundedReceiver<RemoteWorker>) {
        let (pool, retired_rx) = WorkerPool::new();
        let state = Self {
            config: Arc::new(config),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            workers: Arc::new(Mutex::new(HashMap::new())),
            pool: Arc::new(pool),
            invoker,
        };
        (state, retired_rx)
    }

    pub fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobInfo>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lock_workers(&self) -> MutexGuard<'_, HashMap<WorkerId, WorkerMeta>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job(&self, id: &str) -> Option<JobInfo> {
        self.lock_jobs().get(id).cloned()
    }

    /// Aplica `f` al job si existe.
    pub fn update_job<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut JobInfo),
    {
        if let Some(job) = self.lock_jobs().get_mut(id) {
            f(job);
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub address: String,
    pub registered_at: SystemTime,
    /// Momento en que el pool lo sacó de rotación
    pub retired_at: Option<SystemTime>,
}
