use crate::rpc::RemoteWorker;
use crate::state::AppState;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Supervisor de workers retirados.
/// El pool nunca los vuelve a usar; acá sólo quedan marcados para
/// `GET /api/v1/workers` y en el log, a la espera de que alguien los
/// reemplace (un worker nuevo se registra con otro id).
pub async fn supervise_retired(state: AppState, mut retired: mpsc::UnboundedReceiver<RemoteWorker>) {
    while let Some(worker) = retired.recv().await {
        let known = {
            let mut workers = state.lock_workers();
            match workers.get_mut(&worker.id) {
                Some(meta) => {
                    meta.retired_at = Some(SystemTime::now());
                    true
                }
                None => false,
            }
        };

        if known {
            warn!(
                "worker {} ({}) retirado tras una operación fallida",
                worker.id, worker.address
            );
        } else {
            warn!("worker desconocido {} retirado", worker.id);
        }

        let idle = state.pool.idle_count();
        if idle == 0 {
            warn!("no quedan workers idle: las operaciones pendientes van a esperar un registro nuevo");
        } else {
            info!("quedan {} workers idle", idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rpc::HttpInvoker;
    use crate::state::WorkerMeta;
    use std::{sync::Arc, time::Duration};

    #[tokio::test]
    async fn marca_como_retirado_al_worker_que_sale_del_pool() {
        let invoker = Arc::new(HttpInvoker::new(None).unwrap());
        let (state, retired_rx) = AppState::new(Config::default(), invoker);

        let worker = RemoteWorker {
            id: "w1".to_string(),
            address: "http://w1:9090".to_string(),
        };
        state.lock_workers().insert(
            worker.id.clone(),
            WorkerMeta {
                hostname: "w1".to_string(),
                address: worker.address.clone(),
                registered_at: SystemTime::now(),
                retired_at: None,
            },
        );
        state.pool.register(worker);

        let supervisor = tokio::spawn(supervise_retired(state.clone(), retired_rx));

        let w = state.pool.acquire().await;
        state.pool.retire(w);

        let marked = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if state.lock_workers()["w1"].retired_at.is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        supervisor.abort();

        assert!(marked.is_ok(), "el supervisor no marcó al worker");
    }
}
