use std::sync::Arc;

use tracing::{info, warn};

use crate::{ledger::ResultLedger, operation::Operation, pool::WorkerPool, rpc::RemoteWorkerProxy};

/// Ejecuta una operación en algún worker idle y anota el resultado en el ledger.
pub struct OperationExecutor {
    pool: Arc<WorkerPool>,
    proxy: RemoteWorkerProxy,
    ledger: Arc<ResultLedger>,
}

impl OperationExecutor {
    pub fn new(pool: Arc<WorkerPool>, proxy: RemoteWorkerProxy, ledger: Arc<ResultLedger>) -> Self {
        Self {
            pool,
            proxy,
            ledger,
        }
    }

    /// 1. toma un worker (espera si no hay)
    /// 2. invoca `operation.proc` en él
    /// 3. error: retira el worker y anota el fallo
    /// 4. éxito: devuelve el worker al pool y anota el éxito
    pub async fn execute(&self, operation: Operation) {
        let worker = self.pool.acquire().await;
        info!(
            "corriendo {} (ID: '{}' Input: '{}' Worker: '{}')",
            operation.proc, operation.id, operation.input_path, worker.id
        );

        match self.proxy.invoke(&worker, &operation.proc, &operation).await {
            Err(e) => {
                warn!(
                    "operación {} '{}' falló en worker {}: {}",
                    operation.proc, operation.id, worker.id, e
                );
                self.pool.retire(worker);
                self.ledger.insert_failure(operation.id, operation);
            }
            Ok(()) => {
                self.pool.release(worker);
                self.ledger.insert_success(operation.id, operation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RemoteWorker, RpcError, WorkerInvoker};
    use async_trait::async_trait;
    use common::{RunArgs, Task};

    /// Falla cuando el worker se llama "malo".
    struct ByWorkerInvoker;

    #[async_trait]
    impl WorkerInvoker for ByWorkerInvoker {
        async fn call(
            &self,
            worker: &RemoteWorker,
            proc: &str,
            _args: &RunArgs,
        ) -> Result<(), RpcError> {
            if worker.id == "malo" {
                Err(RpcError::Remote {
                    url: format!("{}/rpc/{}", worker.address, proc),
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn setup(
        workers: &[&str],
    ) -> (
        OperationExecutor,
        Arc<WorkerPool>,
        Arc<ResultLedger>,
        tokio::sync::mpsc::UnboundedReceiver<RemoteWorker>,
    ) {
        let (pool, retired) = WorkerPool::new();
        let pool = Arc::new(pool);
        for id in workers {
            pool.register(RemoteWorker {
                id: id.to_string(),
                address: format!("http://{id}:9090"),
            });
        }
        let ledger = Arc::new(ResultLedger::new());
        let task = Task {
            job_id: "job".to_string(),
            num_reduce_jobs: 1,
            work_dir: "/tmp/job".to_string(),
        };
        let proxy = RemoteWorkerProxy::new(Arc::new(ByWorkerInvoker), task);
        let executor = OperationExecutor::new(pool.clone(), proxy, ledger.clone());
        (executor, pool, ledger, retired)
    }

    #[tokio::test]
    async fn exito_devuelve_el_worker_y_anota_exito() {
        let (executor, pool, ledger, mut retired) = setup(&["bueno"]);

        executor.execute(Operation::new("map", 0, "split-0.txt")).await;

        assert_eq!(ledger.succeeded_ids(), vec![0]);
        assert_eq!(ledger.failure_count(), 0);
        assert_eq!(pool.idle_ids(), vec!["bueno".to_string()]);
        assert!(retired.try_recv().is_err());
    }

    #[tokio::test]
    async fn fallo_retira_el_worker_y_anota_fallo() {
        let (executor, pool, ledger, mut retired) = setup(&["malo", "bueno"]);

        executor.execute(Operation::new("map", 4, "split-4.txt")).await;

        assert_eq!(ledger.failed_ids(), vec![4]);
        assert_eq!(ledger.success_count(), 0);
        assert_eq!(retired.try_recv().unwrap().id, "malo");
        assert_eq!(pool.idle_ids(), vec!["bueno".to_string()]);

        // el siguiente intento ya no puede caer en el worker retirado
        executor.execute(Operation::new("map", 4, "split-4.txt")).await;
        assert_eq!(ledger.succeeded_ids(), vec![4]);
    }
}
