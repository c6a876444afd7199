use std::sync::Arc;

use common::{FailedOperation, PhaseReport, Task};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    executor::OperationExecutor,
    ledger::ResultLedger,
    operation::Operation,
    pool::WorkerPool,
    rpc::{RemoteWorkerProxy, WorkerInvoker},
};

/// Rondas de reintento después de la ronda inicial.
pub const MAX_RETRY_ROUNDS: usize = 3;

/// Corre una fase (map o reduce) completa sobre un stream de entradas.
pub struct PhaseDispatcher {
    executor: Arc<OperationExecutor>,
    ledger: Arc<ResultLedger>,
}

impl PhaseDispatcher {
    pub fn new(pool: Arc<WorkerPool>, invoker: Arc<dyn WorkerInvoker>, task: Task) -> Self {
        let ledger = Arc::new(ResultLedger::new());
        let proxy = RemoteWorkerProxy::new(invoker, task);
        let executor = Arc::new(OperationExecutor::new(pool, proxy, ledger.clone()));
        Self { executor, ledger }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &ResultLedger {
        &self.ledger
    }

    /// Consume `inputs` hasta que se cierre, asignando ids 0..N-1 en orden de
    /// llegada y lanzando una tarea por operación. Después de la ronda inicial
    /// reintenta lo fallido hasta `MAX_RETRY_ROUNDS` veces.
    ///
    /// `total` es N aunque haya operaciones que nunca terminaron bien; esas
    /// quedan en `failed` y ya no aparecen en el ledger.
    pub async fn run_phase(&self, proc: &str, mut inputs: mpsc::Receiver<String>) -> PhaseReport {
        info!("programando operaciones {}", proc);
        self.ledger.clear();

        let mut round = JoinSet::new();
        let mut counter = 0;

        // Ronda inicial
        while let Some(input_path) = inputs.recv().await {
            let operation = Operation::new(proc, counter, input_path);
            counter += 1;
            self.spawn(&mut round, operation);
        }
        wait_round(&mut round).await;
        self.log_round(proc, 0);

        // Reintentos
        let mut retry_rounds = 0;
        for retry in 0..MAX_RETRY_ROUNDS {
            let failed = self.ledger.drain_failures();
            if failed.is_empty() {
                break;
            }

            info!(
                "reintentando {} operaciones {} fallidas (intento {}/{})",
                failed.len(),
                proc,
                retry + 1,
                MAX_RETRY_ROUNDS
            );
            retry_rounds += 1;

            for operation in failed {
                self.spawn(&mut round, operation);
            }
            wait_round(&mut round).await;
            self.log_round(proc, retry + 1);
        }

        let dropped = self.ledger.drain_failures();
        for operation in &dropped {
            warn!(
                "operación {} '{}' sigue fallando después de {} reintentos, se descarta (input: {})",
                operation.proc, operation.id, MAX_RETRY_ROUNDS, operation.input_path
            );
        }

        let succeeded = self.ledger.success_count();
        info!(
            "{}x operaciones {} completadas ({} ok, {} descartadas)",
            counter,
            proc,
            succeeded,
            dropped.len()
        );

        PhaseReport {
            proc: proc.to_string(),
            total: counter,
            succeeded,
            retry_rounds,
            failed: dropped
                .into_iter()
                .map(|op| FailedOperation {
                    id: op.id,
                    input_path: op.input_path,
                })
                .collect(),
        }
    }

    fn log_round(&self, proc: &str, round: usize) {
        debug!(
            "ronda {} de {} terminada: {} ok, {} fallidas",
            round,
            proc,
            self.ledger.success_count(),
            self.ledger.failure_count()
        );
    }

    fn spawn(&self, round: &mut JoinSet<()>, operation: Operation) {
        let executor = self.executor.clone();
        round.spawn(async move { executor.execute(operation).await });
    }
}

/// Barrera de fin de ronda.
async fn wait_round(round: &mut JoinSet<()>) {
    while let Some(res) = round.join_next().await {
        if let Err(e) = res {
            warn!("una tarea de la ronda terminó con error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RemoteWorker, RpcError};
    use async_trait::async_trait;
    use common::{RunArgs, WorkerId};
    use std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    #[derive(Debug, Clone)]
    struct Call {
        worker: WorkerId,
        operation_id: usize,
        input: String,
        ok: bool,
    }

    /// Cada input falla las primeras `n` veces que se intenta.
    #[derive(Default)]
    struct ScriptedInvoker {
        failures: HashMap<String, usize>,
        attempts: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<Call>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedInvoker {
        fn failing(failures: &[(&str, usize)]) -> Self {
            Self {
                failures: failures
                    .iter()
                    .map(|(input, n)| (input.to_string(), *n))
                    .collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkerInvoker for ScriptedInvoker {
        async fn call(
            &self,
            worker: &RemoteWorker,
            proc: &str,
            args: &RunArgs,
        ) -> Result<(), RpcError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(args.input_path.clone()).or_insert(0);
                *n += 1;
                *n
            };
            let ok = attempt > self.failures.get(&args.input_path).copied().unwrap_or(0);

            self.calls.lock().unwrap().push(Call {
                worker: worker.id.clone(),
                operation_id: args.operation_id,
                input: args.input_path.clone(),
                ok,
            });
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if ok {
                Ok(())
            } else {
                Err(RpcError::Remote {
                    url: format!("{}/rpc/{}", worker.address, proc),
                    status: 500,
                    body: format!("intento {} de {}", attempt, args.input_path),
                })
            }
        }
    }

    struct Harness {
        dispatcher: PhaseDispatcher,
        invoker: Arc<ScriptedInvoker>,
        retired: mpsc::UnboundedReceiver<RemoteWorker>,
    }

    fn harness(num_workers: usize, invoker: ScriptedInvoker) -> Harness {
        let (pool, retired) = WorkerPool::new();
        let pool = Arc::new(pool);
        for i in 0..num_workers {
            pool.register(RemoteWorker {
                id: format!("w{i}"),
                address: format!("http://w{i}:9090"),
            });
        }
        let invoker = Arc::new(invoker);
        let task = Task {
            job_id: "job".to_string(),
            num_reduce_jobs: 2,
            work_dir: "/tmp/job".to_string(),
        };
        Harness {
            dispatcher: PhaseDispatcher::new(pool, invoker.clone(), task),
            invoker,
            retired,
        }
    }

    fn inputs(items: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item.to_string()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn ids_densos_y_unicos() {
        let h = harness(4, ScriptedInvoker::default());
        let names: Vec<String> = (0..20).map(|i| format!("split-{i}.txt")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let report = h.dispatcher.run_phase("map", inputs(&refs)).await;

        assert_eq!(report.total, 20);
        let mut ids: Vec<usize> = h.invoker.calls().iter().map(|c| c.operation_id).collect();
        ids.sort();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
        assert_eq!(h.dispatcher.ledger().succeeded_ids(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn ids_siguen_el_orden_de_consumo() {
        let h = harness(2, ScriptedInvoker::default());

        h.dispatcher.run_phase("map", inputs(&["a", "b", "c"])).await;

        let mut by_id: Vec<(usize, String)> = h
            .invoker
            .calls()
            .into_iter()
            .map(|c| (c.operation_id, c.input))
            .collect();
        by_id.sort();
        assert_eq!(
            by_id,
            vec![
                (0, "a".to_string()),
                (1, "b".to_string()),
                (2, "c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cinco_entradas_sin_fallos() {
        let h = harness(3, ScriptedInvoker::default());

        let report = h
            .dispatcher
            .run_phase("map", inputs(&["a", "b", "c", "d", "e"]))
            .await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.retry_rounds, 0);
        assert!(report.is_complete());
        assert_eq!(h.dispatcher.ledger().success_count(), 5);
        assert_eq!(h.dispatcher.ledger().failure_count(), 0);
        assert_eq!(h.invoker.calls().len(), 5);
    }

    #[tokio::test]
    async fn falla_una_vez_y_se_recupera() {
        let h = harness(3, ScriptedInvoker::failing(&[("b", 1)]));

        let report = h.dispatcher.run_phase("map", inputs(&["a", "b", "c"])).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.retry_rounds, 1);
        assert!(report.failed.is_empty());
        assert_eq!(h.dispatcher.ledger().success_count(), 3);
        assert_eq!(h.dispatcher.ledger().failure_count(), 0);
    }

    #[tokio::test]
    async fn fallos_transitorios_hasta_tres_se_recuperan() {
        for k in 1..=MAX_RETRY_ROUNDS {
            let h = harness(k + 2, ScriptedInvoker::failing(&[("x", k)]));

            let report = h.dispatcher.run_phase("reduce", inputs(&["x", "y"])).await;

            assert_eq!(report.retry_rounds, k, "k={k}");
            assert!(report.failed.is_empty(), "k={k}");
            assert_eq!(h.dispatcher.ledger().succeeded_ids(), vec![0, 1], "k={k}");
            assert_eq!(h.dispatcher.ledger().failure_count(), 0, "k={k}");
        }
    }

    #[tokio::test]
    async fn falla_siempre_y_se_descarta() {
        let h = harness(6, ScriptedInvoker::failing(&[("a", usize::MAX)]));

        let report = h.dispatcher.run_phase("map", inputs(&["a", "b"])).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retry_rounds, MAX_RETRY_ROUNDS);
        assert_eq!(
            report.failed,
            vec![FailedOperation {
                id: 0,
                input_path: "a".to_string()
            }]
        );
        assert_eq!(h.dispatcher.ledger().succeeded_ids(), vec![1]);
        assert_eq!(h.dispatcher.ledger().failure_count(), 0);

        // ronda inicial + 3 reintentos
        let attempts_a = h
            .invoker
            .calls()
            .iter()
            .filter(|c| c.operation_id == 0)
            .count();
        assert_eq!(attempts_a, 1 + MAX_RETRY_ROUNDS);
    }

    #[tokio::test]
    async fn un_worker_que_falla_no_se_vuelve_a_usar() {
        let mut h = harness(
            6,
            ScriptedInvoker::failing(&[("a", 2), ("c", 1), ("e", 1)]),
        );

        h.dispatcher
            .run_phase("map", inputs(&["a", "b", "c", "d", "e"]))
            .await;

        let calls = h.invoker.calls();
        let mut retired_so_far: HashSet<WorkerId> = HashSet::new();
        for call in &calls {
            assert!(
                !retired_so_far.contains(&call.worker),
                "worker {} usado después de fallar",
                call.worker
            );
            if !call.ok {
                retired_so_far.insert(call.worker.clone());
            }
        }

        let mut retired = HashSet::new();
        while let Ok(w) = h.retired.try_recv() {
            retired.insert(w.id);
        }
        assert_eq!(retired, retired_so_far);
        assert_eq!(retired.len(), 4);
    }

    #[tokio::test]
    async fn entrada_vacia_no_lanza_nada() {
        let h = harness(1, ScriptedInvoker::default());

        let report = h.dispatcher.run_phase("map", inputs(&[])).await;

        assert_eq!(report.total, 0);
        assert_eq!(report.retry_rounds, 0);
        assert!(h.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn espera_a_que_se_cierre_el_stream() {
        let h = harness(2, ScriptedInvoker::default());
        let (tx, rx) = mpsc::channel(1);

        let producer = tokio::spawn(async move {
            for name in ["a", "b", "c"] {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(name.to_string()).await.unwrap();
            }
        });

        let report = h.dispatcher.run_phase("map", rx).await;
        producer.await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn llamadas_simultaneas_acotadas_por_workers_idle() {
        let invoker = ScriptedInvoker {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let h = harness(2, invoker);

        let report = h
            .dispatcher
            .run_phase("map", inputs(&["a", "b", "c", "d", "e", "f"]))
            .await;

        assert_eq!(report.succeeded, 6);
        let max = h.invoker.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "hubo {max} llamadas simultáneas con 2 workers");
        assert!(max >= 1);
    }

    #[tokio::test]
    async fn cada_fase_arranca_con_el_ledger_limpio() {
        let h = harness(2, ScriptedInvoker::default());

        h.dispatcher.run_phase("map", inputs(&["a", "b", "c"])).await;
        let report = h.dispatcher.run_phase("reduce", inputs(&["0"])).await;

        assert_eq!(report.total, 1);
        assert_eq!(h.dispatcher.ledger().succeeded_ids(), vec![0]);
    }
}
