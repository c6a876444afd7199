use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use common::{mapreduce, JobId, JobStatus, PhaseReport, Task, MAP_PROC, REDUCE_PROC};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{dispatcher::PhaseDispatcher, state::AppState};

/// Splits que el splitter puede adelantar antes de que la fase map los consuma.
const SPLIT_CHANNEL_CAPACITY: usize = 64;

/// Corre un job completo: split -> map -> reduce -> merge.
/// Deja el resultado (o el motivo del fallo) en el `JobInfo` del estado.
pub async fn run_job(state: AppState, job_id: JobId, chunk_size: usize) {
    let Some(job) = state.job(&job_id) else {
        warn!("job {} no existe, nada que correr", job_id);
        return;
    };

    let task = Task {
        job_id: job.id.clone(),
        num_reduce_jobs: job.num_reduce_jobs,
        work_dir: job.work_dir.clone(),
    };

    state.update_job(&job_id, |job| {
        job.status = JobStatus::Mapping;
        job.started_at = Some(Utc::now());
    });

    let outcome = execute(&state, task, job.input_path, chunk_size).await;

    state.update_job(&job_id, |job| {
        job.finished_at = Some(Utc::now());
        match &outcome {
            Ok(()) => job.status = JobStatus::Succeeded,
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(format!("{:#}", e));
            }
        }
    });

    match outcome {
        Ok(()) => info!("job {} terminado", job_id),
        Err(e) => warn!("job {} falló: {:#}", job_id, e),
    }
}

async fn execute(state: &AppState, task: Task, input_path: String, chunk_size: usize) -> Result<()> {
    let job_id = task.job_id.clone();
    let num_reduce_jobs = task.num_reduce_jobs;
    let work_dir = task.work_dir.clone();
    let dispatcher = PhaseDispatcher::new(state.pool.clone(), state.invoker.clone(), task);

    // ---- MAP: el splitter alimenta la fase a medida que escribe splits ----
    let (tx, rx) = mpsc::channel(SPLIT_CHANNEL_CAPACITY);
    let splitter = {
        let work_dir = work_dir.clone();
        tokio::task::spawn_blocking(move || {
            mapreduce::split_input(&input_path, &work_dir, chunk_size, |path| {
                tx.blocking_send(path)
                    .map_err(|_| anyhow!("la fase map dejó de consumir splits"))
            })
        })
    };

    let map_report = dispatcher.run_phase(MAP_PROC, rx).await;
    record_phase(state, &job_id, &map_report);
    let splits = splitter.await??;
    info!("job {}: {} splits procesados por map", job_id, splits);
    ensure_complete(&map_report)?;

    // ---- REDUCE: una operación por partición del shuffle ----
    state.update_job(&job_id, |job| job.status = JobStatus::Reducing);

    let (tx, rx) = mpsc::channel(num_reduce_jobs.max(1));
    for reduce_id in 0..num_reduce_jobs {
        tx.try_send(reduce_id.to_string())?;
    }
    drop(tx);

    let reduce_report = dispatcher.run_phase(REDUCE_PROC, rx).await;
    record_phase(state, &job_id, &reduce_report);
    ensure_complete(&reduce_report)?;

    // ---- MERGE ----
    let lines = tokio::task::spawn_blocking(move || {
        mapreduce::merge_reduce_outputs(&work_dir, num_reduce_jobs)
    })
    .await??;
    info!("job {}: {} claves en el resultado final", job_id, lines);

    Ok(())
}

fn record_phase(state: &AppState, job_id: &str, report: &PhaseReport) {
    let report = report.clone();
    state.update_job(job_id, |job| {
        if report.proc == MAP_PROC {
            job.map_phase = Some(report);
        } else {
            job.reduce_phase = Some(report);
        }
    });
}

fn ensure_complete(report: &PhaseReport) -> Result<()> {
    if !report.is_complete() {
        let ids: Vec<String> = report.failed.iter().map(|f| f.id.to_string()).collect();
        bail!(
            "{} de {} operaciones {} fallaron después de todos los reintentos (ids: {})",
            report.failed.len(),
            report.total,
            report.proc,
            ids.join(", ")
        );
    }
    Ok(())
}
