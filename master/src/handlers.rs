use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    mapreduce, JobInfo, JobRequest, JobResults, JobStatus, WorkerMetrics, WorkerRegisterRequest,
    WorkerRegisterResponse, WorkerStatus,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path as FsPath;
use std::time::SystemTime;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::job_runner;
use crate::rpc::RemoteWorker;
use crate::state::{AppState, WorkerMeta};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/results", get(get_job_results))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Crea un job nuevo y lo corre en segundo plano
async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<Json<JobInfo>, (StatusCode, String)> {
    let chunk_size = req.chunk_size.unwrap_or(state.config.default_chunk_size);
    let job_info = prepare_job(&state, req)?;

    {
        let mut jobs = state.lock_jobs();
        jobs.insert(job_info.id.clone(), job_info.clone());
    }

    info!(
        "job {} aceptado (input={} reduce_jobs={} chunk_size={})",
        job_info.id, job_info.input_path, job_info.num_reduce_jobs, chunk_size
    );
    tokio::spawn(job_runner::run_job(state.clone(), job_info.id.clone(), chunk_size));

    Ok(Json(job_info))
}

/// Valida el pedido y arma el `JobInfo` inicial.
fn prepare_job(state: &AppState, req: JobRequest) -> Result<JobInfo, (StatusCode, String)> {
    if !FsPath::new(&req.input_path).is_file() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("input_path {} no existe o no es un archivo", req.input_path),
        ));
    }

    let num_reduce_jobs = req
        .num_reduce_jobs
        .unwrap_or(state.config.default_reduce_jobs);
    if num_reduce_jobs == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "num_reduce_jobs tiene que ser mayor a 0".to_string(),
        ));
    }
    if req.chunk_size == Some(0) {
        return Err((
            StatusCode::BAD_REQUEST,
            "chunk_size tiene que ser mayor a 0".to_string(),
        ));
    }

    let job_id = uuid::Uuid::new_v4().to_string();
    let work_dir = FsPath::new(&state.config.data_dir)
        .join("jobs")
        .join(&job_id)
        .to_string_lossy()
        .to_string();

    Ok(JobInfo {
        id: job_id,
        name: req.name,
        status: JobStatus::Accepted,
        input_path: req.input_path,
        work_dir,
        num_reduce_jobs,
        submitted_at: Utc::now(),
        started_at: None,
        finished_at: None,
        map_phase: None,
        reduce_phase: None,
        error: None,
    })
}

// Devuelve info de un job
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, StatusCode> {
    state.job(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// Lista archivos de salida de un job
async fn get_job_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResults>, StatusCode> {
    let job = state.job(&id).ok_or(StatusCode::NOT_FOUND)?;

    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(&job.work_dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("reduce-") || name == "result.txt" {
                    files.push(name.to_string());
                }
            }
        }
    }
    files.sort();

    let output_file = if job.status == JobStatus::Succeeded {
        Some(
            mapreduce::result_file_path(&job.work_dir)
                .to_string_lossy()
                .to_string(),
        )
    } else {
        None
    };

    Ok(Json(JobResults {
        job_id: job.id,
        work_dir: job.work_dir,
        output_file,
        files,
    }))
}

// Registra un worker nuevo y lo deja idle en el pool
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = uuid::Uuid::new_v4().to_string();

    {
        let mut workers = state.lock_workers();
        workers.insert(
            worker_id.clone(),
            WorkerMeta {
                hostname: req.hostname,
                address: req.address.clone(),
                registered_at: SystemTime::now(),
                retired_at: None,
            },
        );
    }

    state.pool.register(RemoteWorker {
        id: worker_id.clone(),
        address: req.address.clone(),
    });

    info!("worker registrado: {} ({})", worker_id, req.address);
    Json(WorkerRegisterResponse { worker_id })
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerMetrics>> {
    Json(worker_metrics(&state))
}

fn worker_metrics(state: &AppState) -> Vec<WorkerMetrics> {
    let now = SystemTime::now();
    let idle: HashSet<String> = state.pool.idle_ids().into_iter().collect();

    let workers = state.lock_workers();
    let mut out: Vec<WorkerMetrics> = workers
        .iter()
        .map(|(wid, meta)| {
            let status = if meta.retired_at.is_some() {
                WorkerStatus::Retired
            } else if idle.contains(wid) {
                WorkerStatus::Idle
            } else {
                WorkerStatus::Busy
            };

            WorkerMetrics {
                worker_id: wid.clone(),
                hostname: meta.hostname.clone(),
                address: meta.address.clone(),
                status,
                registered_secs_ago: now
                    .duration_since(meta.registered_at)
                    .unwrap_or_default()
                    .as_secs(),
            }
        })
        .collect();

    out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    out
}
