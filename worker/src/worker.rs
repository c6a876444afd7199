use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use common::{
    mapreduce, wordcount, RunArgs, RunReply, WorkerId, WorkerRegisterRequest,
    WorkerRegisterResponse,
};
use reqwest::Client;
use std::{env, time::Duration};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_MASTER_URL: &str = "http://localhost:8080";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9090";
const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Configuración del worker (variables de entorno).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// MASTER_URL
    pub master_url: String,
    /// WORKER_BIND_ADDR
    pub bind_addr: String,
    /// WORKER_ADVERTISE_URL: URL con la que el master nos llama
    pub advertise_url: String,
    /// WORKER_FAIL_RATE: probabilidad (0.0 a 1.0) de fallar una RPC a propósito
    pub fail_rate: f64,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            env::var("WORKER_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let hostname = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let advertise_url = env::var("WORKER_ADVERTISE_URL")
            .unwrap_or_else(|_| default_advertise_url(&hostname, &bind_addr));

        Self {
            master_url: env::var("MASTER_URL").unwrap_or_else(|_| DEFAULT_MASTER_URL.to_string()),
            bind_addr,
            advertise_url,
            fail_rate: parse_fail_rate(env::var("WORKER_FAIL_RATE").ok()),
        }
    }
}

/// "http://<hostname>:<puerto de bind_addr>"
fn default_advertise_url(hostname: &str, bind_addr: &str) -> String {
    let port = bind_addr.rsplit(':').next().unwrap_or("9090");
    let host = if hostname.is_empty() { "localhost" } else { hostname };
    format!("http://{}:{}", host, port)
}

fn parse_fail_rate(raw: Option<String>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .map(|r| r.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

#[derive(Clone)]
struct WorkerState {
    fail_rate: f64,
}

fn build_router(fail_rate: f64) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc/map", post(rpc_map))
        .route("/rpc/reduce", post(rpc_reduce))
        .with_state(WorkerState { fail_rate })
}

/// Loop principal del worker.
/// - Levanta el servidor de RPCs.
/// - Se registra en el master (reintenta hasta lograrlo).
/// - Atiende map/reduce hasta que el servidor termine.
pub async fn run(config: WorkerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "worker escuchando en {} (anunciado como {}, fail_rate={})",
        listener.local_addr()?,
        config.advertise_url,
        config.fail_rate
    );

    let app = build_router(config.fail_rate);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let client = Client::new();
    let worker_id = register_until_ok(&client, &config).await;
    info!("worker {} registrado contra {}", worker_id, config.master_url);

    server.await??;
    Ok(())
}

async fn register_until_ok(client: &Client, config: &WorkerConfig) -> WorkerId {
    loop {
        match register(client, config).await {
            Ok(worker_id) => return worker_id,
            Err(e) => {
                warn!(
                    "no se pudo registrar en {}: {:#}. Reintentando en {:?}",
                    config.master_url, e, REGISTER_RETRY_DELAY
                );
                sleep(REGISTER_RETRY_DELAY).await;
            }
        }
    }
}

async fn register(client: &Client, config: &WorkerConfig) -> Result<WorkerId> {
    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let register_url = format!("{}/api/v1/workers/register", config.master_url);
    let res = client
        .post(&register_url)
        .json(&WorkerRegisterRequest {
            hostname,
            address: config.advertise_url.clone(),
        })
        .send()
        .await?
        .error_for_status()?;

    let WorkerRegisterResponse { worker_id } = res.json().await?;
    Ok(worker_id)
}

/* ---------------- RPCs ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn rpc_map(
    State(state): State<WorkerState>,
    Json(args): Json<RunArgs>,
) -> Result<Json<RunReply>, (StatusCode, String)> {
    maybe_inject_failure(state.fail_rate)?;
    info!(
        "map {} del job {} (input={})",
        args.operation_id, args.task.job_id, args.input_path
    );
    let records = run_blocking(move || process_map(&args)).await?;
    Ok(Json(RunReply { records }))
}

async fn rpc_reduce(
    State(state): State<WorkerState>,
    Json(args): Json<RunArgs>,
) -> Result<Json<RunReply>, (StatusCode, String)> {
    maybe_inject_failure(state.fail_rate)?;
    info!(
        "reduce {} del job {} (partición {})",
        args.operation_id, args.task.job_id, args.input_path
    );
    let records = run_blocking(move || process_reduce(&args)).await?;
    Ok(Json(RunReply { records }))
}

fn maybe_inject_failure(fail_rate: f64) -> Result<(), (StatusCode, String)> {
    if fail_rate > 0.0 && rand::random::<f64>() < fail_rate {
        warn!("fallando la RPC a propósito (fail_rate={})", fail_rate);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "falla inyectada".to_string(),
        ));
    }
    Ok(())
}

/// Ejecuta el procesamiento de archivos en un hilo de bloqueo.
async fn run_blocking<F>(f: F) -> Result<usize, (StatusCode, String)>
where
    F: FnOnce() -> Result<usize> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e)) => {
            warn!("error procesando operación: {:#}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))
        }
        Err(e) => {
            warn!("panic o join error en operación: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn process_map(args: &RunArgs) -> Result<usize> {
    mapreduce::run_map(
        &args.task,
        args.operation_id,
        &args.input_path,
        wordcount::map_func,
    )
}

/// En reduce la referencia de entrada es el índice de la partición.
fn process_reduce(args: &RunArgs) -> Result<usize> {
    let reduce_id: usize = args
        .input_path
        .trim()
        .parse()
        .with_context(|| format!("índice de reduce inválido: {:?}", args.input_path))?;
    mapreduce::run_reduce(&args.task, reduce_id, wordcount::reduce_func)
}
