use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{JobInfo, JobRequest, JobResults, PhaseReport, WorkerMetrics};
use reqwest::{Client, Response};
use std::{env, time::Duration};
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Debug, Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Commands {
    /// Envía un job de wordcount sobre un archivo de entrada
    Submit {
        #[arg(value_name = "NOMBRE")]
        name: String,

        /// Ruta del archivo (tiene que verla el master y los workers)
        #[arg(value_name = "INPUT")]
        input: String,

        /// Cantidad de particiones de reduce
        #[arg(long)]
        reduce_jobs: Option<usize>,

        /// Tamaño aproximado de cada split, en bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Espera a que el job termine
        #[arg(long)]
        wait: bool,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista los archivos de salida de un job
    Results {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista los workers registrados
    Workers,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit {
            name,
            input,
            reduce_jobs,
            chunk_size,
            wait,
        } => {
            let url = format!("{}/api/v1/jobs", base_url);
            let req = JobRequest {
                name,
                input_path: input,
                num_reduce_jobs: reduce_jobs,
                chunk_size,
            };

            let resp = check(client.post(&url).json(&req).send().await?).await?;
            let job_info: JobInfo = resp.json().await?;

            println!("Job creado:");
            print_job(&job_info);

            if wait {
                let job = wait_for_job(&client, &base_url, &job_info.id).await?;
                println!();
                println!("Job terminado:");
                print_job(&job);
            }
        }

        Commands::Status { id } => {
            let job = fetch_job(&client, &base_url, &id).await?;
            println!("Job:");
            print_job(&job);
        }

        Commands::Results { id } => {
            let url = format!("{}/api/v1/jobs/{id}/results", base_url);
            let resp = check(client.get(&url).send().await?).await?;
            let results: JobResults = resp.json().await?;

            println!("Resultados para job {}:", results.job_id);
            println!("  directorio de trabajo: {}", results.work_dir);
            match results.output_file {
                Some(ref f) => println!("  resultado final: {}", f),
                None => println!("  resultado final: (todavía no hay)"),
            }
            if results.files.is_empty() {
                println!("  (sin archivos de salida)");
            } else {
                println!("  archivos:");
                for f in results.files {
                    println!("    - {}", f);
                }
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = check(client.get(&url).send().await?).await?;
            let workers: Vec<WorkerMetrics> = resp.json().await?;
            if workers.is_empty() {
                println!("No hay workers registrados.");
            } else {
                for w in workers {
                    println!("Worker {}", w.worker_id);
                    println!("  host       : {}", w.hostname);
                    println!("  address    : {}", w.address);
                    println!("  estado     : {:?}", w.status);
                    println!("  registrado : hace {} s", w.registered_secs_ago);
                    println!();
                }
            }
        }
    }

    Ok(())
}

/// Corta con el mensaje del master si la respuesta no es 2xx.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("el master respondió {}: {}", status, body)
}

async fn fetch_job(client: &Client, base_url: &str, id: &str) -> Result<JobInfo> {
    let url = format!("{}/api/v1/jobs/{id}", base_url);
    let resp = check(client.get(&url).send().await?).await?;
    Ok(resp.json().await?)
}

async fn wait_for_job(client: &Client, base_url: &str, id: &str) -> Result<JobInfo> {
    loop {
        let job = fetch_job(client, base_url, id).await?;
        if job.status.is_finished() {
            return Ok(job);
        }
        sleep(POLL_INTERVAL).await;
    }
}

fn print_job(job: &JobInfo) {
    println!("  id: {}", job.id);
    println!("  nombre: {}", job.name);
    println!("  estado: {:?}", job.status);
    println!("  input: {}", job.input_path);
    println!("  reduce_jobs: {}", job.num_reduce_jobs);
    println!("  work_dir: {}", job.work_dir);
    println!("  submitted_at: {}", job.submitted_at);
    if let Some(ref started) = job.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(ref done) = job.finished_at {
        println!("  finalizado: {}", done);
    }
    for phase in [&job.map_phase, &job.reduce_phase].into_iter().flatten() {
        println!("  {}", phase_summary(phase));
    }
    if let Some(ref err) = job.error {
        println!("  error: {}", err);
    }
}

fn phase_summary(phase: &PhaseReport) -> String {
    let mut line = format!(
        "fase {}: total={}, ok={}, reintentos={}",
        phase.proc, phase.total, phase.succeeded, phase.retry_rounds
    );
    if !phase.failed.is_empty() {
        let ids: Vec<String> = phase.failed.iter().map(|f| f.id.to_string()).collect();
        line.push_str(&format!(", perdidas=[{}]", ids.join(",")));
    }
    line
}
