use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::results::PhaseReport;

pub type JobId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,

    /// Archivo de entrada, visible para master y workers
    pub input_path: String,

    /// Particiones del shuffle. Si no viene, el master usa su default.
    pub num_reduce_jobs: Option<usize>,

    /// Tamaño aproximado (bytes) de cada split de entrada
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Mapping,
    Reducing,
    Failed,
    Succeeded,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,

    pub input_path: String,
    pub work_dir: String,
    pub num_reduce_jobs: usize,

    /// -------- Métricas del job --------
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub map_phase: Option<PhaseReport>,
    pub reduce_phase: Option<PhaseReport>,

    /// Motivo del fallo, si lo hubo
    pub error: Option<String>,
}
