use serde::{Deserialize, Serialize};

use crate::task::Task;

pub type WorkerId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub hostname: String,
    /// URL base en la que el worker atiende RPCs, ej: "http://worker-1:9090"
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub worker_id: WorkerId,
}

/// Argumentos de `POST /rpc/{proc}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArgs {
    pub operation_id: usize,
    /// Referencia de entrada: ruta del split (map) o índice del reduce job (reduce)
    pub input_path: String,
    pub task: Task,
}

/// Respuesta del worker. El master sólo mira si la llamada tuvo éxito.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReply {
    pub records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Retired,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerMetrics {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub address: String,
    pub status: WorkerStatus,
    pub registered_secs_ago: u64,
}
