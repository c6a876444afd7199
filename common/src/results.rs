use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Operación que siguió fallando después del último reintento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOperation {
    pub id: usize,
    pub input_path: String,
}

/// Resultado de una fase completa (ronda inicial + reintentos).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub proc: String,
    /// Operaciones creadas en la ronda inicial. No descuenta las fallidas.
    pub total: usize,
    pub succeeded: usize,
    /// Rondas de reintento que llegaron a ejecutarse (0..=3)
    pub retry_rounds: usize,
    pub failed: Vec<FailedOperation>,
}

impl PhaseReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub job_id: JobId,
    /// Directorio de trabajo del job
    pub work_dir: String,
    /// Archivo final con "clave,valor" por línea, si el job terminó bien
    pub output_file: Option<String>,
    /// Archivos de salida de los reduce jobs dentro de work_dir
    pub files: Vec<String>,
}
