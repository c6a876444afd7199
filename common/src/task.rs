use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Descriptor de sólo lectura que viaja con cada operación.
/// El dispatcher no lo interpreta: lo usan la función de shuffle y los workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: JobId,

    /// Cantidad de reduce jobs (particiones del shuffle)
    pub num_reduce_jobs: usize,

    /// Directorio de trabajo del job: splits, intermedios y salida final
    pub work_dir: String,
}
