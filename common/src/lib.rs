pub mod job;
pub mod mapreduce;
pub mod results;
pub mod task;
pub mod wordcount;
pub mod worker;

pub use job::{JobId, JobInfo, JobRequest, JobStatus};
pub use mapreduce::KeyValue;
pub use results::{FailedOperation, JobResults, PhaseReport};
pub use task::Task;
pub use worker::{
    RunArgs, RunReply, WorkerId, WorkerMetrics, WorkerRegisterRequest, WorkerRegisterResponse,
    WorkerStatus,
};

/// Nombre del procedimiento remoto de la fase map.
pub const MAP_PROC: &str = "map";
/// Nombre del procedimiento remoto de la fase reduce.
pub const REDUCE_PROC: &str = "reduce";
