use std::{env, str::FromStr, time::Duration};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_REDUCE_JOBS: usize = 4;
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Configuración del master, leída una vez al arrancar desde variables de entorno.
#[derive(Debug, Clone)]
pub struct Config {
    /// MASTER_BIND_ADDR
    pub bind_addr: String,
    /// DATA_DIR: los jobs escriben en <data_dir>/jobs/<job_id>
    pub data_dir: String,
    /// RPC_TIMEOUT_SECS: sin valor, las llamadas a workers no tienen timeout
    pub rpc_timeout: Option<Duration>,
    /// DEFAULT_REDUCE_JOBS
    pub default_reduce_jobs: usize,
    /// DEFAULT_CHUNK_SIZE, en bytes
    pub default_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            rpc_timeout: None,
            default_reduce_jobs: DEFAULT_REDUCE_JOBS,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("MASTER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_dir: lookup("DATA_DIR").unwrap_or(defaults.data_dir),
            rpc_timeout: parse_opt::<u64>(lookup("RPC_TIMEOUT_SECS"))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            default_reduce_jobs: parse_opt(lookup("DEFAULT_REDUCE_JOBS"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_reduce_jobs),
            default_chunk_size: parse_opt(lookup("DEFAULT_CHUNK_SIZE"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_chunk_size),
        }
    }
}

fn parse_opt<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse::<T>().ok())
}
