use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{RunArgs, Task, WorkerId};
use reqwest::Client;
use tracing::debug;

use crate::operation::Operation;

/// Handle de un worker remoto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWorker {
    pub id: WorkerId,
    /// URL base del worker, ej: "http://worker-1:9090"
    pub address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("error de transporte llamando a {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("el worker respondió {status} en {url}: {body}")]
    Remote {
        url: String,
        status: u16,
        body: String,
    },
}

/// Transporte de las llamadas a workers.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn call(&self, worker: &RemoteWorker, proc: &str, args: &RunArgs) -> Result<(), RpcError>;
}

/// Llama a `POST {address}/rpc/{proc}` con los argumentos en JSON.
/// Cualquier status que no sea 2xx cuenta como error remoto.
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl WorkerInvoker for HttpInvoker {
    async fn call(&self, worker: &RemoteWorker, proc: &str, args: &RunArgs) -> Result<(), RpcError> {
        let url = format!("{}/rpc/{}", worker.address.trim_end_matches('/'), proc);

        let resp = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|source| RpcError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if status.is_success() {
            // la respuesta no se usa
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(RpcError::Remote {
            url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Invoca una operación en un worker. Sin reintentos ni manejo del pool:
/// eso lo decide quien llama.
#[derive(Clone)]
pub struct RemoteWorkerProxy {
    invoker: Arc<dyn WorkerInvoker>,
    task: Task,
}

impl RemoteWorkerProxy {
    pub fn new(invoker: Arc<dyn WorkerInvoker>, task: Task) -> Self {
        Self { invoker, task }
    }

    pub async fn invoke(
        &self,
        worker: &RemoteWorker,
        proc: &str,
        operation: &Operation,
    ) -> Result<(), RpcError> {
        debug!(
            "{} (ID: '{}' Input: '{}' Worker: '{}')",
            proc, operation.id, operation.input_path, worker.id
        );

        let args = RunArgs {
            operation_id: operation.id,
            input_path: operation.input_path.clone(),
            task: self.task.clone(),
        };
        self.invoker.call(worker, proc, &args).await
    }
}
