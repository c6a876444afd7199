mod config;
mod dispatcher;
mod executor;
mod handlers;
mod job_runner;
mod ledger;
mod monitor;
mod operation;
mod pool;
mod rpc;
mod state;

use crate::config::Config;
use crate::rpc::HttpInvoker;
use crate::state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,common=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    info!("configuración: {:?}", config);

    let invoker = Arc::new(HttpInvoker::new(config.rpc_timeout)?);
    let (state, retired_rx) = AppState::new(config.clone(), invoker);

    // supervisor de workers retirados en segundo plano
    tokio::spawn(monitor::supervise_retired(state.clone(), retired_rx));

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
