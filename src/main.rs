use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use jobcoach::{
    build_state, config::AppConfig, db, default_handlers, init_tracing, routes, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        form_recognizer_enabled = config.form_recognizer_endpoint.is_some(),
        language_enabled = config.language_endpoint.is_some(),
        openai_enabled = config.openai_endpoint.is_some(),
        critique_gate_local = config.critique_gate_local,
        run_worker_in_process = config.run_worker_in_process,
        "loaded configuration"
    );

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let pool_size = config.database_max_pool_size;
    let state = build_state(config, pool_size).await?;

    let applied = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || db::run_migrations(&pool)
    })
    .await
    .context("migration task panicked")??;
    info!(applied, "database migrations applied");

    if state.config.run_worker_in_process {
        let worker = Worker::new(Arc::new(state.clone()), default_handlers());
        tokio::spawn(async move { worker.run().await });
    } else {
        warn!("in-process worker disabled; run the worker binary to process analysis jobs");
    }

    let app = routes::create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
