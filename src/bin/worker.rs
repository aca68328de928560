use std::sync::Arc;

use tokio::signal;

use jobcoach::{build_state, config::AppConfig, default_handlers, init_tracing, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 2,
        form_recognizer_enabled = config.form_recognizer_endpoint.is_some(),
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );

    let state = Arc::new(build_state(config, 2).await?);
    let worker = Worker::new(state, default_handlers());

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}
