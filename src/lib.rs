pub mod auth;
pub mod clients;
pub mod config;
pub mod critique;
pub mod db;
pub mod error;
pub mod insights;
pub mod jobs;
pub mod matching;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod workers;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use workers::{default_handlers, Worker};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    critique::{CritiqueGate, GatePolicy, LocalCritiqueGate, PgCritiqueLease},
    state::{AppState, ExternalClients},
    storage::S3Storage,
};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Wires storage, cloud clients and the critique gate for a process.
pub async fn build_state(config: AppConfig, pool_size: u32) -> anyhow::Result<AppState> {
    let pool = db::init_pool_with_size(&config.database_url, pool_size)?;
    let storage = Arc::new(S3Storage::connect(&config).await?);
    let jwt = JwtService::from_config(&config)?;
    let clients = ExternalClients::from_config(&config)?;

    let policy = GatePolicy::from_config(&config);
    let critique_gate: Arc<dyn CritiqueGate> = if config.critique_gate_local {
        Arc::new(LocalCritiqueGate::new(policy))
    } else {
        Arc::new(PgCritiqueLease::new(pool.clone(), policy))
    };

    Ok(AppState::new(
        pool,
        config,
        storage,
        jwt,
        clients,
        critique_gate,
    ))
}
