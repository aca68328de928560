use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    clients::{
        AzureFormRecognizer, AzureOpenAi, AzureTextAnalytics, ChatCompletion, ClientResult,
        DocumentAnalyzer, TextAnalytics,
    },
    config::AppConfig,
    critique::CritiqueGate,
    db::PgPool,
    error::{AppError, AppResult},
    notifications::Notifier,
    storage::ObjectStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Cloud services used by the API and the worker.
#[derive(Clone)]
pub struct ExternalClients {
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub text_analytics: Arc<dyn TextAnalytics>,
    pub chat: Arc<dyn ChatCompletion>,
}

impl ExternalClients {
    pub fn from_config(config: &AppConfig) -> ClientResult<Self> {
        Ok(Self {
            analyzer: Arc::new(AzureFormRecognizer::from_config(config)?),
            text_analytics: Arc::new(AzureTextAnalytics::from_config(config)?),
            chat: Arc::new(AzureOpenAi::from_config(config)?),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub clients: ExternalClients,
    pub critique_gate: Arc<dyn CritiqueGate>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
        clients: ExternalClients,
        critique_gate: Arc<dyn CritiqueGate>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            clients,
            critique_gate,
            notifier: Notifier::new(),
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
