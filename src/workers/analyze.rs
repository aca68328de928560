use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, ensure, Context};
use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{JobExecution, JobHandler};
use crate::{
    clients::{AnalysisModel, AnalyzeResult},
    jobs::{JOB_ANALYZE_DOCUMENT, MAX_ATTEMPTS},
    models::{Document, Job},
    schema::documents,
    state::AppState,
};

pub const ANALYZE_PENDING: &str = "pending";
pub const ANALYZE_RUNNING: &str = "analyzing";
pub const ANALYZE_COMPLETED: &str = "completed";
pub const ANALYZE_FAILED: &str = "failed";

#[derive(Debug, Deserialize)]
struct AnalyzePayload {
    document_id: Uuid,
}

pub struct AnalyzeDocumentJob;

impl AnalyzeDocumentJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnalyzeDocumentJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for AnalyzeDocumentJob {
    fn job_type(&self) -> &'static str {
        JOB_ANALYZE_DOCUMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: AnalyzePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid analyze payload: {err}"),
                }
            }
        };
        let document_id = payload.document_id;

        let document = match blocking(&state, move |conn| {
            documents::table.find(document_id).first::<Document>(conn).optional()
        })
        .await
        {
            Ok(Some(document)) => document,
            Ok(None) => {
                return JobExecution::Failed {
                    error: format!("document {document_id} no longer exists"),
                }
            }
            Err(err) => return retry(&job, err),
        };

        if job.attempts > MAX_ATTEMPTS {
            let message = format!("analysis abandoned after {} attempts", job.attempts - 1);
            if let Err(err) = finish(&state, document_id, Err(message.clone())).await {
                error!(%document_id, error = %err, "failed to record abandoned analysis");
            }
            return JobExecution::Failed { error: message };
        }

        if let Err(err) = blocking(&state, move |conn| mark_analyzing(conn, document_id)).await {
            return retry(&job, err);
        }

        let outcome = extract(&state, &document)
            .await
            .map_err(|err| format!("{err:#}"));
        let failure = outcome.as_ref().err().cloned();

        if let Err(err) = finish(&state, document_id, outcome).await {
            return retry(&job, err);
        }

        match failure {
            None => {
                info!(%document_id, "document analysis completed");
                JobExecution::Success
            }
            Some(error) => {
                warn!(%document_id, %error, "document analysis failed");
                JobExecution::Failed { error }
            }
        }
    }
}

fn retry(job: &Job, error: String) -> JobExecution {
    JobExecution::Retry {
        delay: Duration::from_secs(15 * job.attempts.max(1) as u64),
        error,
    }
}

async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, String>
where
    F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    task::spawn_blocking(move || {
        let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
        f(&mut conn).map_err(|err| err.to_string())
    })
    .await
    .map_err(|join_err| format!("analysis task panicked: {join_err}"))?
}

fn mark_analyzing(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<usize> {
    diesel::update(documents::table.find(document_id))
        .set((
            documents::analyze_status.eq(ANALYZE_RUNNING),
            documents::analyze_error.eq::<Option<String>>(None),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

/// Writes the terminal status. Failures always carry a non-empty message.
async fn finish(
    state: &Arc<AppState>,
    document_id: Uuid,
    outcome: Result<AnalyzeResult, String>,
) -> Result<(), String> {
    let (status, results, message) = match outcome {
        Ok(result) => {
            let value = serde_json::to_value(result).map_err(|err| err.to_string())?;
            (ANALYZE_COMPLETED, Some(value), None)
        }
        Err(message) => {
            let message = if message.trim().is_empty() {
                "document analysis failed".to_string()
            } else {
                message
            };
            (ANALYZE_FAILED, None::<Value>, Some(message))
        }
    };

    blocking(state, move |conn| {
        diesel::update(documents::table.find(document_id))
            .set((
                documents::analyze_status.eq(status),
                documents::analyze_results.eq(results),
                documents::analyze_error.eq(message),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)
    })
    .await
    .map(|_| ())
}

pub(crate) fn is_plain_text(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".txt")
}

async fn extract(state: &AppState, document: &Document) -> anyhow::Result<AnalyzeResult> {
    let exists = state
        .storage
        .object_exists(&document.file_key)
        .await
        .context("failed to check stored file")?;
    ensure!(exists, "uploaded file is missing from storage");

    if is_plain_text(&document.file_name) {
        let bytes = state
            .storage
            .get_object(&document.file_key)
            .await
            .context("failed to read stored file")?;
        return Ok(AnalyzeResult {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            ..AnalyzeResult::default()
        });
    }

    let ttl = Duration::from_secs(state.config.signed_url_ttl_minutes * 60);
    let url = state
        .storage
        .presign_get_object(&document.file_key, ttl)
        .await
        .context("failed to sign file URL")?;

    let model = AnalysisModel::for_file_name(&document.file_name);
    state
        .clients
        .analyzer
        .analyze(&url, model)
        .await
        .map_err(|err| anyhow!("{} analysis failed: {err}", model.model_id()))
}
