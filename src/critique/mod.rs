//! AI critique of analysed documents.

use std::future::Future;

use axum::http::StatusCode;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clients::{prompts, strip_json_fences},
    error::{AppError, AppResult},
    models::Document,
    schema::documents,
    state::AppState,
    workers::analyze::ANALYZE_COMPLETED,
};

pub mod detect;
pub mod gate;

pub use detect::{detect_document_type, DocumentType};
pub use gate::{
    evaluate, Admission, CritiqueGate, CritiquePermit, GateDecision, GatePolicy, GateSnapshot,
    LocalCritiqueGate, PgCritiqueLease,
};

pub const AI_ANALYSIS_KEY: &str = "ai_analysis";
const CRITIQUE_MAX_TOKENS: u32 = 1500;
const CRITIQUE_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCritique {
    pub critique: Value,
    pub document_type: String,
    pub analyzed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CritiqueOutcome {
    pub document_id: Uuid,
    #[serde(flatten)]
    pub stored: StoredCritique,
    pub cached: bool,
}

/// Returns the stored critique if it is younger than `max_age`.
pub fn cached_critique(
    results: &Value,
    now: NaiveDateTime,
    max_age: Duration,
) -> Option<StoredCritique> {
    let stored: StoredCritique = serde_json::from_value(results.get(AI_ANALYSIS_KEY)?.clone()).ok()?;
    (now - stored.analyzed_at < max_age).then_some(stored)
}

/// The text the analyzer extracted, if any.
pub fn extracted_text(results: &Value) -> Option<&str> {
    results
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Models do not always honour the JSON instruction; plain prose becomes a summary.
pub fn parse_critique(reply: &str) -> Value {
    match serde_json::from_str::<Value>(strip_json_fences(reply)) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "summary": reply.trim() }),
    }
}

fn with_critique(results: Option<Value>, stored: &StoredCritique) -> AppResult<Value> {
    let mut map = match results {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert(AI_ANALYSIS_KEY.to_string(), serde_json::to_value(stored)?);
    Ok(Value::Object(map))
}

pub async fn request_critique(
    state: &AppState,
    document_id: Uuid,
    requester_id: Uuid,
    force: bool,
) -> AppResult<CritiqueOutcome> {
    let document: Document = {
        let mut conn = state.db()?;
        documents::table
            .filter(documents::id.eq(document_id))
            .filter(documents::owner_id.eq(requester_id))
            .first(&mut conn)?
    };

    if document.analyze_status != ANALYZE_COMPLETED {
        return Err(AppError::bad_request("analysis not ready"));
    }

    let results = document.analyze_results.clone().unwrap_or(Value::Null);
    if !force {
        let max_age = Duration::days(state.config.critique_cache_days);
        if let Some(stored) = cached_critique(&results, Utc::now().naive_utc(), max_age) {
            return Ok(CritiqueOutcome {
                document_id,
                stored,
                cached: true,
            });
        }
    }

    let permit = match state.critique_gate.try_acquire().await? {
        Admission::Granted(permit) => permit,
        Admission::Busy { retry_after_secs } => {
            info!(%document_id, retry_after_secs, "critique request throttled");
            return Err(AppError::too_many_requests(retry_after_secs));
        }
    };

    let deadline = GatePolicy::from_config(&state.config).critique_deadline();
    let outcome = within_deadline(deadline, run_critique(state, &document)).await;

    if let Err(err) = state.critique_gate.release(permit).await {
        warn!(%document_id, error = %err, "failed to release critique gate");
    }

    outcome
}

/// Runs a granted critique, failing with 504 once the gate lease could lapse.
async fn within_deadline<T>(
    deadline: std::time::Duration,
    critique: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(deadline, critique).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(deadline_secs = deadline.as_secs(), "critique exceeded its deadline");
            Err(AppError::new(StatusCode::GATEWAY_TIMEOUT, "critique timed out"))
        }
    }
}

/// Writes a merged critique back, but only onto a document whose analysis is
/// still complete. A reanalysis started meanwhile wins.
pub fn store_critique(conn: &mut PgConnection, document_id: Uuid, merged: Value) -> AppResult<()> {
    let updated = diesel::update(
        documents::table
            .find(document_id)
            .filter(documents::analyze_status.eq(ANALYZE_COMPLETED)),
    )
    .set((
        documents::analyze_results.eq(Some(merged)),
        documents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Err(AppError::bad_request("analysis not ready"));
    }
    Ok(())
}

async fn run_critique(state: &AppState, document: &Document) -> AppResult<CritiqueOutcome> {
    let results = document.analyze_results.clone();
    let text = results
        .as_ref()
        .and_then(extracted_text)
        .ok_or_else(|| AppError::bad_request("document has no extracted text"))?;

    let document_type = detect_document_type(&document.file_name, text);
    let messages = prompts::critique_messages(document_type, text);
    let reply = state
        .clients
        .chat
        .complete(&messages, CRITIQUE_MAX_TOKENS, CRITIQUE_TEMPERATURE)
        .await?;

    let stored = StoredCritique {
        critique: parse_critique(&reply),
        document_type: document_type.as_str().to_string(),
        analyzed_at: Utc::now().naive_utc(),
    };
    let merged = with_critique(results, &stored)?;

    let mut conn = state.db()?;
    store_critique(&mut conn, document.id, merged)?;

    info!(document_id = %document.id, document_type = document_type.as_str(), "critique stored");

    Ok(CritiqueOutcome {
        document_id: document.id,
        stored,
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_at(analyzed_at: NaiveDateTime) -> Value {
        json!({
            "content": "resume text",
            "ai_analysis": {
                "critique": { "summary": "solid" },
                "document_type": "resume",
                "analyzed_at": analyzed_at,
            }
        })
    }

    #[test]
    fn fresh_critique_is_served_from_cache() {
        let now = Utc::now().naive_utc();
        let results = stored_at(now - Duration::days(6));
        let cached = cached_critique(&results, now, Duration::days(7)).expect("cached");
        assert_eq!(cached.document_type, "resume");
        assert_eq!(cached.critique["summary"], "solid");
    }

    #[test]
    fn week_old_critique_is_stale() {
        let now = Utc::now().naive_utc();
        assert!(cached_critique(&stored_at(now - Duration::days(7)), now, Duration::days(7)).is_none());
        assert!(cached_critique(&json!({ "content": "x" }), now, Duration::days(7)).is_none());
    }

    #[test]
    fn prose_replies_are_wrapped() {
        assert_eq!(parse_critique("Looks good overall."), json!({ "summary": "Looks good overall." }));
        assert_eq!(
            parse_critique("```json\n{\"overall_score\": 72}\n```"),
            json!({ "overall_score": 72 })
        );
        assert_eq!(parse_critique("[1, 2]"), json!({ "summary": "[1, 2]" }));
    }

    #[test]
    fn critique_is_merged_next_to_extraction_output() {
        let stored = StoredCritique {
            critique: json!({ "summary": "ok" }),
            document_type: "general".into(),
            analyzed_at: Utc::now().naive_utc(),
        };
        let merged = with_critique(Some(json!({ "content": "hello", "pages": [] })), &stored)
            .expect("merge");
        assert_eq!(merged["content"], "hello");
        assert_eq!(merged[AI_ANALYSIS_KEY]["document_type"], "general");
    }

    #[tokio::test(start_paused = true)]
    async fn critique_past_its_deadline_times_out() {
        let slow = async {
            tokio::time::sleep(std::time::Duration::from_secs(600)).await;
            Ok(())
        };
        let err = within_deadline(std::time::Duration::from_secs(295), slow)
            .await
            .expect_err("deadline");
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);

        let quick = async { Ok(7) };
        let value = within_deadline(std::time::Duration::from_secs(1), quick)
            .await
            .expect("in time");
        assert_eq!(value, 7);
    }

    #[test]
    fn blank_content_counts_as_missing() {
        assert_eq!(extracted_text(&json!({ "content": "  text  " })), Some("text"));
        assert_eq!(extracted_text(&json!({ "content": "   " })), None);
        assert_eq!(extracted_text(&json!({})), None);
    }
}
