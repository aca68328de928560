use axum::extract::{Json, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::documents::to_utc;
use crate::auth::AuthenticatedUser;
use crate::clients::{openai::complete_json, prompts};
use crate::error::{AppError, AppResult};
use crate::models::{AssessmentResult, NewAssessmentResult};
use crate::schema::assessment_results;
use crate::state::AppState;

const MAX_QUESTIONS: u32 = 30;

#[derive(Deserialize)]
pub struct GenerateAssessmentRequest {
    pub assessment_type: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default = "default_assessment_questions")]
    pub question_count: u32,
}

fn default_assessment_questions() -> u32 {
    10
}

#[derive(Deserialize)]
pub struct InterviewQuestionsRequest {
    pub role: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_interview_questions")]
    pub question_count: u32,
}

fn default_level() -> String {
    "mid-level".to_string()
}

fn default_interview_questions() -> u32 {
    5
}

#[derive(Deserialize)]
pub struct SubmitAssessmentRequest {
    pub assessment_type: String,
    pub sections: Vec<Value>,
}

#[derive(Serialize)]
pub struct AssessmentResultResponse {
    pub id: Uuid,
    pub assessment_type: String,
    pub sections: Value,
    pub overall_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<AssessmentResult> for AssessmentResultResponse {
    fn from(result: AssessmentResult) -> Self {
        Self {
            id: result.id,
            assessment_type: result.assessment_type,
            sections: result.sections,
            overall_score: result.overall_score,
            created_at: to_utc(result.created_at),
        }
    }
}

/// Mean of the numeric section scores, clamped to 0..=100.
pub fn overall_score(sections: &[Value]) -> Option<i32> {
    let scores: Vec<f64> = sections
        .iter()
        .filter_map(|section| section.get("score").and_then(Value::as_f64))
        .collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some(mean.round().clamp(0.0, 100.0) as i32)
}

fn require_text<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(trimmed)
}

pub async fn generate_assessment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GenerateAssessmentRequest>,
) -> AppResult<Json<Value>> {
    let assessment_type = require_text(&payload.assessment_type, "assessment_type")?;
    let count = payload.question_count.clamp(1, MAX_QUESTIONS);
    let messages = prompts::assessment_messages(assessment_type, &payload.focus_areas, count);

    let generated: Value = complete_json(state.clients.chat.as_ref(), &messages, 2000, 0.7).await?;
    info!(user_id = %user.user_id, assessment_type, "assessment generated");
    Ok(Json(generated))
}

pub async fn interview_questions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<InterviewQuestionsRequest>,
) -> AppResult<Json<Value>> {
    let role = require_text(&payload.role, "role")?;
    let level = require_text(&payload.level, "level")?;
    let count = payload.question_count.clamp(1, MAX_QUESTIONS);
    let messages = prompts::interview_messages(role, level, count);

    let generated: Value = complete_json(state.clients.chat.as_ref(), &messages, 1500, 0.7).await?;
    info!(user_id = %user.user_id, role, "interview questions generated");
    Ok(Json(generated))
}

pub async fn submit_assessment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SubmitAssessmentRequest>,
) -> AppResult<(StatusCode, Json<AssessmentResultResponse>)> {
    let assessment_type = require_text(&payload.assessment_type, "assessment_type")?;
    if payload.sections.is_empty() {
        return Err(AppError::bad_request("at least one section is required"));
    }

    let record = NewAssessmentResult {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        assessment_type: assessment_type.to_string(),
        overall_score: overall_score(&payload.sections),
        sections: Value::Array(payload.sections),
    };

    let mut conn = state.db()?;
    let saved: AssessmentResult = diesel::insert_into(assessment_results::table)
        .values(&record)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(saved.into())))
}

pub async fn latest_assessment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<AssessmentResultResponse>> {
    let mut conn = state.db()?;
    let latest: AssessmentResult = assessment_results::table
        .filter(assessment_results::user_id.eq(user.user_id))
        .order(assessment_results::created_at.desc())
        .first(&mut conn)?;
    Ok(Json(latest.into()))
}
