use axum::extract::{Json, State};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::critique::extracted_text;
use crate::error::AppResult;
use crate::insights::{
    analyze_content, generate_job_recommendations, CandidateProfile, ContentAnalysis,
    JobRecommendation,
};
use crate::models::Document;
use crate::schema::{documents, seeker_profiles};
use crate::state::AppState;
use crate::workers::analyze::ANALYZE_COMPLETED;

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub source_document_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub analysis: Option<ContentAnalysis>,
    pub recommendations: Vec<JobRecommendation>,
}

fn merge_skills(profile_skills: Vec<String>, extracted: &[String]) -> Vec<String> {
    let mut merged = profile_skills;
    for skill in extracted {
        if !merged.iter().any(|known| known.eq_ignore_ascii_case(skill)) {
            merged.push(skill.clone());
        }
    }
    merged
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<RecommendationsResponse>> {
    user.require_role(Role::Seeker)?;

    let (profile_skills, latest) = {
        let mut conn = state.db()?;
        let profile_skills: Vec<String> = seeker_profiles::table
            .filter(seeker_profiles::user_id.eq(user.user_id))
            .select(seeker_profiles::skills)
            .first(&mut conn)
            .optional()?
            .unwrap_or_default();
        let latest: Option<Document> = documents::table
            .filter(documents::owner_id.eq(user.user_id))
            .filter(documents::analyze_status.eq(ANALYZE_COMPLETED))
            .order(documents::updated_at.desc())
            .first(&mut conn)
            .optional()?;
        (profile_skills, latest)
    };

    let text = latest
        .as_ref()
        .and_then(|doc| doc.analyze_results.as_ref())
        .and_then(extracted_text);

    let analysis = match text {
        Some(text) => Some(analyze_content(text, state.clients.text_analytics.as_ref()).await),
        None => None,
    };

    let skills = merge_skills(
        profile_skills,
        analysis.as_ref().map(|a| a.skills.as_slice()).unwrap_or_default(),
    );
    let recommendations = generate_job_recommendations(&CandidateProfile {
        skills: skills.clone(),
    });

    Ok(Json(RecommendationsResponse {
        source_document_id: latest.map(|doc| doc.id),
        skills,
        analysis,
        recommendations,
    }))
}
