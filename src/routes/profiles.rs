use axum::extract::{Json, State};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::documents::to_utc;
use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::models::{
    CoachProfile, CoachProfileChanges, NewCoachProfile, NewSeekerProfile, SeekerProfile,
    SeekerProfileChanges,
};
use crate::schema::{coach_profiles, seeker_profiles};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CoachProfileRequest {
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub years_experience: i32,
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub availability: Vec<String>,
}

#[derive(Serialize)]
pub struct CoachProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: String,
    pub expertise: Vec<String>,
    pub specialties: Vec<String>,
    pub industries: Vec<String>,
    pub languages: Vec<String>,
    pub certifications: Vec<String>,
    pub years_experience: i32,
    pub hourly_rate: Option<f64>,
    pub availability: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SeekerProfileRequest {
    pub headline: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub target_industries: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Serialize)]
pub struct SeekerProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub headline: Option<String>,
    pub interests: Vec<String>,
    pub target_industries: Vec<String>,
    pub languages: Vec<String>,
    pub skills: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Trims tags, drops blanks and case-insensitive duplicates.
fn clean_tags(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty()
            || cleaned
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(trimmed))
        {
            continue;
        }
        cleaned.push(trimmed.to_string());
    }
    cleaned
}

impl CoachProfileRequest {
    fn into_changes(self) -> AppResult<CoachProfileChanges> {
        if self.years_experience < 0 {
            return Err(AppError::bad_request("years_experience must not be negative"));
        }
        if self.hourly_rate.is_some_and(|rate| !rate.is_finite() || rate < 0.0) {
            return Err(AppError::bad_request("hourly_rate must be a positive number"));
        }
        Ok(CoachProfileChanges {
            bio: self.bio.trim().to_string(),
            expertise: clean_tags(self.expertise),
            specialties: clean_tags(self.specialties),
            industries: clean_tags(self.industries),
            languages: clean_tags(self.languages),
            certifications: clean_tags(self.certifications),
            years_experience: self.years_experience,
            hourly_rate: self.hourly_rate,
            availability: clean_tags(self.availability),
        })
    }
}

impl SeekerProfileRequest {
    fn into_changes(self) -> SeekerProfileChanges {
        SeekerProfileChanges {
            headline: self
                .headline
                .map(|headline| headline.trim().to_string())
                .filter(|headline| !headline.is_empty()),
            interests: clean_tags(self.interests),
            target_industries: clean_tags(self.target_industries),
            languages: clean_tags(self.languages),
            skills: clean_tags(self.skills),
        }
    }
}

impl From<CoachProfile> for CoachProfileResponse {
    fn from(profile: CoachProfile) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            bio: profile.bio,
            expertise: profile.expertise,
            specialties: profile.specialties,
            industries: profile.industries,
            languages: profile.languages,
            certifications: profile.certifications,
            years_experience: profile.years_experience,
            hourly_rate: profile.hourly_rate,
            availability: profile.availability,
            updated_at: to_utc(profile.updated_at),
        }
    }
}

impl From<SeekerProfile> for SeekerProfileResponse {
    fn from(profile: SeekerProfile) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            headline: profile.headline,
            interests: profile.interests,
            target_industries: profile.target_industries,
            languages: profile.languages,
            skills: profile.skills,
            updated_at: to_utc(profile.updated_at),
        }
    }
}

pub async fn get_coach_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<CoachProfileResponse>> {
    user.require_role(Role::Coach)?;
    let mut conn = state.db()?;
    let profile: CoachProfile = coach_profiles::table
        .filter(coach_profiles::user_id.eq(user.user_id))
        .first(&mut conn)?;
    Ok(Json(profile.into()))
}

pub async fn upsert_coach_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CoachProfileRequest>,
) -> AppResult<Json<CoachProfileResponse>> {
    user.require_role(Role::Coach)?;
    let changes = payload.into_changes()?;
    let mut conn = state.db()?;

    let profile: CoachProfile = diesel::insert_into(coach_profiles::table)
        .values(&NewCoachProfile {
            id: Uuid::new_v4(),
            user_id: user.user_id,
            changes: changes.clone(),
        })
        .on_conflict(coach_profiles::user_id)
        .do_update()
        .set((&changes, coach_profiles::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)?;

    info!(user_id = %user.user_id, "coach profile saved");
    Ok(Json(profile.into()))
}

pub async fn get_seeker_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SeekerProfileResponse>> {
    user.require_role(Role::Seeker)?;
    let mut conn = state.db()?;
    let profile: SeekerProfile = seeker_profiles::table
        .filter(seeker_profiles::user_id.eq(user.user_id))
        .first(&mut conn)?;
    Ok(Json(profile.into()))
}

pub async fn upsert_seeker_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SeekerProfileRequest>,
) -> AppResult<Json<SeekerProfileResponse>> {
    user.require_role(Role::Seeker)?;
    let changes = payload.into_changes();
    let mut conn = state.db()?;

    let profile: SeekerProfile = diesel::insert_into(seeker_profiles::table)
        .values(&NewSeekerProfile {
            id: Uuid::new_v4(),
            user_id: user.user_id,
            changes: changes.clone(),
        })
        .on_conflict(seeker_profiles::user_id)
        .do_update()
        .set((&changes, seeker_profiles::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)?;

    info!(user_id = %user.user_id, "seeker profile saved");
    Ok(Json(profile.into()))
}
