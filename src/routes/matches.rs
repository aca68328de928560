use std::collections::HashMap;

use axum::extract::{Json, Path, State};
use chrono::{DateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::Serialize;
use uuid::Uuid;

use super::documents::to_utc;
use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::matching::{resolve_match, run_matching, Decision};
use crate::models::{Match, User};
use crate::notifications::NotificationEvent;
use crate::schema::{conversations, matches, users};
use crate::state::AppState;

#[derive(Serialize)]
pub struct Counterpart {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct MatchResponse {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub status: String,
    pub match_score: i32,
    pub reasons: Vec<String>,
    pub other_user: Option<Counterpart>,
    pub conversation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn other_participant(record: &Match, user_id: Uuid) -> Uuid {
    if record.coach_id == user_id {
        record.seeker_id
    } else {
        record.coach_id
    }
}

fn split_reasons(reason: &str) -> Vec<String> {
    reason
        .split("; ")
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_match_responses(
    conn: &mut PgConnection,
    rows: Vec<Match>,
    viewer: Uuid,
) -> AppResult<Vec<MatchResponse>> {
    let other_ids: Vec<Uuid> = rows.iter().map(|row| other_participant(row, viewer)).collect();
    let people: HashMap<Uuid, User> = users::table
        .filter(users::id.eq_any(&other_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let match_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let conversation_ids: HashMap<Uuid, Uuid> = conversations::table
        .filter(conversations::match_id.eq_any(&match_ids))
        .select((conversations::match_id, conversations::id))
        .load::<(Uuid, Uuid)>(conn)?
        .into_iter()
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| {
            let other_user = people
                .get(&other_participant(&row, viewer))
                .map(|user| Counterpart {
                    id: user.id,
                    name: user.name.clone(),
                    role: user.role.clone(),
                });
            MatchResponse {
                id: row.id,
                coach_id: row.coach_id,
                seeker_id: row.seeker_id,
                status: row.status,
                match_score: row.match_score,
                reasons: split_reasons(&row.match_reason),
                other_user,
                conversation_id: conversation_ids.get(&row.id).copied(),
                created_at: to_utc(row.created_at),
                updated_at: to_utc(row.updated_at),
            }
        })
        .collect())
}

pub async fn run_matches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MatchResponse>>> {
    user.require_role(Role::Seeker)?;
    let mut conn = state.db()?;
    let rows = run_matching(&mut conn, user.user_id)?;
    Ok(Json(to_match_responses(&mut conn, rows, user.user_id)?))
}

pub async fn list_matches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MatchResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Match> = matches::table
        .filter(
            matches::coach_id
                .eq(user.user_id)
                .or(matches::seeker_id.eq(user.user_id)),
        )
        .order((matches::match_score.desc(), matches::created_at.asc()))
        .load(&mut conn)?;
    Ok(Json(to_match_responses(&mut conn, rows, user.user_id)?))
}

pub async fn accept_match(
    state: State<AppState>,
    path: Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<MatchResponse>> {
    decide(state, path, user, Decision::Accept).await
}

pub async fn decline_match(
    state: State<AppState>,
    path: Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<MatchResponse>> {
    decide(state, path, user, Decision::Decline).await
}

async fn decide(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    user: AuthenticatedUser,
    decision: Decision,
) -> AppResult<Json<MatchResponse>> {
    let (response, record) = {
        let mut conn = state.db()?;
        let resolution = resolve_match(&mut conn, match_id, user.user_id, decision)?;
        let record = resolution.record.clone();
        let response = to_match_responses(&mut conn, vec![resolution.record], user.user_id)?
            .pop()
            .ok_or_else(|| AppError::internal("resolved match disappeared"))?;
        (response, record)
    };

    for (recipient, other_user) in [
        (record.coach_id, record.seeker_id),
        (record.seeker_id, record.coach_id),
    ] {
        state
            .notifier
            .publish(
                recipient,
                NotificationEvent::Match {
                    match_id: record.id,
                    status: record.status.clone(),
                    other_user,
                },
            )
            .await;
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_round_trip_through_the_stored_text() {
        assert_eq!(
            split_reasons("Language preferences match; Coach has relevant certifications"),
            vec![
                "Language preferences match".to_string(),
                "Coach has relevant certifications".to_string()
            ]
        );
        assert!(split_reasons("").is_empty());
    }
}
