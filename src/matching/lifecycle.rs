use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::scoring::score;
use crate::{
    error::{AppError, AppResult},
    models::{
        AssessmentResult, CoachProfile, Conversation, Match, NewConversation, NewMatch,
        SeekerProfile,
    },
    schema::{assessment_results, coach_profiles, conversations, matches, seeker_profiles},
};

pub const MATCH_PENDING: &str = "pending";
pub const MATCH_MATCHED: &str = "matched";
pub const MATCH_DECLINED: &str = "declined";
pub const CONVERSATION_ACTIVE: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    fn target_status(self) -> &'static str {
        match self {
            Decision::Accept => MATCH_MATCHED,
            Decision::Decline => MATCH_DECLINED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: Match,
    pub conversation: Option<Conversation>,
}

/// Section names of the user's most recent assessment.
pub fn assessment_areas(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<String>> {
    let latest: Option<AssessmentResult> = assessment_results::table
        .filter(assessment_results::user_id.eq(user_id))
        .order(assessment_results::created_at.desc())
        .first(conn)
        .optional()?;

    Ok(latest
        .map(|result| section_names(&result.sections))
        .unwrap_or_default())
}

pub(crate) fn section_names(sections: &Value) -> Vec<String> {
    sections
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|section| section.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Scores the seeker against every coach and records pairs that scored above
/// zero. New pairs start pending; pending pairs get a fresh score; resolved
/// pairs are left alone. A pending pair that now scores zero is withdrawn.
pub fn run_matching(conn: &mut PgConnection, seeker_id: Uuid) -> AppResult<Vec<Match>> {
    let seeker: SeekerProfile = seeker_profiles::table
        .filter(seeker_profiles::user_id.eq(seeker_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("complete your seeker profile before matching"))?;

    let areas = assessment_areas(conn, seeker_id)?;
    let coaches: Vec<CoachProfile> = coach_profiles::table
        .filter(coach_profiles::user_id.ne(seeker_id))
        .load(conn)?;

    let mut scored = 0usize;
    let mut withdrawn = 0usize;
    for coach in &coaches {
        let result = score(&seeker, coach, &areas);
        if result.score == 0 {
            withdrawn += withdraw_pending_match(conn, coach.user_id, seeker_id)?;
            continue;
        }
        upsert_match(
            conn,
            coach.user_id,
            seeker_id,
            result.score as i32,
            &result.reason_text(),
        )?;
        scored += 1;
    }

    info!(%seeker_id, coaches = coaches.len(), scored, withdrawn, "matching run finished");

    let rows = matches::table
        .filter(matches::seeker_id.eq(seeker_id))
        .order((matches::match_score.desc(), matches::created_at.asc()))
        .load(conn)?;
    Ok(rows)
}

fn withdraw_pending_match(
    conn: &mut PgConnection,
    coach_id: Uuid,
    seeker_id: Uuid,
) -> QueryResult<usize> {
    diesel::delete(
        matches::table
            .filter(matches::coach_id.eq(coach_id))
            .filter(matches::seeker_id.eq(seeker_id))
            .filter(matches::status.eq(MATCH_PENDING)),
    )
    .execute(conn)
}

fn upsert_match(
    conn: &mut PgConnection,
    coach_id: Uuid,
    seeker_id: Uuid,
    match_score: i32,
    match_reason: &str,
) -> QueryResult<()> {
    conn.transaction(|conn| {
        let existing: Option<Match> = matches::table
            .filter(matches::coach_id.eq(coach_id))
            .filter(matches::seeker_id.eq(seeker_id))
            .for_update()
            .first(conn)
            .optional()?;

        match existing {
            None => {
                let new_match = NewMatch {
                    id: Uuid::new_v4(),
                    coach_id,
                    seeker_id,
                    status: MATCH_PENDING.to_string(),
                    match_score,
                    match_reason: match_reason.to_string(),
                };
                diesel::insert_into(matches::table)
                    .values(&new_match)
                    .on_conflict((matches::coach_id, matches::seeker_id))
                    .do_nothing()
                    .execute(conn)?;
            }
            Some(record) if record.status == MATCH_PENDING => {
                diesel::update(matches::table.find(record.id))
                    .set((
                        matches::match_score.eq(match_score),
                        matches::match_reason.eq(match_reason),
                        matches::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
            }
            Some(_) => {}
        }
        Ok(())
    })
}

/// Moves a pending match to matched or declined. Only participants may
/// resolve a match; accepting opens its conversation in the same transaction.
pub fn resolve_match(
    conn: &mut PgConnection,
    match_id: Uuid,
    user_id: Uuid,
    decision: Decision,
) -> AppResult<Resolution> {
    conn.transaction::<_, AppError, _>(|conn| {
        let record: Match = matches::table.find(match_id).for_update().first(conn)?;

        if record.coach_id != user_id && record.seeker_id != user_id {
            return Err(AppError::not_found());
        }

        if record.status != MATCH_PENDING {
            return Err(AppError::conflict(format!(
                "match is already {}",
                record.status
            )));
        }

        let now = Utc::now().naive_utc();
        let record: Match = diesel::update(matches::table.find(record.id))
            .set((
                matches::status.eq(decision.target_status()),
                matches::updated_at.eq(now),
            ))
            .get_result(conn)?;

        let conversation = match decision {
            Decision::Accept => {
                let new_conversation = NewConversation {
                    id: Uuid::new_v4(),
                    match_id: record.id,
                    coach_id: record.coach_id,
                    seeker_id: record.seeker_id,
                    status: CONVERSATION_ACTIVE.to_string(),
                };
                let conversation: Conversation = diesel::insert_into(conversations::table)
                    .values(&new_conversation)
                    .get_result(conn)?;
                Some(conversation)
            }
            Decision::Decline => None,
        };

        info!(%match_id, status = %record.status, "match resolved");
        Ok(Resolution {
            record,
            conversation,
        })
    })
}
