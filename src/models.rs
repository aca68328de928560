use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_key: String,
    pub file_type: String,
    pub file_size: i64,
    pub checksum: String,
    pub analyze_status: String,
    pub analyze_results: Option<serde_json::Value>,
    pub analyze_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_key: String,
    pub file_type: String,
    pub file_size: i64,
    pub checksum: String,
    pub analyze_status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = coach_profiles)]
#[diesel(belongs_to(User))]
pub struct CoachProfile {
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = coach_profiles)]
#[diesel(treat_none_as_null = true)]
pub struct CoachProfileChanges {
    pub bio: String,
    pub expertise: Vec<String>,
    pub specialties: Vec<String>,
    pub industries: Vec<String>,
    pub languages: Vec<String>,
    pub certifications: Vec<String>,
    pub years_experience: i32,
    pub hourly_rate: Option<f64>,
    pub availability: Vec<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coach_profiles)]
pub struct NewCoachProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[diesel(embed)]
    pub changes: CoachProfileChanges,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = seeker_profiles)]
#[diesel(belongs_to(User))]
pub struct SeekerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub headline: Option<String>,
    pub interests: Vec<String>,
    pub target_industries: Vec<String>,
    pub languages: Vec<String>,
    pub skills: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = seeker_profiles)]
#[diesel(treat_none_as_null = true)]
pub struct SeekerProfileChanges {
    pub headline: Option<String>,
    pub interests: Vec<String>,
    pub target_industries: Vec<String>,
    pub languages: Vec<String>,
    pub skills: Vec<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = seeker_profiles)]
pub struct NewSeekerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[diesel(embed)]
    pub changes: SeekerProfileChanges,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub status: String,
    pub match_score: i32,
    pub match_reason: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub status: String,
    pub match_score: i32,
    pub match_reason: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = conversations)]
#[diesel(belongs_to(Match))]
pub struct Conversation {
    pub id: Uuid,
    pub match_id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub id: Uuid,
    pub match_id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = messages)]
#[diesel(belongs_to(Conversation))]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = assessment_results)]
pub struct AssessmentResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assessment_type: String,
    pub sections: serde_json::Value,
    pub overall_score: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assessment_results)]
pub struct NewAssessmentResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assessment_type: String,
    pub sections: serde_json::Value,
    pub overall_score: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = service_leases)]
pub struct ServiceLease {
    pub name: String,
    pub holder: Option<Uuid>,
    pub lease_expires_at: Option<NaiveDateTime>,
    pub last_started_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}
