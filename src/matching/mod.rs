//! Seeker to coach matching.

pub mod lifecycle;
pub mod scoring;

pub use lifecycle::{
    assessment_areas, resolve_match, run_matching, Decision, Resolution, CONVERSATION_ACTIVE,
    MATCH_DECLINED, MATCH_MATCHED, MATCH_PENDING,
};
pub use scoring::{score, MatchScore};
