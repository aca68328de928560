use serde::Serialize;

use crate::models::{CoachProfile, SeekerProfile};

pub const EXPERTISE_POINTS: u32 = 30;
pub const INDUSTRY_POINTS: u32 = 20;
pub const LANGUAGE_POINTS: u32 = 15;
pub const EXPERIENCE_POINTS: u32 = 15;
pub const CERTIFICATION_POINTS: u32 = 10;
pub const MAX_SCORE: u32 = 100;
pub const SENIOR_COACH_YEARS: i32 = 5;

pub const EXPERTISE_REASON: &str = "Expertise aligns with your interests and assessment results";
pub const INDUSTRY_REASON: &str = "Coach has experience in target industries";
pub const LANGUAGE_REASON: &str = "Language preferences match";
pub const EXPERIENCE_REASON: &str = "Coach has significant experience";
pub const CERTIFICATION_REASON: &str = "Coach has relevant certifications";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchScore {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl MatchScore {
    pub fn reason_text(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Additive compatibility score between a seeker and a coach. Each rule is
/// checked independently; reasons keep rule order.
pub fn score(seeker: &SeekerProfile, coach: &CoachProfile, assessment_areas: &[String]) -> MatchScore {
    let mut total = 0;
    let mut reasons = Vec::new();
    let mut award = |points: u32, reason: &str| {
        total += points;
        reasons.push(reason.to_string());
    };

    let seeker_focus: Vec<&String> = seeker.interests.iter().chain(assessment_areas).collect();
    if coach
        .expertise
        .iter()
        .any(|tag| seeker_focus.iter().any(|focus| same_tag(tag, focus)))
    {
        award(EXPERTISE_POINTS, EXPERTISE_REASON);
    }

    if overlaps(&coach.industries, &seeker.target_industries) {
        award(INDUSTRY_POINTS, INDUSTRY_REASON);
    }

    if overlaps(&seeker.languages, &coach.languages) {
        award(LANGUAGE_POINTS, LANGUAGE_REASON);
    }

    if coach.years_experience >= SENIOR_COACH_YEARS {
        award(EXPERIENCE_POINTS, EXPERIENCE_REASON);
    }

    if !coach.certifications.is_empty() {
        award(CERTIFICATION_POINTS, CERTIFICATION_REASON);
    }

    MatchScore {
        score: total.min(MAX_SCORE),
        reasons,
    }
}

fn overlaps(left: &[String], right: &[String]) -> bool {
    left.iter().any(|a| right.iter().any(|b| same_tag(a, b)))
}

fn same_tag(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a.eq_ignore_ascii_case(b.trim())
}
