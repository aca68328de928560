use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MAX_RECOMMENDATIONS: usize = 5;
const BASE_SCORE: u32 = 80;
const SCORE_PER_EXTRA_SKILL: u32 = 5;
const MAX_SCORE: u32 = 100;

/// Skill to job-title lookup. Keys are lowercase vocabulary terms.
const SKILL_JOB_TITLES: &[(&str, &[&str])] = &[
    ("javascript", &["Frontend Developer", "Full Stack Developer"]),
    ("typescript", &["Frontend Developer", "Full Stack Developer"]),
    ("python", &["Data Analyst", "Backend Developer", "Machine Learning Engineer"]),
    ("java", &["Backend Developer", "Software Engineer"]),
    ("c++", &["Systems Engineer", "Software Engineer"]),
    ("c#", &["Software Engineer", ".NET Developer"]),
    ("golang", &["Backend Developer", "Platform Engineer"]),
    ("rust", &["Systems Engineer", "Backend Developer"]),
    ("sql", &["Data Analyst", "Database Administrator"]),
    ("react", &["Frontend Developer", "Full Stack Developer"]),
    ("angular", &["Frontend Developer"]),
    ("vue", &["Frontend Developer"]),
    ("node.js", &["Backend Developer", "Full Stack Developer"]),
    ("django", &["Backend Developer"]),
    ("spring", &["Backend Developer"]),
    ("aws", &["Cloud Engineer", "DevOps Engineer"]),
    ("azure", &["Cloud Engineer", "DevOps Engineer"]),
    ("docker", &["DevOps Engineer", "Platform Engineer"]),
    ("kubernetes", &["DevOps Engineer", "Platform Engineer"]),
    ("machine learning", &["Machine Learning Engineer", "Data Scientist"]),
    ("leadership", &["Team Lead", "Engineering Manager"]),
    ("communication", &["Customer Success Manager", "Technical Writer"]),
    ("teamwork", &["Project Coordinator"]),
    ("project management", &["Project Manager", "Program Manager"]),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecommendation {
    pub title: String,
    pub match_score: u32,
    pub reason: String,
}

/// Maps skills to job titles and scores each title by how many of the
/// candidate's skills support it: 80 for one skill, +5 per additional skill,
/// capped at 100. Output is sorted by score, then title.
pub fn generate_job_recommendations(profile: &CandidateProfile) -> Vec<JobRecommendation> {
    let mut supporting: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();

    for skill in &profile.skills {
        let normalized = skill.trim().to_lowercase();
        let Some((_, titles)) = SKILL_JOB_TITLES
            .iter()
            .find(|(key, _)| *key == normalized.as_str())
        else {
            continue;
        };
        for title in titles.iter() {
            let entry = supporting.entry(*title).or_default();
            if !entry.contains(&normalized) {
                entry.push(normalized.clone());
            }
        }
    }

    let mut recommendations: Vec<JobRecommendation> = supporting
        .into_iter()
        .map(|(title, skills)| JobRecommendation {
            title: title.to_string(),
            match_score: score_for(skills.len()),
            reason: format!("Matches your skills in {}", skills.join(", ")),
        })
        .collect();

    recommendations.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then_with(|| a.title.cmp(&b.title))
    });
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

fn score_for(supporting_skills: usize) -> u32 {
    let extra = supporting_skills.saturating_sub(1) as u32;
    (BASE_SCORE + SCORE_PER_EXTRA_SKILL * extra).min(MAX_SCORE)
}
