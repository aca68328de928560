use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clients::{SentimentResult, TextAnalytics};

pub const MAX_SKILLS: usize = 8;

/// Skills recognised in free text, matched case-insensitively as substrings.
pub const SKILL_VOCABULARY: &[&str] = &[
    "javascript",
    "typescript",
    "python",
    "java",
    "c++",
    "c#",
    "golang",
    "rust",
    "sql",
    "react",
    "angular",
    "vue",
    "node.js",
    "django",
    "spring",
    "aws",
    "azure",
    "docker",
    "kubernetes",
    "git",
    "machine learning",
    "leadership",
    "communication",
    "teamwork",
    "project management",
];

const EXPERIENCE_KEYWORDS: &[&str] = &["experience", "year", "work"];
const EDUCATION_KEYWORDS: &[&str] = &["degree", "university", "education"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub skills: Vec<String>,
    pub experience: Vec<String>,
    pub education: Vec<String>,
    pub sentiment: SentimentResult,
}

pub async fn analyze_content(text: &str, analytics: &dyn TextAnalytics) -> ContentAnalysis {
    let skills = extract_skills(text);

    let key_phrases = match analytics.key_phrases(text).await {
        Ok(phrases) => phrases,
        Err(err) => {
            warn!(error = %err, "key phrase extraction failed; continuing without phrases");
            Vec::new()
        }
    };

    let sentiment = match analytics.sentiment(text).await {
        Ok(sentiment) => sentiment,
        Err(err) => {
            warn!(error = %err, "sentiment analysis failed; using neutral default");
            SentimentResult::neutral()
        }
    };

    ContentAnalysis {
        skills,
        experience: phrases_containing(&key_phrases, EXPERIENCE_KEYWORDS),
        education: phrases_containing(&key_phrases, EDUCATION_KEYWORDS),
        sentiment,
    }
}

pub fn extract_skills(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = HashSet::new();
    SKILL_VOCABULARY
        .iter()
        .filter(|skill| lowered.contains(*skill))
        .filter(|skill| seen.insert(**skill))
        .take(MAX_SKILLS)
        .map(|skill| skill.to_string())
        .collect()
}

fn phrases_containing(phrases: &[String], keywords: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    phrases
        .iter()
        .filter(|phrase| {
            let lowered = phrase.to_lowercase();
            keywords.iter().any(|keyword| lowered.contains(keyword))
        })
        .filter(|phrase| seen.insert(phrase.to_lowercase()))
        .cloned()
        .collect()
}
