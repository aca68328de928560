//! Text insights derived from extracted document content.

pub mod content;
pub mod recommendations;

pub use content::{analyze_content, extract_skills, ContentAnalysis};
pub use recommendations::{generate_job_recommendations, CandidateProfile, JobRecommendation};
