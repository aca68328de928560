use super::ChatMessage;
use crate::critique::DocumentType;

const MAX_DOCUMENT_CHARS: usize = 12_000;

const CRITIQUE_SYSTEM: &str = "You are an experienced career coach and recruiter. \
You review job-search documents and give specific, actionable feedback. \
Always answer with a single JSON object and nothing else.";

const ASSESSMENT_SYSTEM: &str = "You design short career assessments for job seekers. \
Always answer with a single JSON object and nothing else.";

const INTERVIEW_SYSTEM: &str = "You are an interview coach preparing candidates for job interviews. \
Always answer with a single JSON object and nothing else.";

pub fn critique_messages(document_type: DocumentType, text: &str) -> Vec<ChatMessage> {
    let focus = match document_type {
        DocumentType::Resume => {
            "Evaluate structure, impact of bullet points, quantified achievements, \
             skills coverage and ATS keyword friendliness."
        }
        DocumentType::CoverLetter => {
            "Evaluate the opening, how well it connects experience to the role, tone, \
             specificity and the closing call to action."
        }
        DocumentType::General => {
            "Evaluate clarity, organisation, tone and how well the document presents \
             the author professionally."
        }
    };

    let prompt = format!(
        "Review the following {label}. {focus}\n\n\
         Respond with JSON of the form:\n\
         {{\"overall_score\": <0-100>, \"summary\": \"...\", \"strengths\": [\"...\"], \
         \"improvements\": [{{\"section\": \"...\", \"issue\": \"...\", \"suggestion\": \"...\"}}], \
         \"keywords\": [\"...\"]}}\n\n\
         DOCUMENT:\n{text}",
        label = document_type.as_str(),
        text = clip(text, MAX_DOCUMENT_CHARS),
    );

    vec![ChatMessage::system(CRITIQUE_SYSTEM), ChatMessage::user(prompt)]
}

pub fn assessment_messages(
    assessment_type: &str,
    focus_areas: &[String],
    question_count: u32,
) -> Vec<ChatMessage> {
    let focus = if focus_areas.is_empty() {
        "general career readiness".to_string()
    } else {
        focus_areas.join(", ")
    };
    let prompt = format!(
        "Create a {assessment_type} assessment with {question_count} questions covering: {focus}.\n\
         Group the questions into sections, one per area.\n\
         Respond with JSON of the form:\n\
         {{\"title\": \"...\", \"sections\": [{{\"name\": \"...\", \"questions\": \
         [{{\"id\": \"q1\", \"text\": \"...\", \"options\": [\"...\"]}}]}}]}}"
    );
    vec![ChatMessage::system(ASSESSMENT_SYSTEM), ChatMessage::user(prompt)]
}

pub fn interview_messages(role: &str, level: &str, question_count: u32) -> Vec<ChatMessage> {
    let prompt = format!(
        "Write {question_count} interview questions for a {level} {role} candidate. \
         Mix behavioural and technical questions and add a short tip for each.\n\
         Respond with JSON of the form:\n\
         {{\"questions\": [{{\"question\": \"...\", \"category\": \"behavioral|technical\", \"tip\": \"...\"}}]}}"
    );
    vec![ChatMessage::system(INTERVIEW_SYSTEM), ChatMessage::user(prompt)]
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
