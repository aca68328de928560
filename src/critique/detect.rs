use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Resume,
    CoverLetter,
    General,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::CoverLetter => "cover letter",
            DocumentType::General => "general",
        }
    }
}

/// Guesses the document category from its file name and extracted text.
/// Resume signals win over cover-letter signals.
pub fn detect_document_type(file_name: &str, text: &str) -> DocumentType {
    let name = file_name.to_lowercase();
    let content = text.to_lowercase();

    let resume_name = name.contains("resume") || name.contains("cv");
    let resume_content = content.contains("experience")
        && (content.contains("skills") || content.contains("education"));
    if resume_name || resume_content {
        return DocumentType::Resume;
    }

    let letter_name = name.contains("cover") || name.contains("letter");
    let letter_content =
        content.contains("dear") && (content.contains("position") || content.contains("opportunity"));
    if letter_name || letter_content {
        return DocumentType::CoverLetter;
    }

    DocumentType::General
}
