use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{http_client, retry_after_header, ClientError, ClientResult};
use crate::config::AppConfig;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
/// Per-document character limit of the language service.
pub const MAX_DOCUMENT_CHARS: usize = 5120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub overall: String,
    pub scores: SentimentScores,
}

impl SentimentResult {
    pub fn neutral() -> Self {
        Self {
            overall: "neutral".to_string(),
            scores: SentimentScores {
                positive: 0.0,
                neutral: 1.0,
                negative: 0.0,
            },
        }
    }
}

#[async_trait]
pub trait TextAnalytics: Send + Sync + 'static {
    async fn key_phrases(&self, text: &str) -> ClientResult<Vec<String>>;
    async fn sentiment(&self, text: &str) -> ClientResult<SentimentResult>;
}

pub struct AzureTextAnalytics {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: String,
}

impl AzureTextAnalytics {
    pub fn from_config(config: &AppConfig) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            endpoint: config
                .language_endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            api_key: config.language_key.clone(),
            api_version: config.language_api_version.clone(),
        })
    }

    async fn analyze(&self, kind: &str, text: &str) -> ClientResult<Value> {
        let (endpoint, api_key) = match (self.endpoint.as_deref(), self.api_key.as_deref()) {
            (Some(endpoint), Some(key)) => (endpoint, key),
            _ => return Err(ClientError::NotConfigured("azure language service")),
        };

        let url = format!(
            "{endpoint}/language/:analyze-text?api-version={}",
            self.api_version
        );
        let body = json!({
            "kind": kind,
            "analysisInput": {
                "documents": [
                    { "id": "1", "language": "en", "text": truncate_chars(text, MAX_DOCUMENT_CHARS) }
                ]
            }
        });

        let response = self
            .client
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                retry_after: retry_after_header(&response),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: AnalyzeTextResponse = response.json().await?;
        first_document(payload)
    }
}

#[async_trait]
impl TextAnalytics for AzureTextAnalytics {
    async fn key_phrases(&self, text: &str) -> ClientResult<Vec<String>> {
        let document = self.analyze("KeyPhraseExtraction", text).await?;
        parse_key_phrases(&document)
    }

    async fn sentiment(&self, text: &str) -> ClientResult<SentimentResult> {
        let document = self.analyze("SentimentAnalysis", text).await?;
        parse_sentiment(&document)
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeTextResponse {
    results: AnalyzeTextResults,
}

#[derive(Debug, Deserialize)]
struct AnalyzeTextResults {
    #[serde(default)]
    documents: Vec<Value>,
    #[serde(default)]
    errors: Vec<Value>,
}

fn first_document(payload: AnalyzeTextResponse) -> ClientResult<Value> {
    if let Some(error) = payload.results.errors.first() {
        let message = error
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("text analysis returned an error result")
            .to_string();
        return Err(ClientError::InvalidResponse(message));
    }
    payload
        .results
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::InvalidResponse("no documents in result".into()))
}

fn parse_key_phrases(document: &Value) -> ClientResult<Vec<String>> {
    let phrases = document
        .get("keyPhrases")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::InvalidResponse("missing keyPhrases".into()))?;
    Ok(phrases
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn parse_sentiment(document: &Value) -> ClientResult<SentimentResult> {
    let overall = document
        .get("sentiment")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::InvalidResponse("missing sentiment".into()))?
        .to_string();
    let score = |name: &str| {
        document
            .pointer(&format!("/confidenceScores/{name}"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    Ok(SentimentResult {
        overall,
        scores: SentimentScores {
            positive: score("positive"),
            neutral: score("neutral"),
            negative: score("negative"),
        },
    })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn error_results_become_errors() {
        let payload: AnalyzeTextResponse = serde_json::from_value(json!({
            "results": {
                "documents": [],
                "errors": [{ "id": "1", "error": { "code": "InvalidArgument", "message": "Document text is empty." } }]
            }
        }))
        .expect("parse");
        let err = first_document(payload).unwrap_err();
        assert!(err.to_string().contains("Document text is empty."));
    }

    #[test]
    fn parses_key_phrases_and_sentiment() {
        let doc = json!({
            "id": "1",
            "keyPhrases": ["five years of experience", "computer science degree"],
            "sentiment": "positive",
            "confidenceScores": { "positive": 0.9, "neutral": 0.08, "negative": 0.02 }
        });
        let phrases = parse_key_phrases(&doc).expect("phrases");
        assert_eq!(phrases.len(), 2);
        let sentiment = parse_sentiment(&doc).expect("sentiment");
        assert_eq!(sentiment.overall, "positive");
        assert!((sentiment.scores.positive - 0.9).abs() < f64::EPSILON);
    }
}
