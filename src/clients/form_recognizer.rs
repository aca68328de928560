use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderName, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{http_client, retry_after_header, ClientError, ClientResult};
use crate::config::AppConfig;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_POLLS: u32 = 120;

/// Prebuilt model used for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisModel {
    Read,
    Document,
}

impl AnalysisModel {
    /// `.docx` files go through the read model; PDFs and everything else use
    /// the general document model.
    pub fn for_file_name(file_name: &str) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("docx") => AnalysisModel::Read,
            _ => AnalysisModel::Document,
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            AnalysisModel::Read => "prebuilt-read",
            AnalysisModel::Document => "prebuilt-document",
        }
    }
}

/// Structured extraction output, stored verbatim on the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResult {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default)]
    pub pages: Vec<Value>,
    #[serde(default)]
    pub tables: Vec<Value>,
}

#[async_trait]
pub trait DocumentAnalyzer: Send + Sync + 'static {
    async fn analyze(&self, url: &str, model: AnalysisModel) -> ClientResult<AnalyzeResult>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<Value>,
}

pub struct AzureFormRecognizer {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureFormRecognizer {
    pub fn from_config(config: &AppConfig) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(60))?,
            endpoint: config
                .form_recognizer_endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            api_key: config.form_recognizer_key.clone(),
            api_version: config.form_recognizer_api_version.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    fn credentials(&self) -> ClientResult<(&str, &str)> {
        match (self.endpoint.as_deref(), self.api_key.as_deref()) {
            (Some(endpoint), Some(key)) => Ok((endpoint, key)),
            _ => Err(ClientError::NotConfigured("azure form recognizer")),
        }
    }

    async fn poll(&self, operation_url: &str, api_key: &str) -> ClientResult<AnalyzeResult> {
        for attempt in 1..=self.max_polls {
            sleep(self.poll_interval).await;

            let response = self
                .client
                .get(operation_url)
                .header(SUBSCRIPTION_KEY_HEADER, api_key)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(attempt, "form recognizer polling throttled");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let operation: OperationStatus = response.json().await?;
            debug!(attempt, status = %operation.status, "form recognizer poll");
            match operation.status.as_str() {
                "succeeded" => {
                    return operation.analyze_result.ok_or_else(|| {
                        ClientError::InvalidResponse("succeeded without analyzeResult".into())
                    })
                }
                "failed" => {
                    let message = operation
                        .error
                        .as_ref()
                        .and_then(|err| err.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("document analysis failed")
                        .to_string();
                    return Err(ClientError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                _ => {}
            }
        }

        Err(ClientError::Timeout {
            attempts: self.max_polls,
        })
    }
}

#[async_trait]
impl DocumentAnalyzer for AzureFormRecognizer {
    async fn analyze(&self, url: &str, model: AnalysisModel) -> ClientResult<AnalyzeResult> {
        let (endpoint, api_key) = self.credentials()?;
        let request_url = format!(
            "{endpoint}/formrecognizer/documentModels/{}:analyze?api-version={}",
            model.model_id(),
            self.api_version
        );

        let response = self
            .client
            .post(&request_url)
            .header(SUBSCRIPTION_KEY_HEADER, api_key)
            .json(&json!({ "urlSource": url }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                retry_after: retry_after_header(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let operation_url = response
            .headers()
            .get(HeaderName::from_static("operation-location"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or_else(|| ClientError::InvalidResponse("missing Operation-Location".into()))?;

        self.poll(&operation_url, api_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docx_uses_read_model() {
        assert_eq!(AnalysisModel::for_file_name("resume.docx"), AnalysisModel::Read);
        assert_eq!(AnalysisModel::for_file_name("Resume.DOCX"), AnalysisModel::Read);
    }

    #[test]
    fn pdf_and_other_files_use_document_model() {
        assert_eq!(
            AnalysisModel::for_file_name("resume.pdf"),
            AnalysisModel::Document
        );
        assert_eq!(AnalysisModel::for_file_name("notes.txt"), AnalysisModel::Document);
        assert_eq!(AnalysisModel::for_file_name("no-extension"), AnalysisModel::Document);
    }

    #[test]
    fn parses_succeeded_operation() {
        let raw = json!({
            "status": "succeeded",
            "analyzeResult": {
                "content": "Jane Doe\nExperience",
                "pages": [{ "pageNumber": 1 }],
                "tables": [],
                "apiVersion": "2023-07-31"
            }
        });
        let operation: OperationStatus = serde_json::from_value(raw).expect("parse");
        let result = operation.analyze_result.expect("result");
        assert_eq!(result.content, "Jane Doe\nExperience");
        assert_eq!(result.pages.len(), 1);
        assert!(result.documents.is_empty());
    }

    #[tokio::test]
    async fn missing_configuration_is_reported() {
        let analyzer = AzureFormRecognizer {
            client: Client::new(),
            endpoint: None,
            api_key: Some("key".into()),
            api_version: "2023-07-31".into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: 1,
        };
        let err = analyzer
            .analyze("https://example.com/doc.pdf", AnalysisModel::Document)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConfigured(_)));
    }
}
