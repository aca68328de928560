//! Azure OpenAI chat completions. Every LLM call in the service goes through
//! [`ChatCompletion`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{http_client, retry_after_header, strip_json_fences, ClientError, ClientResult};
use crate::config::AppConfig;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatCompletion: Send + Sync + 'static {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> ClientResult<String>;
}

/// Calls the model and parses its reply as JSON. The prompt must ask for JSON.
pub async fn complete_json<T: DeserializeOwned>(
    chat: &dyn ChatCompletion,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: f32,
) -> ClientResult<T> {
    let text = chat.complete(messages, max_tokens, temperature).await?;
    Ok(serde_json::from_str(strip_json_fences(&text))?)
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Clone)]
pub struct AzureOpenAi {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    deployment: String,
    api_version: String,
}

impl AzureOpenAi {
    pub fn from_config(config: &AppConfig) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(120))?,
            endpoint: config
                .openai_endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            api_key: config.openai_key.clone(),
            deployment: config.openai_deployment.clone(),
            api_version: config.openai_api_version.clone(),
        })
    }

    fn completions_url(&self) -> ClientResult<(String, &str)> {
        match (self.endpoint.as_deref(), self.api_key.as_deref()) {
            (Some(endpoint), Some(key)) => Ok((
                format!(
                    "{endpoint}/openai/deployments/{}/chat/completions?api-version={}",
                    self.deployment, self.api_version
                ),
                key,
            )),
            _ => Err(ClientError::NotConfigured("azure openai")),
        }
    }
}

#[async_trait]
impl ChatCompletion for AzureOpenAi {
    /// Retries 429 and 5xx responses with exponential backoff.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> ClientResult<String> {
        let (url, api_key) = self.completions_url()?;
        let body = CompletionRequest {
            messages,
            max_tokens,
            temperature,
        };

        let mut last_error: Option<ClientError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "chat completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .header("api-key", api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    last_error = Some(ClientError::Http(err));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                last_error = Some(ClientError::RateLimited {
                    retry_after: retry_after_header(&response),
                });
                continue;
            }
            if status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                last_error = Some(ClientError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ClientError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: CompletionResponse = response.json().await?;
            if let Some(usage) = &parsed.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "chat completion succeeded"
                );
            }
            return first_choice_text(parsed);
        }

        Err(last_error.unwrap_or(ClientError::RateLimited { retry_after: None }))
    }
}

fn first_choice_text(response: CompletionResponse) -> ClientResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ClientError::InvalidResponse("empty completion".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CannedChat(&'static str);

    #[async_trait]
    impl ChatCompletion for CannedChat {
        async fn complete(&self, _: &[ChatMessage], _: u32, _: f32) -> ClientResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn extracts_first_choice() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  hello " } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
        }))
        .expect("parse");
        assert_eq!(first_choice_text(response).expect("text"), "hello");
    }

    #[test]
    fn empty_choices_are_invalid() {
        let response: CompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).expect("parse");
        assert!(matches!(
            first_choice_text(response),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn complete_json_handles_fenced_replies() {
        let chat = CannedChat("```json\n{\"questions\": [\"Why us?\"]}\n```");
        #[derive(Deserialize)]
        struct Reply {
            questions: Vec<String>,
        }
        let reply: Reply = complete_json(&chat, &[ChatMessage::user("hi")], 100, 0.2)
            .await
            .expect("json");
        assert_eq!(reply.questions, vec!["Why us?".to_string()]);
    }
}
