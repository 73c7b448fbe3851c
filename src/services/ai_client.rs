use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::core::config::Settings;
use crate::services::documents::DocumentPayload;

/// One chat-completion call: a system prompt, a user text and attached documents.
#[derive(Debug, Clone)]
pub(crate) struct CompletionRequest<'a> {
    pub(crate) model: Option<&'a str>,
    pub(crate) system_prompt: &'a str,
    pub(crate) user_prompt: String,
    pub(crate) documents: &'a [DocumentPayload],
    pub(crate) json_response: bool,
    /// Session or exam id, only used for log correlation.
    pub(crate) trace_id: &'a str,
}

#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub(crate) content: String,
    pub(crate) model: String,
    pub(crate) tokens_used: Option<u64>,
    pub(crate) duration_seconds: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct AiClient {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
}

impl AiClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let ai = settings.ai();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.ai_request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            default_model: ai.ai_model.clone(),
            max_tokens: ai.ai_max_tokens,
            temperature: ai.ai_temperature,
            max_retries: ai.ai_max_retries,
        })
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub(crate) fn default_model(&self) -> &str {
        &self.default_model
    }

    pub(crate) fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.default_model.as_str())
    }

    pub(crate) async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        if !self.is_configured() {
            return Err(anyhow!("OPENAI_API_KEY is not configured"));
        }

        let model = self.resolve_model(request.model).to_string();
        let payload = self.build_payload(&model, &request);
        let url = format!("{}/chat/completions", self.base_url);
        let timer = Instant::now();

        tracing::info!(
            trace_id = request.trace_id,
            model = %model,
            documents = request.documents.len(),
            "Sending AI completion request"
        );

        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=self.max_retries {
            match self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow!("AI API returned {status}: {body}"));
                    if !is_retryable(status) {
                        break;
                    }
                }
                Err(err) => {
                    last_error = Some(anyhow::Error::new(err).context("Failed to call AI API"));
                }
            }

            if attempt < self.max_retries {
                tracing::warn!(
                    trace_id = request.trace_id,
                    attempt = attempt + 1,
                    "AI request failed; retrying"
                );
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt.min(5)))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = extract_message_content(&body).context("Missing AI response content")?;
        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64);
        let duration_seconds = timer.elapsed().as_secs_f64();

        tracing::info!(
            trace_id = request.trace_id,
            model = %model,
            duration_seconds,
            tokens_used,
            "AI completion finished"
        );

        Ok(Completion { content, model, tokens_used, duration_seconds })
    }

    fn build_payload(&self, model: &str, request: &CompletionRequest<'_>) -> Value {
        let mut content = vec![json!({"type": "text", "text": request.user_prompt})];
        content.extend(request.documents.iter().map(DocumentPayload::to_content_part));

        let mut payload = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": content}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        if request.json_response {
            payload["response_format"] = json!({"type": "json_object"});
        }

        payload
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Pulls the assistant text out of a chat-completions body. Content may be a
/// plain string or a list of typed parts.
fn extract_message_content(body: &Value) -> Option<String> {
    let content = body.get("choices")?.get(0)?.get("message")?.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let joined = content
        .as_array()?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    (!joined.is_empty()).then_some(joined)
}
