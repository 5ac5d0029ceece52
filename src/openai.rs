//! Question generation through an OpenAI-compatible chat-completions endpoint.
//!
//! The model is asked for a strict JSON object `{"questions": [...]}`. The API key is never
//! logged; only model name, latency and token usage are.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::challenge::Question;
use crate::config::OpenAiConfig;
use crate::content::{ContentError, ContentProvider, ContentRequest};

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions for students. \
Respond ONLY with a JSON object of the form \
{\"questions\": [{\"text\": string, \"options\": [string, string, string, string], \"correct_answer\": string}]}. \
The correct_answer must be copied exactly from options.";

#[derive(Clone)]
pub struct OpenAiContentProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiContentProvider {
    /// Build a provider if an API key is configured. `Ok(None)` means no key; a configured key
    /// with an unusable HTTP client is an error rather than a silent fallback.
    pub fn from_config(config: &OpenAiConfig) -> Result<Option<Self>, ContentError> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|err| {
                tracing::error!(error = %err, "failed to build the OpenAI HTTP client");
                ContentError::Provider(format!("http client: {}", err))
            })?;
        Ok(Some(OpenAiContentProvider {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
    async fn chat_json<T: for<'a> Deserialize<'a>>(&self, system: &str, user: &str) -> Result<T, ContentError> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessageReq { role: "system".into(), content: system.into() },
                ChatMessageReq { role: "user".into(), content: user.into() },
            ],
            temperature: 0.7,
            response_format: ResponseFormat { r#type: "json_object".into() },
        };

        let res = self
            .client
            .post(&url)
            .header(USER_AGENT, concat!("quizduel/", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| ContentError::Provider(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let msg = extract_openai_error(&body).unwrap_or(body);
            return Err(ContentError::Provider(format!("OpenAI HTTP {}: {}", status, msg)));
        }

        let body: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| ContentError::Malformed(e.to_string()))?;
        if let Some(usage) = &body.usage {
            tracing::info!(
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "OpenAI usage"
            );
        }
        let text = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        serde_json::from_str::<T>(&text).map_err(|e| ContentError::Malformed(format!("JSON parse error: {}", e)))
    }
}

fn user_prompt(request: &ContentRequest) -> String {
    let mut prompt = format!(
        "Generate {} questions about {} in {} at a {} difficulty level.",
        request.count.max(1),
        request.topic,
        request.subject,
        request.difficulty
    );
    if let Some(subtopic) = &request.subtopic {
        prompt.push_str(&format!(" Focus on {}.", subtopic));
    }
    prompt
}

#[derive(Deserialize)]
struct GeneratedSet {
    #[serde(default)]
    questions: Vec<Question>,
}

#[async_trait]
impl ContentProvider for OpenAiContentProvider {
    async fn generate_questions(&self, request: &ContentRequest) -> Result<Vec<Question>, ContentError> {
        let started = Instant::now();
        let result = self.chat_json::<GeneratedSet>(SYSTEM_PROMPT, &user_prompt(request)).await;
        let elapsed = started.elapsed();
        match result {
            Ok(set) => {
                tracing::info!(?elapsed, count = set.questions.len(), "questions generated");
                Ok(set.questions.into_iter().take(request.count.max(1)).collect())
            }
            Err(err) => {
                tracing::error!(?elapsed, error = %err, "question generation call failed");
                Err(err)
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessageReq {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct EWrap {
        error: EObj,
    }
    #[derive(Deserialize)]
    struct EObj {
        message: String,
    }
    serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
