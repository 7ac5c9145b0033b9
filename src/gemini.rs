//! Google Gemini embedding and generation client

use crate::{
    config::ProviderConfig,
    embed::{Embedder, EmbeddingMode},
    generate::{build_prompt, AnswerGenerator},
    Error, ProviderErrorKind, Result,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// HTTP client for the Gemini REST API
///
/// One client serves both roles: document and query embeddings through
/// `embedContent`, answers through `generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
}

impl GeminiClient {
    /// Build a client from provider settings; requires an API key
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidConfig("missing Gemini API key".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(api_key)
                .map_err(|_| Error::InvalidConfig("API key is not a valid header".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| {
                Error::provider(
                    ProviderErrorKind::Configuration,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            dimension: config.dimension,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(&e))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(classify_status(status, &text))
        }
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(text),
            task_type: mode.task_type(),
        };
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let body = self.post(&url, &request).await?;
        let values = parse_embedding(&body)?;

        tracing::debug!(
            model = %self.embedding_model,
            task_type = mode.task_type(),
            dimension = values.len(),
            "generated embedding"
        );
        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl AnswerGenerator for GeminiClient {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::text(&build_prompt(context, question))],
        };
        let url = self.endpoint(&self.generation_model, "generateContent");
        let body = self.post(&url, &request).await?;
        parse_answer(&body)
    }

    fn model_id(&self) -> &str {
        &self.generation_model
    }
}

/// Map a non-success HTTP response to a provider error
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> Error {
    let lower = body.to_lowercase();
    let kind = if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("quota") {
        ProviderErrorKind::Quota
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || lower.contains("api key")
        || status == StatusCode::NOT_FOUND
    {
        ProviderErrorKind::Configuration
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ProviderErrorKind::Timeout
    } else if status.is_server_error() {
        ProviderErrorKind::Network
    } else {
        ProviderErrorKind::Other
    };

    let detail: String = body.chars().take(200).collect();
    Error::provider(kind, format!("HTTP {status}: {detail}"))
}

/// Map a transport failure to a provider error
#[must_use]
pub fn classify_transport(err: &reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ProviderErrorKind::Network
    } else if err.is_builder() {
        ProviderErrorKind::Configuration
    } else {
        ProviderErrorKind::Other
    };
    Error::provider(kind, err.to_string())
}

fn parse_embedding(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbedResponse = serde_json::from_str(body).map_err(|e| {
        Error::provider(
            ProviderErrorKind::Other,
            format!("unreadable embedding response: {e}"),
        )
    })?;
    if parsed.embedding.values.is_empty() {
        return Err(Error::provider(
            ProviderErrorKind::Other,
            "empty embedding in response",
        ));
    }
    Ok(parsed.embedding.values)
}

fn parse_answer(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        Error::provider(
            ProviderErrorKind::Other,
            format!("unreadable generation response: {e}"),
        )
    })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::provider(
            ProviderErrorKind::Other,
            "empty response from generation model",
        ));
    }
    Ok(text)
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}
