//! JSON webhook processor

use super::traits::{ItemProcessor, Job};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// Response fields checked for the artifact URL, in order
const ARTIFACT_KEYS: [&str; 4] = ["video_url", "url", "link", "result_url"];

const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Serialize)]
struct WebhookRequest<'a> {
    prompt: &'a str,
    languages: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

/// Processor that POSTs each prompt to an HTTP endpoint
///
/// The request body is
/// `{"prompt": ..., "languages": [lang], "image_url": ...}`; `image_url` is
/// omitted when the job has no reference image. A 2xx response must carry the
/// artifact either as a JSON field (`video_url`, `url`, `link`, `result_url`)
/// or as a plain-text body starting with `http`.
///
/// Timeouts, connection failures, 429, 5xx and 2xx responses without an
/// artifact are retried according to the job's settings. Every other status
/// fails the item immediately.
///
/// # Examples
///
/// ```no_run
/// use vidgen_batch::processor::WebhookProcessor;
///
/// # fn main() -> vidgen_batch::Result<()> {
/// let processor = WebhookProcessor::new("https://hooks.example/generate")?
///     .with_bearer_token("token")
///     .with_api_key("provider-key");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct WebhookProcessor {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<String>,
    api_key: Option<String>,
}

impl WebhookProcessor {
    /// Create a processor for an `http` or `https` endpoint
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config("endpoint", format!("invalid webhook URL: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::config(
                "endpoint",
                format!("unsupported scheme '{}'", endpoint.scheme()),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            bearer_token: None,
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Include an `api_key` field in every request body
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Target endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send_once(&self, job: &Job) -> Result<String> {
        let body = WebhookRequest {
            prompt: job.prompt(),
            languages: [job.language()],
            image_url: job.reference_image.as_deref(),
            api_key: self.api_key.as_deref(),
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(job.settings.request_timeout);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        extract_artifact(&text).ok_or_else(|| Error::AmbiguousResponse(preview(&text)))
    }
}

#[async_trait]
impl ItemProcessor for WebhookProcessor {
    async fn process(&self, job: &Job) -> Result<String> {
        tracing::debug!(
            item_id = %job.item.id,
            endpoint = %self.endpoint,
            has_reference = job.reference_image.is_some(),
            "posting prompt to webhook"
        );
        with_retry(&job.settings.retry_policy(), || self.send_once(job)).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Pull the artifact URL out of a response body
pub(crate) fn extract_artifact(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return ARTIFACT_KEYS.iter().find_map(|key| {
            map.get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
    }
    if trimmed.starts_with("http") {
        return trimmed.split_whitespace().next().map(str::to_string);
    }
    None
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
