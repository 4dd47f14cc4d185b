//! Vertex AI Gemini client for highlight analysis.
//!
//! The stored video is passed by `gs://` reference together with the
//! instruction template. The model is asked for JSON matching
//! [`response_schema`]. Every way the text can fail to be a usable
//! `{"highlights": [...]}` object maps to a distinct [`AnalysisError`] for
//! which `is_parse_error()` holds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hlgen_models::HighlightsResponse;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::auth::AccessTokenSource;
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::record_request;

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default Vertex AI region.
pub const DEFAULT_LOCATION: &str = "us-central1";

/// A video the model can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    /// `gs://bucket/key`
    pub uri: String,
    pub mime_type: String,
}

impl VideoReference {
    pub fn mp4(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: "video/mp4".to_string(),
        }
    }
}

/// Asks a hosted model for highlight descriptors.
#[async_trait]
pub trait HighlightAnalyzer: Send + Sync {
    /// Analyze a stored video. The returned list passed
    /// [`HighlightsResponse::check`].
    async fn analyze(&self, video: &VideoReference) -> AnalysisResult<HighlightsResponse>;
}

/// Vertex AI client configuration.
#[derive(Debug, Clone)]
pub struct VertexConfig {
    /// GCP project ID
    pub project_id: String,
    /// Region, e.g. `us-central1`, or `global`
    pub location: String,
    /// Model ID, e.g. `gemini-2.5-flash`
    pub model: String,
    /// Endpoint override for tests
    pub endpoint: Option<String>,
    /// Request timeout; video analysis can take minutes
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl VertexConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None if self.location == "global" => "https://aiplatform.googleapis.com".to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    /// Full `generateContent` URL for the configured model.
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url(),
            self.project_id,
            self.location,
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Schema the model's JSON output is constrained to.
///
/// Item count bounds are guidance for the model; they are not re-checked
/// when parsing.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "highlights": {
                "type": "ARRAY",
                "minItems": 3,
                "maxItems": 5,
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "highlight_number": {
                            "type": "INTEGER",
                            "description": "The sequential number of the highlight"
                        },
                        "start_time": {
                            "type": "STRING",
                            "description": "The timestamp where the highlight begins (MM:SS)"
                        },
                        "end_time": {
                            "type": "STRING",
                            "description": "The timestamp where the highlight ends (MM:SS)"
                        },
                        "reason": {
                            "type": "STRING",
                            "description": "Explanation of why this segment was chosen"
                        },
                        "brief_description": {
                            "type": "STRING",
                            "description": "Very brief summary of the highlight content"
                        }
                    },
                    "required": ["highlight_number", "start_time", "end_time", "reason", "brief_description"],
                    "propertyOrdering": ["highlight_number", "start_time", "end_time", "reason", "brief_description"]
                }
            }
        },
        "required": ["highlights"]
    })
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json)
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's text output into checked descriptors.
pub fn parse_highlights_text(text: &str) -> AnalysisResult<HighlightsResponse> {
    let text = strip_code_fence(text);
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse("empty text".to_string()));
    }

    let value: Value = serde_json::from_str(text).map_err(|e| AnalysisError::MalformedJson(e.to_string()))?;

    match value.get("highlights") {
        Some(Value::Array(_)) => {}
        _ => return Err(AnalysisError::MissingHighlights),
    }

    let response: HighlightsResponse =
        serde_json::from_value(value).map_err(|e| AnalysisError::MalformedDescriptor(e.to_string()))?;
    response.check()?;

    Ok(response)
}

/// Vertex AI `generateContent` client.
pub struct VertexGeminiClient {
    http: Client,
    config: VertexConfig,
    prompt: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl VertexGeminiClient {
    pub fn new(config: VertexConfig, prompt: impl Into<String>, tokens: Arc<dyn AccessTokenSource>) -> AnalysisResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(AnalysisError::config_error("Project ID cannot be empty"));
        }

        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(AnalysisError::config_error("Instruction template cannot be empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("hlgen-cloud/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            prompt,
            tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, url: &str, body: &GenerateContentRequest<'_>) -> AnalysisResult<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let mut response = self.http.post(url).bearer_auth(&token).json(body).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Vertex AI rejected access token, refreshing and resending once");
            self.tokens.invalidate().await;
            let token = self.tokens.access_token().await?;
            response = self.http.post(url).bearer_auth(&token).json(body).send().await?;
        }

        Ok(response)
    }

    async fn generate(&self, video: &VideoReference) -> AnalysisResult<HighlightsResponse> {
        let url = self.config.generate_content_url();
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: &self.prompt },
                    Part::File {
                        file_data: FileData {
                            mime_type: &video.mime_type,
                            file_uri: &video.uri,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let response = self.send(&url, &request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::request_failed(status.as_u16(), body));
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::MalformedJson(format!("unreadable API response: {}", e)))?;

        let text = extract_text(&response)?;
        debug!(chars = text.len(), "Model returned text");

        parse_highlights_text(&text)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: &GenerateContentResponse) -> AnalysisResult<String> {
    if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
        return Err(AnalysisError::EmptyResponse(format!("prompt blocked ({})", reason)));
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| AnalysisError::EmptyResponse("no candidates".to_string()))?;

    let text: String = candidate
        .content
        .iter()
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("no text");
        return Err(AnalysisError::EmptyResponse(reason.to_string()));
    }

    Ok(text)
}

#[async_trait]
impl HighlightAnalyzer for VertexGeminiClient {
    async fn analyze(&self, video: &VideoReference) -> AnalysisResult<HighlightsResponse> {
        let span = info_span!("vertex_generate", model = %self.config.model, video = %video.uri);
        let start = Instant::now();

        let result = self.generate(video).instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) if e.is_parse_error() => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request("vertex", "generate_content", status, start.elapsed().as_secs_f64());

        match &result {
            Ok(response) => info!(
                "Model {} returned {} highlights for {}",
                self.config.model,
                response.highlights.len(),
                video.uri
            ),
            Err(e) => warn!("Highlight analysis failed for {}: {}", video.uri, e),
        }
        result
    }
}
