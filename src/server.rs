//! HTTP proxy service for browser clients.
//!
//! Two jobs only: keep the API key out of the browser (the `/api/analyze`
//! proxy) and run the converters browsers cannot (`/api/process-document`
//! shells out to pandoc/LibreOffice). Everything else — rubric choice,
//! prompt assembly, result rendering — lives with the client.
//!
//! Every error path produces a JSON `{"error": …}` body with a precise
//! status code; a missing API key is reported before anything is forwarded
//! upstream.

use crate::analyze::{anthropic_key_present, chat_reply_parts, ChatOutcome, DEFAULT_MODEL};
use crate::config::{AnalysisConfig, AppMode, MAX_SYSTEM_PROMPT_CHARS};
use crate::convert::{
    convert_docx, convert_docx_to_pdf, extract_equations, libreoffice_available, pandoc_available,
};
use crate::error::LabError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use edgequake_llm::ImageData;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::Builder as TempFileBuilder;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Upload ceiling for `/api/process-document`.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Gateway timeout for proxied analysis calls. Deliberately under the 60 s
/// limit typical serverless platforms enforce, leaving headroom for the
/// response to flush.
pub const ANALYZE_TIMEOUT_SECS: u64 = 55;

/// Which grading pipelines this deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeLock {
    Teacher,
    Student,
    Dual,
}

impl ModeLock {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeLock::Teacher => "teacher",
            ModeLock::Student => "student",
            ModeLock::Dual => "dual",
        }
    }
}

impl FromStr for ModeLock {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(ModeLock::Teacher),
            "student" => Ok(ModeLock::Student),
            "dual" => Ok(ModeLock::Dual),
            other => Err(LabError::InvalidConfig(format!(
                "APP_MODE_LOCK must be teacher, student or dual, got '{other}'"
            ))),
        }
    }
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Extra allowed CORS origin, on top of the built-in list.
    pub frontend_url: Option<String>,
    pub mode_lock: ModeLock,
    pub model: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, LabError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| {
                LabError::InvalidConfig(format!("PORT must be a number, got '{raw}'"))
            })?,
            Err(_) => 3001,
        };
        let mode_lock = match std::env::var("APP_MODE_LOCK") {
            Ok(raw) => raw.parse()?,
            Err(_) => ModeLock::Dual,
        };
        Ok(ServerConfig {
            port,
            frontend_url: std::env::var("FRONTEND_URL").ok().filter(|u| !u.is_empty()),
            mode_lock,
            model: std::env::var("GRADING_MODEL").ok().filter(|m| !m.is_empty()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Origins the browser may call us from.
    fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![
            "https://www.kvenno.app".to_string(),
            "http://localhost:5173".to_string(),
            "http://localhost:4173".to_string(),
        ];
        if let Some(ref url) = self.frontend_url {
            origins.push(url.clone());
        }
        origins
    }
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
}

/// Error type for handler responses; every variant maps to a status code
/// and a JSON `{"error": …}` body.
#[derive(Debug)]
pub enum ServerError {
    BadRequest(String),
    Lab(LabError),
}

impl From<LabError> for ServerError {
    fn from(err: LabError) -> Self {
        ServerError::Lab(err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServerError::Lab(err) => match err {
                LabError::InvalidMode(_) | LabError::PromptTooLarge { .. } => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                LabError::ProviderNotConfigured { .. } => {
                    warn!("analysis requested without a configured API key");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "API key not configured".to_string(),
                    )
                }
                LabError::Timeout { .. } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Request timeout - greining tók of langan tíma".to_string(),
                ),
                LabError::ApiError { status, message } => {
                    let code = status
                        .and_then(|s| StatusCode::from_u16(s).ok())
                        .unwrap_or(StatusCode::BAD_GATEWAY);
                    (code, message)
                }
                LabError::ToolNotInstalled { .. } | LabError::ConversionFailed { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
                other => {
                    error!("unhandled server error: {other}");
                    (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
                }
            },
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// One block of an already-assembled user message, mirroring the wire shape
/// vision APIs use.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Deserialize)]
pub struct ImageSource {
    pub media_type: String,
    pub data: String,
}

/// Either a bare string or pre-assembled blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub content: MessageContent,
    pub system_prompt: String,
    pub mode: String,
}

/// Build the router for the service.
pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins()
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/analyze", post(analyze))
        .route(
            "/api/process-document",
            post(process_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "modeLock": state.config.mode_lock.as_str() }))
}

/// Proxy one analysis request to the LLM provider.
///
/// Validation order matters: mode and prompt size are client errors (400)
/// and checked first; a missing API key is a deployment error (500) and
/// must be reported without forwarding anything upstream.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let mode: AppMode = request.mode.parse()?;
    if request.system_prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
        return Err(LabError::PromptTooLarge {
            len: request.system_prompt.chars().count(),
            limit: MAX_SYSTEM_PROMPT_CHARS,
        }
        .into());
    }
    if !anthropic_key_present() {
        return Err(LabError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "Set ANTHROPIC_API_KEY or CLAUDE_API_KEY".into(),
        }
        .into());
    }

    let (text, images) = flatten_content(request.content);
    let mut builder = AnalysisConfig::builder()
        .mode(mode)
        .api_timeout_secs(ANALYZE_TIMEOUT_SECS);
    if let Some(ref model) = state.config.model {
        builder = builder.model(model.clone());
    }
    let config = builder.build()?;

    let outcome = chat_reply_parts(&request.system_prompt, &text, images, &config).await?;
    info!(
        input_tokens = outcome.prompt_tokens,
        output_tokens = outcome.completion_tokens,
        duration_ms = outcome.duration_ms,
        mode = %mode,
        "analysis proxied"
    );
    Ok(Json(message_json(&outcome, state.config.model.as_deref())))
}

/// Convert an uploaded `.docx` with pandoc (or to PDF with LibreOffice when
/// `target=pdf` accompanies the file).
///
/// The upload lands in a `NamedTempFile` that is removed on every exit path
/// when the handle drops, including early validation failures.
async fn process_document(mut multipart: Multipart) -> Result<Json<serde_json::Value>, ServerError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut target_pdf = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Could not read upload: {e}")))?;
                upload = Some((filename, bytes.to_vec()));
            }
            Some("target") => {
                let value = field.text().await.unwrap_or_default();
                target_pdf = value.eq_ignore_ascii_case("pdf");
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = upload else {
        return Err(ServerError::BadRequest("No file uploaded".into()));
    };
    if !filename.to_lowercase().ends_with(".docx") {
        return Err(ServerError::BadRequest(
            "Only .docx files are supported".into(),
        ));
    }
    if !pandoc_available().await {
        return Err(LabError::ToolNotInstalled { tool: "pandoc" }.into());
    }
    if target_pdf && !libreoffice_available().await {
        return Err(LabError::ToolNotInstalled {
            tool: "libreoffice",
        }
        .into());
    }

    let temp = TempFileBuilder::new()
        .suffix(".docx")
        .tempfile()
        .map_err(|e| LabError::Internal(format!("Could not create temp file: {e}")))?;
    tokio::fs::write(temp.path(), &bytes)
        .await
        .map_err(|e| LabError::Internal(format!("Could not write upload: {e}")))?;

    if target_pdf {
        let pdf_bytes = convert_docx_to_pdf(temp.path()).await?;
        let converted = convert_docx(temp.path()).await?;
        return Ok(Json(json!({
            "pdfData": BASE64.encode(&pdf_bytes),
            "equations": extract_equations(&converted.content),
            "type": "converted-pdf",
            "format": "pdf",
        })));
    }

    let converted = convert_docx(temp.path()).await?;
    Ok(Json(serde_json::to_value(&converted).map_err(|e| {
        LabError::Internal(format!("Could not encode result: {e}"))
    })?))
}

/// Flatten pre-assembled content blocks into the gateway's (text, images)
/// form. Text blocks join with blank lines; image order is preserved.
fn flatten_content(content: MessageContent) -> (String, Vec<ImageData>) {
    match content {
        MessageContent::Text(text) => (text, Vec::new()),
        MessageContent::Blocks(blocks) => {
            let mut texts: Vec<String> = Vec::new();
            let mut images: Vec<ImageData> = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text),
                    ContentBlock::Image { source } => {
                        images.push(
                            ImageData::new(source.data, source.media_type).with_detail("high"),
                        );
                    }
                }
            }
            (texts.join("\n\n"), images)
        }
    }
}

/// Shape the reply like the provider's message JSON so existing clients can
/// keep their parsing untouched.
fn message_json(outcome: &ChatOutcome, model: Option<&str>) -> serde_json::Value {
    json!({
        "content": [{ "type": "text", "text": outcome.text }],
        "usage": {
            "input_tokens": outcome.prompt_tokens,
            "output_tokens": outcome.completion_tokens,
        },
        "model": model.unwrap_or(DEFAULT_MODEL),
        "role": "assistant",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_lock_parses_all_three() {
        assert_eq!("teacher".parse::<ModeLock>().unwrap(), ModeLock::Teacher);
        assert_eq!("student".parse::<ModeLock>().unwrap(), ModeLock::Student);
        assert_eq!("dual".parse::<ModeLock>().unwrap(), ModeLock::Dual);
        assert!("both".parse::<ModeLock>().is_err());
    }

    #[test]
    fn analyze_request_accepts_plain_string_content() {
        let raw = r#"{"content": "report text", "systemPrompt": "grade it", "mode": "teacher"}"#;
        let request: AnalyzeRequest = serde_json::from_str(raw).unwrap();
        let (text, images) = flatten_content(request.content);
        assert_eq!(text, "report text");
        assert!(images.is_empty());
    }

    #[test]
    fn analyze_request_accepts_block_content() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "Lab report text content:\n\nhello"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "cGFnZQ=="}},
                {"type": "text", "text": "Analyze this lab report."}
            ],
            "systemPrompt": "grade it",
            "mode": "student"
        }"#;
        let request: AnalyzeRequest = serde_json::from_str(raw).unwrap();
        let (text, images) = flatten_content(request.content);
        assert!(text.starts_with("Lab report text content:"));
        assert!(text.ends_with("Analyze this lab report."));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
    }

    #[test]
    fn invalid_mode_maps_to_bad_request() {
        let response = ServerError::from(LabError::InvalidMode("dual".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_key_maps_to_opaque_500() {
        let response = ServerError::from(LabError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "secret hint".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let response = ServerError::from(LabError::Timeout { secs: 55 }).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn upstream_status_passes_through() {
        let response = ServerError::from(LabError::ApiError {
            status: Some(429),
            message: "rate limited".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn message_json_mirrors_provider_shape() {
        let outcome = ChatOutcome {
            text: "{\"suggestedGrade\":\"8\"}".into(),
            prompt_tokens: 120,
            completion_tokens: 45,
            duration_ms: 900,
        };
        let value = message_json(&outcome, None);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["usage"]["input_tokens"], 120);
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["model"], DEFAULT_MODEL);
    }
}
