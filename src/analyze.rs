//! Analysis gateway: turn extracted file content into a typed verdict.
//!
//! This module is intentionally thin on prompt text — all prompt engineering
//! lives in [`crate::prompts`] — and owns the mechanics: provider resolution,
//! message assembly, the timeout race and the two-stage reply parse.
//!
//! ## Reply parsing
//!
//! Models wrap JSON in prose more often than not ("Here is the analysis:
//! ...{...}"). Parsing is two-staged so the failure modes stay distinct:
//! first a greedy `{…}` substring extraction ([`LabError::ReplyNotJson`] when
//! nothing JSON-shaped exists), then a typed `serde_json` parse
//! ([`LabError::ReplyInvalidShape`] when the object is the wrong shape).

use crate::config::{AnalysisConfig, AppMode, MAX_SYSTEM_PROMPT_CHARS};
use crate::content::FileContent;
use crate::error::LabError;
use crate::experiment::ExperimentConfig;
use crate::prompts::{
    build_system_prompt, IMAGE_ANALYSIS_INSTRUCTION, PDF_ANALYSIS_INSTRUCTION, TEXT_CONTENT_PREFIX,
};
use crate::report::{Analysis, AnalysisResult, StudentFeedback};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Default model when neither config nor environment names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Greedy JSON-object scan: first `{` to last `}`. Greedy on purpose — the
/// reply contains one object and nested braces must land inside the match.
static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid JSON object regex"));

/// The raw outcome of one model call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The model's text reply, unparsed.
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub duration_ms: u64,
}

/// Analyse one file's content against an experiment rubric.
///
/// Builds the mode-selected system prompt, sends the content to the model,
/// races the call against the configured timeout and parses the reply into
/// the typed result for the mode, tagged with `filename`.
pub async fn analyze_content(
    content: &FileContent,
    filename: &str,
    experiment: &ExperimentConfig,
    config: &AnalysisConfig,
) -> Result<Analysis, LabError> {
    let system_prompt = build_system_prompt(config.mode, experiment);
    let outcome = chat_reply(&system_prompt, content, config).await?;

    match config.mode {
        AppMode::Teacher => {
            let mut result: AnalysisResult = parse_reply(&outcome.text)?;
            result.filename = filename.to_string();
            if result.max_total_points.is_none() {
                result.max_total_points = experiment.max_total_points();
            }
            Ok(Analysis::Teacher(result))
        }
        AppMode::Student => {
            let mut feedback: StudentFeedback = parse_reply(&outcome.text)?;
            feedback.filename = filename.to_string();
            Ok(Analysis::Student(feedback))
        }
    }
}

/// Send content to the model under a caller-supplied system prompt and
/// return the raw reply.
///
/// This is the layer the HTTP proxy uses: the prompt arrives from the client
/// verbatim and the reply goes back unparsed. Validation (prompt ceiling)
/// happens before any provider is resolved or any network touched.
pub async fn chat_reply(
    system_prompt: &str,
    content: &FileContent,
    config: &AnalysisConfig,
) -> Result<ChatOutcome, LabError> {
    let (text, images) = build_message_parts(content);
    chat_reply_parts(system_prompt, &text, images, config).await
}

/// Like [`chat_reply`], but over pre-assembled message parts.
///
/// The HTTP proxy lands here directly: its clients send already-assembled
/// text and image blocks, so re-running the content assembly would wrap the
/// instructions twice.
pub async fn chat_reply_parts(
    system_prompt: &str,
    text: &str,
    images: Vec<ImageData>,
    config: &AnalysisConfig,
) -> Result<ChatOutcome, LabError> {
    if system_prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
        return Err(LabError::PromptTooLarge {
            len: system_prompt.chars().count(),
            limit: MAX_SYSTEM_PROMPT_CHARS,
        });
    }

    let provider = resolve_provider(config)?;

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(text, images),
    ];
    let options = build_options(config);

    let start = Instant::now();
    let secs = config.api_timeout_secs;
    let response = timeout(
        Duration::from_secs(secs),
        provider.chat(&messages, Some(&options)),
    )
    .await
    .map_err(|_| LabError::Timeout { secs })?
    .map_err(|e| LabError::ApiError {
        status: None,
        message: e.to_string(),
    })?;

    let duration = start.elapsed();
    debug!(
        "Analysis call: {} input tokens, {} output tokens, {:?}",
        response.prompt_tokens, response.completion_tokens, duration
    );

    Ok(ChatOutcome {
        text: response.content,
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
        duration_ms: duration.as_millis() as u64,
    })
}

/// Assemble the user-message text and image attachments for one file.
///
/// * Image upload — the photo itself plus a fixed instruction.
/// * PDF/Word with page images — the extracted text under a labelled prefix,
///   then the pages in order, then an instruction pointing the model at the
///   equations and diagrams only visible in the images.
/// * Anything else — the raw text, no attachments.
pub fn build_message_parts(content: &FileContent) -> (String, Vec<ImageData>) {
    match content {
        FileContent::Image { data, media_type } => (
            IMAGE_ANALYSIS_INSTRUCTION.to_string(),
            vec![ImageData::new(data.clone(), media_type.clone()).with_detail("high")],
        ),
        FileContent::Pdf { data, images } | FileContent::Docx { data, images }
            if !images.is_empty() =>
        {
            let text = format!("{TEXT_CONTENT_PREFIX}{data}\n\n{PDF_ANALYSIS_INSTRUCTION}");
            let attachments = images
                .iter()
                .map(|img| {
                    ImageData::new(img.data.clone(), img.media_type.clone()).with_detail("high")
                })
                .collect();
            (text, attachments)
        }
        other => (other.data().to_string(), Vec::new()),
    }
}

/// Build `CompletionOptions` from the analysis config: temperature from the
/// config, output-token budget from the mode.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.mode.max_tokens()),
        ..Default::default()
    }
}

/// Find the JSON-object substring of a model reply.
pub fn extract_json_object(reply: &str) -> Result<&str, LabError> {
    JSON_OBJECT
        .find(reply)
        .map(|m| m.as_str())
        .ok_or(LabError::ReplyNotJson)
}

/// Two-stage reply parse: substring extraction, then typed decode.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, LabError> {
    let json = extract_json_object(reply)?;
    serde_json::from_str(json).map_err(|e| LabError::ReplyInvalidShape {
        detail: e.to_string(),
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. Pre-built provider (`config.provider`) — used as-is; this is also the
///    seam tests inject fakes through.
/// 2. Named provider (`config.provider_name`) plus the configured model.
/// 3. An Anthropic key in the environment (either accepted variable name)
///    selects the Anthropic provider with the default grading model.
/// 4. Full auto-detection via `ProviderFactory::from_env`.
fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, LabError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if anthropic_key_present() {
        return create_provider("anthropic", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LabError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set ANTHROPIC_API_KEY (or CLAUDE_API_KEY), or configure a provider.\n\
                 Error: {e}"
            ),
        })?;
    info!("Auto-detected LLM provider from environment");
    Ok(llm_provider)
}

/// True when an Anthropic key is present under either accepted name.
///
/// `CLAUDE_API_KEY` is accepted as an alias and copied to the canonical
/// variable so the provider factory sees it.
pub fn anthropic_key_present() -> bool {
    if std::env::var("ANTHROPIC_API_KEY").map_or(false, |k| !k.is_empty()) {
        return true;
    }
    if let Ok(key) = std::env::var("CLAUDE_API_KEY") {
        if !key.is_empty() {
            std::env::set_var("ANTHROPIC_API_KEY", key);
            return true;
        }
    }
    false
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LabError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        LabError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PageImage;

    #[test]
    fn image_content_gets_fixed_instruction_and_one_attachment() {
        let content = FileContent::Image {
            data: "aGVsbG8=".into(),
            media_type: "image/jpeg".into(),
        };
        let (text, images) = build_message_parts(&content);
        assert_eq!(text, IMAGE_ANALYSIS_INSTRUCTION);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[0].data, "aGVsbG8=");
    }

    #[test]
    fn pdf_with_pages_sends_text_then_images_in_order() {
        let content = FileContent::Pdf {
            data: "Niðurstöður: blátt → rautt".into(),
            images: vec![
                PageImage {
                    data: "cGFnZTE=".into(),
                    media_type: "image/png".into(),
                },
                PageImage {
                    data: "cGFnZTI=".into(),
                    media_type: "image/png".into(),
                },
            ],
        };
        let (text, images) = build_message_parts(&content);
        assert!(text.starts_with(TEXT_CONTENT_PREFIX));
        assert!(text.contains("blátt → rautt"));
        assert!(text.ends_with(PDF_ANALYSIS_INSTRUCTION));
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data, "cGFnZTE=");
        assert_eq!(images[1].data, "cGFnZTI=");
    }

    #[test]
    fn pdf_without_pages_is_plain_text() {
        let content = FileContent::Pdf {
            data: "just text".into(),
            images: vec![],
        };
        let (text, images) = build_message_parts(&content);
        assert_eq!(text, "just text");
        assert!(images.is_empty());
    }

    #[test]
    fn docx_markdown_passes_through_when_no_images() {
        let content = FileContent::Docx {
            data: "# Tilgangur\n\n$K_c$".into(),
            images: vec![],
        };
        let (text, images) = build_message_parts(&content);
        assert_eq!(text, "# Tilgangur\n\n$K_c$");
        assert!(images.is_empty());
    }

    #[test]
    fn json_extraction_strips_surrounding_prose() {
        let reply = "Here is my analysis:\n\n{\"suggestedGrade\": \"8\"}\n\nHope that helps!";
        assert_eq!(extract_json_object(reply).unwrap(), "{\"suggestedGrade\": \"8\"}");
    }

    #[test]
    fn json_extraction_is_greedy_over_nested_objects() {
        let reply = "{\"sections\": {\"tilgangur\": {\"present\": true}}}";
        assert_eq!(extract_json_object(reply).unwrap(), reply);
    }

    #[test]
    fn reply_without_json_is_distinct_error() {
        let err = extract_json_object("I cannot grade this report.").unwrap_err();
        assert!(matches!(err, LabError::ReplyNotJson));
    }

    #[test]
    fn wrong_shape_is_distinct_from_missing_json() {
        let err = parse_reply::<crate::report::AnalysisResult>("{\"sections\": 42}").unwrap_err();
        assert!(matches!(err, LabError::ReplyInvalidShape { .. }));
    }

    #[test]
    fn parse_reply_decodes_teacher_verdict() {
        let reply = r#"Greining:
        {"sections": {"tilgangur": {"present": true, "quality": "good", "note": "Gott"}},
         "suggestedGrade": "10", "totalPoints": 30, "maxTotalPoints": 33}"#;
        let result: AnalysisResult = parse_reply(reply).unwrap();
        assert_eq!(result.suggested_grade.as_deref(), Some("10"));
        assert_eq!(result.total_points, Some(30.0));
    }

    #[test]
    fn token_budget_follows_mode() {
        let teacher = AnalysisConfig::builder().mode(AppMode::Teacher).build().unwrap();
        let student = AnalysisConfig::builder().mode(AppMode::Student).build().unwrap();
        assert_eq!(build_options(&teacher).max_tokens, Some(2000));
        assert_eq!(build_options(&student).max_tokens, Some(4000));
        assert_eq!(build_options(&teacher).temperature, Some(0.2));
    }

    struct StalledProvider;

    #[async_trait::async_trait]
    impl edgequake_llm::LLMProvider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        fn model(&self) -> &str {
            "stalled-model"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<edgequake_llm::LLMResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(edgequake_llm::LLMResponse::new("late", self.model()))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<edgequake_llm::LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<edgequake_llm::LLMResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(edgequake_llm::LLMResponse::new("late", self.model()))
        }
    }

    #[tokio::test]
    async fn stalled_provider_resolves_to_timeout_not_a_hang() {
        let config = AnalysisConfig::builder()
            .provider(Arc::new(StalledProvider))
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let content = FileContent::Text {
            data: "Niðurstöður".into(),
        };

        let err = chat_reply("grade it", &content, &config).await.unwrap_err();
        assert!(matches!(err, LabError::Timeout { secs: 1 }));
    }

    #[tokio::test]
    async fn oversized_prompt_rejected_before_any_provider_work() {
        let config = AnalysisConfig::default();
        let huge = "x".repeat(MAX_SYSTEM_PROMPT_CHARS + 1);
        let content = FileContent::Text { data: "hi".into() };
        let err = chat_reply(&huge, &content, &config).await.unwrap_err();
        assert!(matches!(err, LabError::PromptTooLarge { .. }));
    }
}
