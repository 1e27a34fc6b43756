//! Configuration types for report analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs between the CLI and the HTTP service, and to diff
//! two runs to understand why their verdicts differ.

use crate::error::LabError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Hard ceiling for the assembled system prompt, enforced before any network
/// call. Matches the limit the HTTP proxy applies server-side.
pub const MAX_SYSTEM_PROMPT_CHARS: usize = 50_000;

/// Which grading pipeline a request runs through.
///
/// The mode selects the system-prompt builder, the output-token budget and
/// the typed result shape ([`crate::report::AnalysisResult`] vs
/// [`crate::report::StudentFeedback`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Batch grading: presence + quality/points verdicts per section.
    Teacher,
    /// Single-report feedback: strengths, improvements, suggestions.
    Student,
}

impl AppMode {
    /// Output-token budget for this mode. Student feedback is verbose
    /// (per-section strengths/improvements lists) and needs the larger budget.
    pub fn max_tokens(self) -> usize {
        match self {
            AppMode::Teacher => 2000,
            AppMode::Student => 4000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppMode::Teacher => "teacher",
            AppMode::Student => "student",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppMode {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(AppMode::Teacher),
            "student" => Ok(AppMode::Student),
            other => Err(LabError::InvalidMode(other.to_string())),
        }
    }
}

/// Configuration for analysing lab reports.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use labgrader::{AnalysisConfig, AppMode};
///
/// let config = AnalysisConfig::builder()
///     .mode(AppMode::Student)
///     .model("claude-sonnet-4-20250514")
///     .api_timeout_secs(55)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Grading pipeline to run. Default: [`AppMode::Teacher`].
    pub mode: AppMode,

    /// LLM model identifier, e.g. "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    /// If None along with `provider`, auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Grading should be reproducible; low temperature keeps the model close
    /// to the rubric instead of improvising.
    pub temperature: f32,

    /// Per-request timeout in seconds. Default: 30.
    ///
    /// The request is raced against this window; on expiry the file gets a
    /// distinct timeout error, never a hang and never a truncated success.
    /// The HTTP service overrides this to its own deployment-specific window.
    pub api_timeout_secs: u64,

    /// Maximum rendered page dimension (width or height) in pixels. Default: 2000.
    ///
    /// Report pages are rasterised so the model can read equations and
    /// diagrams the text extractor misses. The cap bounds pdfium's pixel
    /// allocation independently of the physical page size; around 2000 px the
    /// render is sharp enough for handwritten annotations without blowing the
    /// image-upload budget of vision APIs.
    pub max_rendered_pixels: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AppMode::Teacher,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            api_timeout_secs: 30,
            max_rendered_pixels: 2000,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn mode(mut self, mode: AppMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, LabError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(LabError::InvalidConfig("Timeout must be ≥ 1s".into()));
        }
        if c.max_rendered_pixels < 100 {
            return Err(LabError::InvalidConfig(format!(
                "max_rendered_pixels must be ≥ 100, got {}",
                c.max_rendered_pixels
            )));
        }
        Ok(self.config)
    }
}
