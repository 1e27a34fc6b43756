//! Error types for the labgrader library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LabError`] — **Fatal for the current operation**: the request cannot
//!   proceed at all (bad mode, oversized prompt, converter tool missing,
//!   provider not configured). Returned as `Err(LabError)` from the gateway
//!   and converter entry points.
//!
//! * [`FileError`] — **Non-fatal**: a single uploaded file failed (unsupported
//!   type, unreadable document, per-file analysis failure) but the rest of the
//!   batch is fine. Converted into the `error` field of that file's result so
//!   a batch of K files always produces exactly K entries.
//!
//! The separation lets the batch loop continue past bad files without relying
//! on catching panics or downcasting, and lets the HTTP layer map each fatal
//! variant to a precise status code.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the labgrader library.
///
/// Per-file failures use [`FileError`] and are stored in the corresponding
/// result entry rather than propagated here.
#[derive(Debug, Error)]
pub enum LabError {
    // ── Input validation (rejected before any external call) ──────────────
    /// Mode string was neither "teacher" nor "student".
    #[error("Invalid mode '{0}': expected 'teacher' or 'student'")]
    InvalidMode(String),

    /// System prompt exceeds the hard ceiling enforced at the boundary.
    #[error("System prompt too large: {len} chars (limit {limit})")]
    PromptTooLarge { len: usize, limit: usize },

    /// Builder or loaded configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Experiment definition file could not be read or decoded.
    #[error("Failed to load experiment '{path}': {detail}")]
    ExperimentLoadFailed { path: PathBuf, detail: String },

    // ── External tools ────────────────────────────────────────────────────
    /// A required converter binary is not on PATH. Reported distinctly so
    /// the operator can fix the environment; never conflated with user error.
    #[error("'{tool}' is not installed on this server. Install {tool} to process documents.")]
    ToolNotInstalled { tool: &'static str },

    /// The converter ran but exited non-zero or produced unusable output.
    #[error("Document conversion failed: {detail}")]
    ConversionFailed { detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No API key / provider could be resolved. Server-side this maps to a
    /// 500 "API key not configured" without ever forwarding upstream.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error; status and message are passed through
    /// from upstream when available.
    #[error("LLM API error: {message}")]
    ApiError {
        status: Option<u16>,
        message: String,
    },

    /// The analysis request did not resolve within the timeout window.
    /// Distinct from generic network failure so callers can show a
    /// specific "took too long" message.
    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Model-reply parsing ───────────────────────────────────────────────
    /// No `{...}` JSON-shaped substring was found in the model's reply.
    #[error("Could not interpret model response: no JSON object found")]
    ReplyNotJson,

    /// A JSON substring was found but did not match the expected result shape.
    #[error("Model response did not match the expected shape: {detail}")]
    ReplyInvalidShape { detail: String },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file in a batch.
///
/// Stored as the `error` string of that file's result entry. The batch loop
/// continues to the next file regardless of the variant.
#[derive(Debug, Clone, Error)]
pub enum FileError {
    /// The file matched none of the supported types (.docx, .pdf, image/*).
    #[error("Unsupported file type: '{filename}'")]
    Unsupported { filename: String },

    /// Extraction failed (unreadable document, converter failure, bad image).
    #[error("Could not extract content from '{filename}': {detail}")]
    Extraction { filename: String, detail: String },

    /// The analysis gateway failed for this file.
    #[error("Analysis failed for '{filename}': {detail}")]
    Analysis { filename: String, detail: String },
}
