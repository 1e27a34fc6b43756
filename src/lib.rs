//! # labgrader
//!
//! Grade chemistry lab reports with vision language models.
//!
//! Students hand in reports as Word documents, PDFs or phone photos; teachers
//! need every report checked against the same rubric. This crate normalises
//! whatever arrives into one content record, sends it to a VLM with a
//! rubric-derived prompt and returns a typed verdict per file.
//!
//! ## Pipeline
//!
//! ```text
//! files → extract (pandoc / pdfium / base64) → prompt + content assembly
//!       → LLM call (timeout-raced) → JSON reply parse → typed results
//! ```
//!
//! Two pipelines share that machinery: **teacher mode** batch-grades a class
//! set (presence, quality and points per section, suggested grade) and
//! **student mode** gives one report encouraging feedback. Batches are
//! strictly order-preserving — K files in, K results out, failed files carry
//! their error in place.
//!
//! ## Quick start
//!
//! ```no_run
//! use labgrader::{grade_files, AnalysisConfig, AppMode, ExperimentConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() {
//!     let experiment = ExperimentConfig::default_equilibrium();
//!     let config = AnalysisConfig::builder()
//!         .mode(AppMode::Teacher)
//!         .build()
//!         .unwrap();
//!
//!     let paths = vec![PathBuf::from("report1.docx"), PathBuf::from("report2.pdf")];
//!     let results = grade_files(&paths, &experiment, &config, None).await;
//!     for result in &results {
//!         match result.error() {
//!             None => println!("{}: graded", result.filename()),
//!             Some(e) => println!("{}: {}", result.filename(), e),
//!         }
//!     }
//! }
//! ```
//!
//! The `server` feature adds the HTTP proxy service ([`server`]) used by the
//! browser frontend; the `cli` feature (default) builds the `labgrade`
//! binary.

pub mod analyze;
pub mod batch;
pub mod config;
pub mod content;
pub mod convert;
pub mod error;
pub mod experiment;
pub mod extract;
pub mod prompts;
pub mod report;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

pub use analyze::{analyze_content, chat_reply, ChatOutcome, DEFAULT_MODEL};
pub use batch::{grade_files, GradingProgress, NoopProgress, ProgressCallback};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, AppMode, MAX_SYSTEM_PROMPT_CHARS};
pub use content::{FileContent, PageImage};
pub use convert::{convert_docx, extract_equations, pandoc_available, ConvertedDocument};
pub use error::{FileError, LabError};
pub use experiment::{ExperimentConfig, ExperimentSection, GradeBand, Worksheet};
pub use extract::extract_file;
pub use report::{Analysis, AnalysisResult, GradingSession, SectionAnalysis, StudentFeedback};
pub use session::{DirStore, KeyValueStore, MemoryStore, SessionStore, SESSION_PREFIX};
