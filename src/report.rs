//! Typed analysis results: the shapes the model's JSON reply must match.
//!
//! Field names serialise in camelCase because the same JSON travels over the
//! HTTP API and into saved sessions; the wire format is the source of truth
//! and these types mirror it exactly.

use crate::config::AppMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality verdict for one section in teacher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "needs improvement")]
    NeedsImprovement,
    #[serde(rename = "unsatisfactory")]
    Unsatisfactory,
}

/// Teacher-mode verdict for a single rubric section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAnalysis {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    /// Short note in Icelandic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Teacher-mode result for one file.
///
/// A failed file still produces an `AnalysisResult`; only `filename` and
/// `error` are set then, so a batch of K files always yields K entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub filename: String,
    /// Keyed by section id; iteration order is stable but presentation
    /// order comes from the experiment config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<BTreeMap<String, SectionAnalysis>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Result entry for a file that could not be processed.
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        AnalysisResult {
            filename: filename.into(),
            sections: None,
            suggested_grade: None,
            total_points: None,
            max_total_points: None,
            quick_summary: None,
            error: Some(error.into()),
        }
    }
}

/// Student-mode feedback for a single rubric section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFeedback {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Student-mode feedback for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeedback {
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<BTreeMap<String, SectionFeedback>>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StudentFeedback {
    /// Feedback entry for a file that could not be processed.
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        StudentFeedback {
            filename: filename.into(),
            overall_assessment: None,
            sections: None,
            next_steps: Vec::new(),
            total_points: None,
            max_total_points: None,
            error: Some(error.into()),
        }
    }
}

/// Either kind of per-file outcome, tagged by the pipeline that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Teacher(AnalysisResult),
    Student(StudentFeedback),
}

impl Analysis {
    pub fn filename(&self) -> &str {
        match self {
            Analysis::Teacher(r) => &r.filename,
            Analysis::Student(f) => &f.filename,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Analysis::Teacher(r) => r.error.as_deref(),
            Analysis::Student(f) => f.error.as_deref(),
        }
    }

    /// Per-file failure entry in the shape the given mode expects.
    pub fn failed(mode: AppMode, filename: impl Into<String>, error: impl Into<String>) -> Self {
        match mode {
            AppMode::Teacher => Analysis::Teacher(AnalysisResult::failed(filename, error)),
            AppMode::Student => Analysis::Student(StudentFeedback::failed(filename, error)),
        }
    }
}

/// A saved teacher-mode grading run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSession {
    pub id: String,
    pub name: String,
    /// Experiment id the batch was graded against.
    pub experiment: String,
    pub timestamp: DateTime<Utc>,
    pub mode: AppMode,
    pub results: Vec<AnalysisResult>,
    pub file_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_uses_spaced_wire_names() {
        assert_eq!(
            serde_json::to_string(&Quality::NeedsImprovement).unwrap(),
            "\"needs improvement\""
        );
        let q: Quality = serde_json::from_str("\"unsatisfactory\"").unwrap();
        assert_eq!(q, Quality::Unsatisfactory);
    }

    #[test]
    fn result_parses_model_reply_shape() {
        let raw = r#"{
            "sections": {
                "tilgangur": {"present": true, "quality": "good", "note": "Skýrt", "points": 3, "maxPoints": 3},
                "fraedi": {"present": false, "quality": "unsatisfactory", "note": "Vantar"}
            },
            "suggestedGrade": "8",
            "totalPoints": 21.5,
            "maxTotalPoints": 33
        }"#;
        let result: AnalysisResult = serde_json::from_str(raw).unwrap();
        let sections = result.sections.unwrap();
        assert_eq!(sections["tilgangur"].points, Some(3.0));
        assert_eq!(sections["fraedi"].quality, Some(Quality::Unsatisfactory));
        assert_eq!(result.suggested_grade.as_deref(), Some("8"));
        assert_eq!(result.total_points, Some(21.5));
        assert!(result.error.is_none());
    }

    #[test]
    fn feedback_defaults_missing_lists_to_empty() {
        let raw = r#"{
            "overallAssessment": "Vel gert!",
            "sections": {"tilgangur": {"present": true}}
        }"#;
        let feedback: StudentFeedback = serde_json::from_str(raw).unwrap();
        assert!(feedback.next_steps.is_empty());
        let section = &feedback.sections.unwrap()["tilgangur"];
        assert!(section.strengths.is_empty());
        assert!(section.present);
    }

    #[test]
    fn failed_entry_carries_only_filename_and_error() {
        let result = AnalysisResult::failed("report.docx", "Unsupported file type");
        assert_eq!(result.filename, "report.docx");
        assert_eq!(result.error.as_deref(), Some("Unsupported file type"));
        assert!(result.sections.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("sections").is_none());
        assert_eq!(json["error"], "Unsupported file type");
    }

    #[test]
    fn analysis_accessors_cover_both_modes() {
        let teacher = Analysis::failed(AppMode::Teacher, "a.docx", "boom");
        let student = Analysis::failed(AppMode::Student, "b.pdf", "bust");
        assert_eq!(teacher.filename(), "a.docx");
        assert_eq!(student.filename(), "b.pdf");
        assert_eq!(teacher.error(), Some("boom"));
        assert_eq!(student.error(), Some("bust"));
    }

    #[test]
    fn session_serialises_camel_case() {
        let session = GradingSession {
            id: "session_1_abc".into(),
            name: "Bekkur 3A".into(),
            experiment: "jafnvaegi".into(),
            timestamp: Utc::now(),
            mode: AppMode::Teacher,
            results: vec![],
            file_count: 0,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("fileCount").is_some());
        assert_eq!(json["mode"], "teacher");
    }
}
