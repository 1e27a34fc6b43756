//! System-prompt builders for both grading pipelines.
//!
//! Prompts are assembled from the [`ExperimentConfig`] so the model always
//! grades against the active rubric: section list, quality criteria, point
//! weights and the grade conversion table all come from the experiment, never
//! from hardcoded text. Sections appear in rubric order.
//!
//! Both builders instruct the model to answer with a single JSON object whose
//! shape matches the typed results in [`crate::report`]; the reply parser
//! depends on that contract.

use crate::config::AppMode;
use crate::experiment::ExperimentConfig;
use std::fmt::Write;

/// User-message text sent alongside a photographed/scanned report.
pub const IMAGE_ANALYSIS_INSTRUCTION: &str = "Read this lab report and analyze it.";

/// User-message text sent after the page images of a PDF or Word report.
pub const PDF_ANALYSIS_INSTRUCTION: &str =
    "Analyze this lab report including any equations or diagrams visible in the images.";

/// Prefix for the extracted text block when page images accompany it.
pub const TEXT_CONTENT_PREFIX: &str = "Lab report text content:\n\n";

/// Build the system prompt for the given mode.
pub fn build_system_prompt(mode: AppMode, experiment: &ExperimentConfig) -> String {
    match mode {
        AppMode::Teacher => build_teacher_system_prompt(experiment),
        AppMode::Student => build_student_system_prompt(experiment),
    }
}

/// Teacher mode: fast, objective categorisation of each section.
pub fn build_teacher_system_prompt(experiment: &ExperimentConfig) -> String {
    let mut p = String::with_capacity(4096);
    p.push_str(
        "You are evaluating chemistry lab reports for teachers. \
         Categorize each section quickly and objectively.\n\n",
    );
    let _ = writeln!(p, "Experiment: {}\n", experiment.title);

    p.push_str(
        "For EACH section, determine:\n\
         1. Is it present? (yes/no)\n\
         2. If yes, quality: \"good\" / \"needs improvement\" / \"unsatisfactory\"\n",
    );
    if experiment.max_total_points().is_some() {
        p.push_str("3. Points earned, within the section's maximum\n");
    }

    p.push_str("\nSections to check:\n");
    for section in &experiment.sections {
        let _ = write!(p, "- {}: {}", section.name, section.description);
        if let Some(points) = section.max_points {
            let _ = write!(p, " (max {points} points)");
        }
        if let Some(note) = &section.special_note {
            let _ = write!(p, " {note}");
        }
        p.push('\n');
        if let Some(guidance) = &section.point_guidance {
            let _ = writeln!(p, "  Points: {guidance}");
        }
    }

    p.push_str(
        "\nQuality criteria:\n\
         - \"good\": Section complete, correct, well-explained\n\
         - \"needs improvement\": Section present but missing details or has minor errors\n\
         - \"unsatisfactory\": Section severely incomplete or major errors\n",
    );
    for section in &experiment.sections {
        let _ = writeln!(p, "\n{}:", section.name);
        let _ = writeln!(p, "- good: {}", section.criteria.good);
        if let Some(needs) = &section.criteria.needs_improvement {
            let _ = writeln!(p, "- needs improvement: {needs}");
        }
        let _ = writeln!(p, "- unsatisfactory: {}", section.criteria.unsatisfactory);
    }

    if let Some(conversion) = &experiment.grade_conversion {
        p.push_str("\nGrade conversion (total points earned):\n");
        for band in conversion {
            let _ = writeln!(p, "- {} or more points: grade {}", band.min_points, band.grade);
        }
    }

    p.push_str("\nIMPORTANT: All notes/comments must be in Icelandic!\n");

    p.push_str("\nRespond ONLY with JSON:\n{\n  \"sections\": {\n");
    let with_points = experiment.max_total_points().is_some();
    for (i, section) in experiment.sections.iter().enumerate() {
        let _ = write!(
            p,
            "    \"{}\": {{\"present\": true/false, \"quality\": \"good\"/\"needs improvement\"/\"unsatisfactory\", \"note\": \"stuttur texti á íslensku\"",
            section.id
        );
        if with_points {
            let _ = write!(
                p,
                ", \"points\": number, \"maxPoints\": {}, \"reasoning\": \"stutt rökstuðningur\"",
                section.max_points.unwrap_or(0.0)
            );
        }
        p.push('}');
        if i + 1 < experiment.sections.len() {
            p.push(',');
        }
        p.push('\n');
    }
    p.push_str("  },\n");
    if let Some(max_total) = experiment.max_total_points() {
        let _ = writeln!(p, "  \"totalPoints\": number,");
        let _ = writeln!(p, "  \"maxTotalPoints\": {max_total},");
    }
    let _ = writeln!(p, "  \"suggestedGrade\": \"{}\"", experiment.grade_scale.join("/"));
    p.push('}');
    p
}

/// Student mode: constructive, encouraging per-section feedback.
pub fn build_student_system_prompt(experiment: &ExperimentConfig) -> String {
    let mut p = String::with_capacity(4096);
    p.push_str(
        "You are helping chemistry students improve their lab reports. \
         Provide constructive, encouraging feedback in Icelandic.\n\n",
    );
    let _ = writeln!(p, "Experiment: {}\n", experiment.title);

    p.push_str("Review the student's lab report and provide helpful feedback for EACH section:\n\nSections to analyze:\n");
    for section in &experiment.sections {
        let _ = write!(p, "- {}: {}", section.name, section.description);
        if let Some(note) = &section.special_note {
            let _ = write!(p, "\n  {note}");
        }
        p.push('\n');
    }

    p.push_str(
        "\nFor each section:\n\
         1. Check if it's present\n\
         2. Identify strengths (what they did well)\n\
         3. Suggest specific improvements\n\
         4. Give actionable next steps\n\n\
         Be encouraging and constructive! Focus on helping students learn and improve.\n",
    );

    p.push_str("\nRespond ONLY with JSON:\n{\n  \"overallAssessment\": \"Brief encouraging overview in Icelandic (2-3 sentences)\",\n  \"sections\": {\n");
    for (i, section) in experiment.sections.iter().enumerate() {
        let _ = write!(
            p,
            "    \"{}\": {{\n      \"present\": true/false,\n      \"strengths\": [\"strength 1 in Icelandic\", \"strength 2 in Icelandic\"],\n      \"improvements\": [\"what needs work in Icelandic\"],\n      \"suggestions\": [\"specific actionable advice in Icelandic\"]\n    }}",
            section.id
        );
        if i + 1 < experiment.sections.len() {
            p.push(',');
        }
        p.push('\n');
    }
    p.push_str("  },\n  \"nextSteps\": [\"Next step 1 in Icelandic\", \"Next step 2 in Icelandic\"]\n}");
    p
}
