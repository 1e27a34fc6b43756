//! Experiment (rubric) configuration.
//!
//! An [`ExperimentConfig`] is the static grading schema for one lab
//! experiment: which sections a report must contain, the criteria for each
//! quality level, point weights, and how points convert to a grade. It is
//! loaded once at start (from an embedded default or a JSON file) and never
//! mutated — prompt builders and the presentation layer both read it, and
//! section order is significant for both.

use crate::error::LabError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Natural-language criteria for the three quality levels of one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCriteria {
    pub good: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_improvement: Option<String>,
    pub unsatisfactory: String,
}

/// One graded dimension of a lab report (e.g. "Purpose", "Theory").
///
/// `id` must be unique within the experiment; the position in
/// [`ExperimentConfig::sections`] is the display and grading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSection {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria: SectionCriteria,
    /// Extra grading instruction appended to the prompt line for this section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_note: Option<String>,
    /// Maximum points for this section (points schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    /// How to distribute partial points within `max_points`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_guidance: Option<String>,
}

/// The worksheet the students followed, used to check completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worksheet {
    pub reaction: String,
    pub materials: Vec<String>,
    pub equipment: Vec<String>,
    pub steps: Vec<String>,
}

/// One band of the points → grade conversion table, e.g. "≥ 27 points → 10".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_points: f64,
    pub grade: String,
}

/// Static per-experiment grading schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub id: String,
    pub title: String,
    pub year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet: Option<Worksheet>,
    pub sections: Vec<ExperimentSection>,
    /// Ordered grade labels, best first (e.g. ["10", "8", "5", "0"]).
    pub grade_scale: Vec<String>,
    /// Points → grade conversion, ordered best band first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_conversion: Option<Vec<GradeBand>>,
}

impl ExperimentConfig {
    /// Load and validate an experiment definition from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| LabError::ExperimentLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config: ExperimentConfig =
            serde_json::from_str(&raw).map_err(|e| LabError::ExperimentLoadFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants: at least one section, unique section ids.
    pub fn validate(&self) -> Result<(), LabError> {
        if self.sections.is_empty() {
            return Err(LabError::InvalidConfig(format!(
                "Experiment '{}' has no sections",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.id.as_str()) {
                return Err(LabError::InvalidConfig(format!(
                    "Duplicate section id '{}' in experiment '{}'",
                    section.id, self.id
                )));
            }
        }
        Ok(())
    }

    /// Sum of section `max_points`, or None when the rubric carries no points.
    pub fn max_total_points(&self) -> Option<f64> {
        let points: Vec<f64> = self.sections.iter().filter_map(|s| s.max_points).collect();
        if points.is_empty() {
            None
        } else {
            Some(points.iter().sum())
        }
    }

    /// Built-in default experiment: chemical equilibrium (Le Chatelier),
    /// 3rd-year chemistry. Used by the CLI when no rubric file is given.
    pub fn default_equilibrium() -> Self {
        ExperimentConfig {
            id: "jafnvaegi".into(),
            title: "Jafnvægi í efnahvörfum".into(),
            year: 3,
            worksheet: Some(Worksheet {
                reaction: "Fe³⁺(aq) + SCN⁻(aq) ↔ FeSCN²⁺(aq)".into(),
                materials: vec![
                    "KSCN(s)".into(),
                    "0,002M KSCN lausn".into(),
                    "0,2 M Fe(NO₃)₃".into(),
                    "0,1 M AgNO₃ lausn".into(),
                ],
                equipment: vec![
                    "2 bikarglös".into(),
                    "6 tilraunaglös".into(),
                    "glasastandur".into(),
                    "dropateljarar".into(),
                ],
                steps: vec![
                    "Reikna út hvernig blanda skal lausnir".into(),
                    "Athuga KSCN lausn (litur og jónir)".into(),
                    "Bæta Fe(NO₃)₃ við KSCN og skrá litabreytingu".into(),
                    "Prófa áhrif KSCN, Fe(NO₃)₃, AgNO₃ og hitunar á jafnvægið".into(),
                ],
            }),
            sections: vec![
                ExperimentSection {
                    id: "tilgangur".into(),
                    name: "Tilgangur".into(),
                    description: "Clear 1-2 sentence statement of experiment goals".into(),
                    criteria: SectionCriteria {
                        good: "Skýr lýsing á markmiðum tilraunarinnar".into(),
                        needs_improvement: Some("Tilgangur til staðar en vantar smáatriði".into()),
                        unsatisfactory: "Mjög óljós eða vantar alveg".into(),
                    },
                    special_note: None,
                    max_points: Some(3.0),
                    point_guidance: Some("3 = skýr og fullkominn, 1.5 = ófullkominn, 0 = vantar".into()),
                },
                ExperimentSection {
                    id: "fraedi".into(),
                    name: "Fræðikafli".into(),
                    description: "Theory: equilibrium definition and Le Chatelier's principle, explained with general examples".into(),
                    criteria: SectionCriteria {
                        good: "Le Chatelier lögmál útskýrt með almennum dæmum, ekki bara nefnt".into(),
                        needs_improvement: Some("Nefnir áhrifaþætti en útskýrir ekki hvernig þeir virka".into()),
                        unsatisfactory: "Vantar skilgreiningu á efnajafnvægi eða Le Chatelier".into(),
                    },
                    special_note: Some("Theory must use general examples, not observations from this experiment".into()),
                    max_points: Some(7.5),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "taeki".into(),
                    name: "Tæki og efni".into(),
                    description: "Complete list matching the worksheet".into(),
                    criteria: SectionCriteria {
                        good: "Fullkominn listi sem passar við vinnuseðil".into(),
                        needs_improvement: Some("Listi til staðar en vantar eitt eða tvö atriði".into()),
                        unsatisfactory: "Mjög ófullkominn listi".into(),
                    },
                    special_note: None,
                    max_points: Some(1.5),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "framkvamd".into(),
                    name: "Framkvæmd".into(),
                    description: "References the worksheet with a brief procedure description; no calculations here".into(),
                    criteria: SectionCriteria {
                        good: "Vísar í vinnuseðil og gefur stutta lýsingu, engir útreikningar".into(),
                        needs_improvement: Some("Vinnuseðilsvísun of almenn eða einhverjir útreikningar hér".into()),
                        unsatisfactory: "Vantar vinnuseðilsvísun eða allir útreikningar á röngum stað".into(),
                    },
                    special_note: Some("Calculations belong only in the results section".into()),
                    max_points: Some(3.0),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "nidurstodur".into(),
                    name: "Niðurstöður".into(),
                    description: "All calculations, observations and Le Chatelier explanations for every test".into(),
                    criteria: SectionCriteria {
                        good: "Allir útreikningar og allar tilraunir skráðar með fullbúnum útskýringum".into(),
                        needs_improvement: Some("Flestar niðurstöður til staðar en vantar 1-2 útskýringar".into()),
                        unsatisfactory: "Vantar útreikninga eða margar útskýringar".into(),
                    },
                    special_note: None,
                    max_points: Some(10.5),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "lokaord".into(),
                    name: "Lokaorð".into(),
                    description: "Summary connecting results to theory, with uncertainty discussion".into(),
                    criteria: SectionCriteria {
                        good: "Samantekt tengir við fræði og ræðir óvissu, hnitmiðað".into(),
                        needs_improvement: Some("Tengsl við fræði til staðar en vantar umræðu um óvissu".into()),
                        unsatisfactory: "Samhengislaus eða tengist ekki fræðum".into(),
                    },
                    special_note: None,
                    max_points: Some(4.5),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "undirskrift".into(),
                    name: "Undirskrift".into(),
                    description: "Student signature present at the bottom of the report".into(),
                    criteria: SectionCriteria {
                        good: "Undirskrift til staðar neðst í skýrslu".into(),
                        needs_improvement: None,
                        unsatisfactory: "Undirskrift vantar eða er ekki neðst í skýrslu".into(),
                    },
                    special_note: Some("Binary check, either the name is there or it is not".into()),
                    max_points: Some(1.5),
                    point_guidance: None,
                },
                ExperimentSection {
                    id: "samhengi".into(),
                    name: "Heildarsamhengi".into(),
                    description: "Overall coherence between sections, no blank spaces or unfinished sentences".into(),
                    criteria: SectionCriteria {
                        good: "Kaflar tengjast saman, skýrslan er fullbúin og yfirlesin".into(),
                        needs_improvement: Some("Kaflar tengjast ekki vel eða virðist ekki vera lesin yfir".into()),
                        unsatisfactory: "Mjög lítið samhengi eða vantar stóra kafla".into(),
                    },
                    special_note: Some("Judge structure, not style; informal wording is fine".into()),
                    max_points: Some(1.5),
                    point_guidance: None,
                },
            ],
            grade_scale: vec!["10".into(), "8".into(), "5".into(), "0".into()],
            grade_conversion: Some(vec![
                GradeBand { min_points: 27.0, grade: "10".into() },
                GradeBand { min_points: 21.0, grade: "8".into() },
                GradeBand { min_points: 12.0, grade: "5".into() },
                GradeBand { min_points: 0.0, grade: "0".into() },
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_experiment_validates() {
        let config = ExperimentConfig::default_equilibrium();
        config.validate().expect("default rubric must be valid");
        assert_eq!(config.sections.len(), 8);
    }

    #[test]
    fn max_total_points_sums_sections() {
        let config = ExperimentConfig::default_equilibrium();
        assert_eq!(config.max_total_points(), Some(33.0));
    }

    #[test]
    fn duplicate_section_id_rejected() {
        let mut config = ExperimentConfig::default_equilibrium();
        let dup = config.sections[0].clone();
        config.sections.push(dup);
        assert!(matches!(
            config.validate(),
            Err(LabError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_sections_rejected() {
        let mut config = ExperimentConfig::default_equilibrium();
        config.sections.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip_preserves_section_order() {
        let config = ExperimentConfig::default_equilibrium();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExperimentConfig = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = back.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "tilgangur",
                "fraedi",
                "taeki",
                "framkvamd",
                "nidurstodur",
                "lokaord",
                "undirskrift",
                "samhengi"
            ]
        );
    }

    #[test]
    fn from_json_file_reports_missing_file() {
        let err = ExperimentConfig::from_json_file("/nonexistent/rubric.json").unwrap_err();
        assert!(matches!(err, LabError::ExperimentLoadFailed { .. }));
    }
}
