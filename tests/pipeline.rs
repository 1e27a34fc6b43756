//! End-to-end tests for the pieces that run without an LLM provider:
//! extraction dispatch, equation scanning, rubric loading and the session
//! store on disk.

use labgrader::{
    extract_equations, extract_file, grade_files, AnalysisConfig, AppMode, DirStore,
    ExperimentConfig, FileContent, GradingSession, SessionStore, SESSION_PREFIX,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::test]
async fn batch_of_unsupported_files_yields_one_error_entry_each() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for name in ["one.txt", "two.xlsx", "three.zip"] {
        let p = dir.path().join(name);
        tokio::fs::write(&p, b"not a report").await.unwrap();
        paths.push(p);
    }

    let experiment = ExperimentConfig::default_equilibrium();
    let config = AnalysisConfig::default();
    let results = grade_files(&paths, &experiment, &config, None).await;

    assert_eq!(results.len(), 3);
    for (result, expected) in results.iter().zip(["one.txt", "two.xlsx", "three.zip"]) {
        assert_eq!(result.filename(), expected);
        assert!(result.error().unwrap().contains("Unsupported"));
    }
}

#[tokio::test]
async fn image_files_extract_without_external_tools() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.webp");
    tokio::fs::write(&path, b"webp bytes").await.unwrap();

    let content = extract_file(&path, 2000).await.unwrap();
    match content {
        FileContent::Image { media_type, .. } => assert_eq!(media_type, "image/webp"),
        other => panic!("expected image, got {}", other.kind()),
    }
}

#[test]
fn equation_scan_handles_pandoc_style_markdown() {
    let md = "\
# Niðurstöður

Mólstyrkur reiknast $M = \\frac{mol}{L}$. Aftur: $M = \\frac{mol}{L}$.
Jafnvægisfastinn er $$K_c = \\frac{[FeSCN^{2+}]}{[Fe^{3+}][SCN^-]}$$
";
    let eqs = extract_equations(md);
    assert_eq!(eqs.len(), 2);
    assert!(eqs[0].starts_with("K_c"));
    assert_eq!(eqs[1], "M = \\frac{mol}{L}");
}

#[test]
fn rubric_loads_from_json_file_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rubric.json");

    let original = ExperimentConfig::default_equilibrium();
    std::fs::write(&path, serde_json::to_string_pretty(&original).unwrap()).unwrap();

    let loaded = ExperimentConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded.id, original.id);
    assert_eq!(loaded.sections.len(), original.sections.len());
    assert_eq!(loaded.max_total_points(), original.max_total_points());
}

#[test]
fn rubric_with_duplicate_ids_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");

    let mut config = ExperimentConfig::default_equilibrium();
    let dup = config.sections[0].clone();
    config.sections.push(dup);
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

    assert!(ExperimentConfig::from_json_file(&path).is_err());
}

#[tokio::test]
async fn sessions_survive_a_store_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let store = SessionStore::new(Arc::new(DirStore::new(dir.path())));
        let session = GradingSession {
            id: SessionStore::generate_session_id(),
            name: "Bekkur 3A".into(),
            experiment: "jafnvaegi".into(),
            timestamp: chrono::Utc::now(),
            mode: AppMode::Teacher,
            results: vec![],
            file_count: 0,
        };
        store.save_session(&session).await.unwrap();
        session.id
    };

    // A fresh store over the same directory sees the session.
    let reopened = SessionStore::new(Arc::new(DirStore::new(dir.path())));
    let loaded = reopened.load_session(&id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Bekkur 3A");
}

#[tokio::test]
async fn corrupt_session_file_on_disk_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path()
            .join(format!("{}damaged.json", SESSION_PREFIX.replace(':', "__"))),
        "{truncated",
    )
    .unwrap();

    let store = SessionStore::new(Arc::new(DirStore::new(dir.path())));
    let session = GradingSession {
        id: "intact".into(),
        name: "ok".into(),
        experiment: "jafnvaegi".into(),
        timestamp: chrono::Utc::now(),
        mode: AppMode::Teacher,
        results: vec![],
        file_count: 0,
    };
    store.save_session(&session).await.unwrap();

    let sessions = store.load_saved_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "intact");
}

#[tokio::test]
async fn nonexistent_paths_fail_per_file_not_per_batch() {
    let experiment = ExperimentConfig::default_equilibrium();
    let config = AnalysisConfig::default();
    let paths = vec![PathBuf::from("/no/such/report.png")];

    let results = grade_files(&paths, &experiment, &config, None).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].error().is_some());
}
