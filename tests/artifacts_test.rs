mod common;

use common::{config, lake, table_a, OneHotEmbedder};
use lakejoin::artifacts::{load_index, IndexArtifacts, GRID_FILE, PIVOTS_FILE, POSTINGS_FILE};
use lakejoin::error::JoinError;
use lakejoin::ingestion::InMemorySource;
use lakejoin::pipeline::{run_offline, run_online};
use std::fs;
use std::path::Path;

fn build_into(dir: &Path) {
    let (built, _) = run_offline(&lake(), &OneHotEmbedder::new(), &config()).unwrap();
    IndexArtifacts::from_build(&built.index, &built.catalog, &config())
        .unwrap()
        .save(dir)
        .unwrap();
}

#[test]
fn test_saved_index_answers_like_the_fresh_build() {
    let dir = tempfile::tempdir().unwrap();
    let (built, _) = run_offline(&lake(), &OneHotEmbedder::new(), &config()).unwrap();
    IndexArtifacts::from_build(&built.index, &built.catalog, &config())
        .unwrap()
        .save(dir.path())
        .unwrap();

    let loaded = load_index(dir.path(), &config()).unwrap();
    assert_eq!(loaded.index.projector().pivots(), built.index.projector().pivots());
    assert_eq!(loaded.index.grid(), built.index.grid());
    assert_eq!(loaded.index.postings().size(), built.index.postings().size());
    assert_eq!(loaded.catalog.len(), 2);
    assert_eq!(loaded.manifest.columns, 2);

    let query = InMemorySource::new(vec![table_a()]);
    let fresh = built.into_loaded(&config());
    let (expected, _) = run_online(&query, &OneHotEmbedder::new(), &fresh, &config()).unwrap();
    let (actual, _) = run_online(&query, &OneHotEmbedder::new(), &loaded, &config()).unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn test_truncated_embeddings_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    build_into(dir.path());

    // Drop the last two rows of B.col1 ("q", "w"); their postings go stale
    let mut artifacts = IndexArtifacts::load(dir.path()).unwrap();
    let b_id = artifacts
        .columns
        .iter()
        .find(|(_, c)| c.table.name() == "B")
        .map(|(id, _)| *id)
        .unwrap();
    artifacts.embeddings.get_mut(&b_id).unwrap().truncate(2);
    artifacts.save(dir.path()).unwrap();

    let loaded = load_index(dir.path(), &config()).unwrap();
    let query = InMemorySource::new(vec![table_a()]);
    let (results, report) = run_online(&query, &OneHotEmbedder::new(), &loaded, &config()).unwrap();

    assert!(report.stale_skipped >= 1);
    let b = results
        .iter()
        .find(|r| r.candidate_table.name() == "B")
        .unwrap();
    assert!((b.joinability - 0.5).abs() < 1e-12);
    assert!(b.is_joinable);
}

#[test]
fn test_unparseable_grid_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    build_into(dir.path());
    fs::write(dir.path().join(GRID_FILE), "{\"levels\": 3, \"bin_edges\": [[").unwrap();

    let result = load_index(dir.path(), &config());
    assert!(matches!(result, Err(JoinError::ArtifactCorruption(_))));
}

#[test]
fn test_missing_pivots_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    build_into(dir.path());
    fs::remove_file(dir.path().join(PIVOTS_FILE)).unwrap();

    let result = load_index(dir.path(), &config());
    assert!(matches!(result, Err(JoinError::ArtifactCorruption(_))));
}

#[test]
fn test_wrong_cell_arity_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    build_into(dir.path());
    fs::write(
        dir.path().join(POSTINGS_FILE),
        r#"[{"cell": [0, 1], "postings": [{"table": "A", "column": "col1", "row_id": 0}]}]"#,
    )
    .unwrap();

    let result = load_index(dir.path(), &config());
    assert!(matches!(result, Err(JoinError::ArtifactCorruption(_))));
}

#[test]
fn test_embedding_width_must_match_config() {
    let dir = tempfile::tempdir().unwrap();
    build_into(dir.path());

    let wider = lakejoin::config::Config {
        embedding_dim: 16,
        ..config()
    };
    let result = load_index(dir.path(), &wider);
    assert!(matches!(result, Err(JoinError::ArtifactCorruption(_))));
}
