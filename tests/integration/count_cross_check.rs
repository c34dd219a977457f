use std::{path::Path, sync::Arc, time::Duration};

use games_query_contract::{
    catalog_db::{CountSource, SqliteCatalog},
    probe::HttpProbe,
    report::MemoryReporter,
    rules::{CrossFieldMode, RuleRegistry, catalog::GAMES_TABLE},
    runner::{MatrixRunner, RunOptions},
};
use rusqlite::{Connection, params};
use tempfile::tempdir;

use super::support::{GamesStub, catalog};

fn seed_catalog(path: &Path, skip_id: Option<i64>) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE {GAMES_TABLE} (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            price REAL NOT NULL,
            age_group_id INTEGER NOT NULL,
            difficulty_id INTEGER NOT NULL,
            duration_id INTEGER NOT NULL,
            player_count_id INTEGER NOT NULL
        );"
    ))
    .unwrap();
    for game in catalog().iter().filter(|game| Some(game.id) != skip_id) {
        conn.execute(
            &format!(
                "INSERT INTO {GAMES_TABLE}
                 (id, title, price, age_group_id, difficulty_id, duration_id, player_count_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                game.id,
                game.title,
                game.price,
                game.age_group,
                game.difficulty,
                game.duration,
                game.player_count
            ],
        )
        .unwrap();
    }
}

#[tokio::test]
async fn listing_sizes_agree_with_the_catalog() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db.sqlite3");
    seed_catalog(&db, None);

    let stub = GamesStub::spawn().await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_secs(5)).unwrap();
    let registry = Arc::new(RuleRegistry::games(CrossFieldMode::Strict).unwrap());
    let source: Arc<dyn CountSource> = Arc::new(SqliteCatalog::open(&db).unwrap());
    let reporter = Arc::new(MemoryReporter::new());

    let summary = MatrixRunner::new(Arc::new(probe), registry, RunOptions::default())
        .with_count_source(source)
        .run(reporter.clone())
        .await;

    assert!(summary.is_success(), "count checks: {:#?}", summary.count_checks);
    let checked: Vec<&str> = summary
        .count_checks
        .iter()
        .map(|check| check.parameter.as_str())
        .collect();
    assert_eq!(
        checked,
        vec!["age_group", "difficulty", "duration", "player_count"]
    );
    let age_group = &summary.count_checks[0];
    assert_eq!(age_group.value, "1");
    assert_eq!(age_group.column, "age_group_id");
    assert_eq!(age_group.catalog_count, 2);
    assert_eq!(age_group.observed_count, Some(2));
    assert_eq!(reporter.count_checks().len(), 4);
}

#[tokio::test]
async fn diverging_catalog_fails_the_run_without_touching_case_outcomes() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db.sqlite3");
    // "Solo Run" is the only game with player_count 1
    seed_catalog(&db, Some(3));

    let stub = GamesStub::spawn().await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_secs(5)).unwrap();
    let registry = Arc::new(RuleRegistry::games(CrossFieldMode::Strict).unwrap());
    let source: Arc<dyn CountSource> = Arc::new(SqliteCatalog::open(&db).unwrap());

    let summary = MatrixRunner::new(Arc::new(probe), registry, RunOptions::default())
        .with_count_source(source)
        .run(Arc::new(MemoryReporter::new()))
        .await;

    assert_eq!(summary.mismatched, 0);
    assert_eq!(summary.probe_errors, 0);
    assert!(!summary.is_success());

    let player_count = summary
        .count_checks
        .iter()
        .find(|check| check.parameter == "player_count")
        .unwrap();
    assert_eq!(player_count.catalog_count, 0);
    assert_eq!(player_count.observed_count, Some(1));
    assert!(!player_count.matches());
}
