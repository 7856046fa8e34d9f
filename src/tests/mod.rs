use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::{
    backend::debug::{DebugDestination, Recorded},
    deploy::local::db::LocalDatabase,
    job::{self, JobError, JobExecutor, RootRun},
    progress::{BatchPhase, ProgressReporter, RootStatus},
    schema::{ExpansionMode, MappingSpec},
};

const TREE: &str = r#"
src_root[payload**]:
  root:
    a:        { a: integer }
    children: { children: text }
src_root.children:
  root_children:
    x:        { x: integer }
"#;

fn three_by_two() -> Vec<serde_json::Value> {
    vec![
        json!({"a": 10, "children": [{"x": 1}, {"x": 2}]}),
        json!({"a": 20, "children": [{"x": 3}, {"x": 4}]}),
        json!({"a": 30, "children": [{"x": 5}, {"x": 6}]}),
    ]
}

async fn source(payloads: &[serde_json::Value]) -> LocalDatabase {
    let db = LocalDatabase::open("sqlite::memory:").await.unwrap();
    sqlx::query("CREATE TABLE src_root (payload TEXT)")
        .execute(db.pool())
        .await
        .unwrap();
    for payload in payloads {
        sqlx::query("INSERT INTO src_root (payload) VALUES (?)")
            .bind(payload.to_string())
            .execute(db.pool())
            .await
            .unwrap();
    }
    db
}

/// Keeps the reporter's log lines.
#[derive(Default)]
struct Messages(Mutex<Vec<String>>);

impl Messages {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressReporter for Messages {
    fn set_phase(&self, _phase: BatchPhase) {}
    fn register_roots(&self, _roots: Vec<String>) {}
    fn update_root(&self, _root: &str, _status: RootStatus) {}
    fn log_info(&self, message: &str) {
        self.0.lock().unwrap().push(format!("info: {message}"));
    }
    fn log_warn(&self, message: &str) {
        self.0.lock().unwrap().push(format!("warn: {message}"));
    }
    fn log_error(&self, message: &str) {
        self.0.lock().unwrap().push(format!("error: {message}"));
    }
    fn finish(&self) {}
}

fn options(incremental: bool) -> job::Options {
    job::Options {
        incremental,
        ..Default::default()
    }
}

fn spec() -> MappingSpec {
    MappingSpec::from_yaml(TREE).unwrap()
}

async fn root_rows(db: &LocalDatabase) -> Vec<(i64, i64)> {
    sqlx::query_as("SELECT id, a FROM root ORDER BY id")
        .fetch_all(db.pool())
        .await
        .unwrap()
}

async fn child_rows(db: &LocalDatabase) -> Vec<(i64, i64, i64)> {
    sqlx::query_as("SELECT root__id, id, x FROM root_children ORDER BY id")
        .fetch_all(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn normalize_into_sqlite() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(db.client(), db.client(), options(false));
    executor.execute(&spec()).await.unwrap();

    assert_eq!(root_rows(&db).await, vec![(1, 10), (2, 20), (3, 30)]);
    assert_eq!(
        child_rows(&db).await,
        vec![
            (1, 1, 1),
            (1, 2, 2),
            (2, 3, 3),
            (2, 4, 4),
            (3, 5, 5),
            (3, 6, 6)
        ]
    );
    let children: Vec<(String,)> = sqlx::query_as("SELECT children FROM root ORDER BY id")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(children[0].0, r#"[{"x": 1}, {"x": 2}]"#);
}

#[tokio::test]
async fn full_refresh_recreates_tables() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(db.client(), db.client(), options(false));
    executor.execute(&spec()).await.unwrap();
    executor.execute(&spec()).await.unwrap();

    assert_eq!(root_rows(&db).await, vec![(1, 10), (2, 20), (3, 30)]);
    assert_eq!(child_rows(&db).await.len(), 6);
}

#[tokio::test]
async fn incremental_continues_ids() {
    let db = source(&three_by_two()).await;
    JobExecutor::new(db.client(), db.client(), options(true))
        .execute(&spec())
        .await
        .unwrap();
    JobExecutor::new(db.client(), db.client(), options(true))
        .execute(&spec())
        .await
        .unwrap();

    let roots = root_rows(&db).await;
    assert_eq!(
        roots.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );
    let children = child_rows(&db).await;
    assert_eq!(
        &children[6..],
        &[
            (4, 7, 1),
            (4, 8, 2),
            (5, 9, 3),
            (5, 10, 4),
            (6, 11, 5),
            (6, 12, 6)
        ]
    );
}

#[tokio::test]
async fn full_refresh_drops_before_create() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(db.client(), DebugDestination::default(), options(false));
    executor.execute(&spec()).await.unwrap();

    assert_eq!(
        executor.destination.recorded(),
        vec![
            Recorded::Run("DROP TABLE IF EXISTS root".into()),
            Recorded::Run("CREATE TABLE IF NOT EXISTS root (id bigint, a integer, children text)".into()),
            Recorded::Run("DROP TABLE IF EXISTS root_children".into()),
            Recorded::Run(
                "CREATE TABLE IF NOT EXISTS root_children (root__id bigint, id bigint, x integer)"
                    .into()
            ),
            Recorded::Scoped(
                r#"INSERT INTO root (id, a, children) VALUES (1, 10, '[{"x": 1}, {"x": 2}]'), (2, 20, '[{"x": 3}, {"x": 4}]'), (3, 30, '[{"x": 5}, {"x": 6}]')"#
                    .into()
            ),
            Recorded::Scoped(
                "INSERT INTO root_children (root__id, id, x) VALUES (1, 1, 1), (1, 2, 2), (2, 3, 3), (2, 4, 4), (3, 5, 5), (3, 6, 6)"
                    .into()
            ),
        ]
    );
}

#[tokio::test]
async fn incremental_probe_failure_seeds_zero() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(db.client(), DebugDestination::default(), options(true));
    executor.execute(&spec()).await.unwrap();

    let recorded = executor.destination.recorded();
    assert_eq!(
        &recorded[..2],
        &[
            Recorded::Probe("SELECT max(id) FROM root".into()),
            Recorded::Probe("SELECT max(id) FROM root_children".into()),
        ]
    );
    assert!(!recorded.iter().any(
        |entry| matches!(entry, Recorded::Run(statement) if statement.starts_with("DROP"))
    ));
    assert!(matches!(
        &recorded[4],
        Recorded::Scoped(statement) if statement.contains("VALUES (1, 10, ")
    ));
}

#[tokio::test]
async fn incremental_probe_seeds_counters() {
    let db = source(&three_by_two()).await;
    let destination = DebugDestination::default().with_max_id(41);
    let executor = JobExecutor::new(db.client(), destination, options(true));
    executor.execute(&spec()).await.unwrap();

    let recorded = executor.destination.recorded();
    assert!(matches!(
        &recorded[4],
        Recorded::Scoped(statement) if statement.contains("VALUES (42, 10, ")
    ));
    assert!(matches!(
        &recorded[5],
        Recorded::Scoped(statement) if statement.ends_with("VALUES (42, 42, 1), (42, 43, 2), (43, 44, 3), (43, 45, 4), (44, 46, 5), (44, 47, 6)")
    ));
}

#[tokio::test]
async fn row_wise_fallback() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(db.client(), DebugDestination::new("oracle"), options(false));
    executor.execute(&spec()).await.unwrap();

    let inserts = executor
        .destination
        .recorded()
        .into_iter()
        .filter(|entry| matches!(entry, Recorded::InsertRows { .. }))
        .collect::<Vec<_>>();
    assert_eq!(
        inserts,
        vec![
            Recorded::InsertRows {
                table: "root".into(),
                fields: vec!["id".into(), "a".into(), "children".into()],
                rows: vec![
                    r#"(1, 10, '[{"x": 1}, {"x": 2}]')"#.into(),
                    r#"(2, 20, '[{"x": 3}, {"x": 4}]')"#.into(),
                    r#"(3, 30, '[{"x": 5}, {"x": 6}]')"#.into(),
                ],
            },
            Recorded::InsertRows {
                table: "root_children".into(),
                fields: vec!["root__id".into(), "id".into(), "x".into()],
                rows: vec![
                    "(1, 1, 1)".into(),
                    "(1, 2, 2)".into(),
                    "(2, 3, 3)".into(),
                    "(2, 4, 4)".into(),
                    "(3, 5, 5)".into(),
                    "(3, 6, 6)".into(),
                ],
            },
        ]
    );
}

#[tokio::test]
async fn paginates_in_chunks() {
    let db = source(&three_by_two()).await;
    let options = job::Options {
        chunk_size: 2,
        ..Default::default()
    };
    let executor = JobExecutor::new(db.client(), DebugDestination::default(), options);
    executor.execute(&spec()).await.unwrap();

    let scoped = executor
        .destination
        .recorded()
        .into_iter()
        .filter_map(|entry| match entry {
            Recorded::Scoped(statement) => Some(statement),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(scoped.len(), 4);
    assert!(scoped[2].starts_with("INSERT INTO root (id, a, children) VALUES (3, 30, "));
    assert_eq!(
        scoped[3],
        "INSERT INTO root_children (root__id, id, x) VALUES (3, 5, 5), (3, 6, 6)"
    );
}

#[tokio::test]
async fn empty_source_only_creates_tables() {
    let db = source(&[]).await;
    let executor = JobExecutor::new(db.client(), db.client(), options(false));
    executor.execute(&spec()).await.unwrap();

    assert!(root_rows(&db).await.is_empty());
    assert!(child_rows(&db).await.is_empty());
}

#[tokio::test]
async fn preprocess_explodes_documents() {
    let db = source(&three_by_two()[..1]).await;
    let executor = JobExecutor::new(db.client(), db.client(), options(false))
        .with_preprocess(|document| vec![document.clone(), document])
        .with_reporter(Arc::new(crate::progress::NullReporter));
    executor.execute(&spec()).await.unwrap();

    assert_eq!(root_rows(&db).await, vec![(1, 10), (2, 10)]);
    assert_eq!(
        child_rows(&db).await,
        vec![(1, 1, 1), (1, 2, 2), (2, 3, 1), (2, 4, 2)]
    );
}

#[tokio::test]
async fn body_style_extracts_sub_fields() {
    let db = LocalDatabase::open("sqlite::memory:").await.unwrap();
    sqlx::query("CREATE TABLE src_orders (state TEXT, client TEXT, payload TEXT)")
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO src_orders VALUES (?, ?, ?)")
        .bind("open")
        .bind(json!({"name": "Ada", "address": {"city": "London"}}).to_string())
        .bind(json!({"kind": "order"}).to_string())
        .execute(db.pool())
        .await
        .unwrap();
    let spec = MappingSpec::from_yaml(
        r#"
src_orders:
  orders:
    state:                { state: text }
    client.name:          { client_name: text }
    client.address__city: { city: text }
    payload**:            { payload: text }
"#,
    )
    .unwrap();
    JobExecutor::new(db.client(), db.client(), options(false))
        .execute(&spec)
        .await
        .unwrap();

    let rows: Vec<(i64, String, String, String, String)> =
        sqlx::query_as("SELECT id, state, client_name, city, payload FROM orders")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![(
            1,
            "open".to_owned(),
            "Ada".to_owned(),
            "London".to_owned(),
            r#"[{"kind": "order"}]"#.to_owned()
        )]
    );
}

#[tokio::test]
async fn missing_source_table_fails() {
    let db = LocalDatabase::open("sqlite::memory:").await.unwrap();
    let executor = JobExecutor::new(db.client(), DebugDestination::default(), options(false));
    assert!(matches!(
        executor.execute(&spec()).await,
        Err(JobError::Source(_))
    ));
}

#[tokio::test]
async fn header_column_must_hold_object() {
    let db = source(&[json!([1, 2])]).await;
    let executor = JobExecutor::new(db.client(), DebugDestination::default(), options(false));
    assert!(matches!(
        executor.execute(&spec()).await,
        Err(JobError::Document(_))
    ));
}

#[tokio::test]
async fn bulk_write_failure_is_fatal() {
    let db = source(&three_by_two()).await;
    let messages = Arc::new(Messages::default());
    let executor = JobExecutor::new(
        db.client(),
        DebugDestination::default().with_failing_writes(),
        options(false),
    )
    .with_reporter(messages.clone());

    assert!(matches!(
        executor.execute(&spec()).await,
        Err(JobError::Destination(_))
    ));
    let scoped = executor
        .destination
        .recorded()
        .into_iter()
        .filter(|entry| matches!(entry, Recorded::Scoped(_)))
        .count();
    assert_eq!(scoped, 1);
    assert_eq!(
        messages.lines(),
        vec![
            "info: 3 records found in `src_root`".to_owned(),
            "error: Failed to normalize `src_root`: destination: write rejected: \
             `INSERT INTO root (id, a, children) VALUES (1, 10, '[{\"x\": 1}, {\"x\": 2}]'), \
             (2, 20, '[{\"x\": 3}, {\"x\": 4}]'), (3, 30, '[{\"x\": 5}, {\"x\": 6}]')`"
                .to_owned(),
        ]
    );
}

#[tokio::test]
async fn failed_flush_clears_every_buffer() {
    let db = source(&three_by_two()).await;
    let executor = JobExecutor::new(
        db.client(),
        DebugDestination::new("oracle").with_failing_writes(),
        options(false),
    );
    let spec = spec();
    let group = spec.group("src_root").unwrap();
    let mode = ExpansionMode::detect(&group);
    let mut run: RootRun = executor.initialize(&group).await.unwrap();

    assert!(matches!(
        executor.paginate(&group, &mode, &mut run).await,
        Err(JobError::Destination(_))
    ));
    assert!(run.accumulators.buffer("src_root").is_empty());
    assert!(run.accumulators.buffer("src_root.children").is_empty());
    assert_eq!(run.accumulators.last_id("src_root.children"), 6);

    let inserts = executor
        .destination
        .recorded()
        .into_iter()
        .filter(|entry| matches!(entry, Recorded::InsertRows { .. }))
        .count();
    assert_eq!(inserts, 1);
}

#[tokio::test]
async fn whole_blob_feeds_child_table() {
    let db = LocalDatabase::open("sqlite::memory:").await.unwrap();
    sqlx::query("CREATE TABLE src_events (name TEXT, payload TEXT)")
        .execute(db.pool())
        .await
        .unwrap();
    for (name, kind) in [("a", "x"), ("b", "y")] {
        sqlx::query("INSERT INTO src_events VALUES (?, ?)")
            .bind(name)
            .bind(json!({"kind": kind}).to_string())
            .execute(db.pool())
            .await
            .unwrap();
    }
    let spec = MappingSpec::from_yaml(
        r#"
src_events:
  events:
    name:      { name: text }
    payload**: { payload: text }
src_events.payload:
  event_payloads:
    kind:      { kind: text }
"#,
    )
    .unwrap();
    JobExecutor::new(db.client(), db.client(), options(false))
        .execute(&spec)
        .await
        .unwrap();

    let events: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM events ORDER BY id")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(events, vec![(1, "a".to_owned()), (2, "b".to_owned())]);
    let payloads: Vec<(i64, i64, String)> =
        sqlx::query_as("SELECT events__id, id, kind FROM event_payloads ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert_eq!(
        payloads,
        vec![(1, 1, "x".to_owned()), (2, 2, "y".to_owned())]
    );
}
