//! Statement-order contracts for the mutation engine, asserted against a
//! mock connection's transaction log. Each mutation is a fixed sequence of
//! set-based statements; these tests pin both the order and the bound
//! values without needing a live database.

use std::collections::BTreeMap;

use closure_table::{AdvisoryLockStrategy, SubtreePolicy, TreeConfig, TreeEngine, TreeError, TreeOptions};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Statement, Transaction, Value};

const FIND: &str = r#"SELECT n."id" AS "id", n."parent_id" AS "parent_id", n."level" AS "level", n."name" AS "name" FROM "nodes" AS n WHERE n."id" = $1"#;
const LEVEL_OF: &str = r#"SELECT n."level" AS "level" FROM "nodes" AS n WHERE n."id" = $1"#;
const CREATE: &str = r#"INSERT INTO "nodes" ("name", "parent_id", "level") VALUES ($1, $2, $3) RETURNING "id" AS "id""#;
const UPDATE_PARENT_AND_LEVEL: &str = r#"UPDATE "nodes" SET "parent_id" = $2, "level" = $3 WHERE "id" = $1"#;
const SHIFT_LEVELS: &str = r#"UPDATE "nodes" SET "level" = "nodes"."level" + $2 FROM "nodes_ancestors" WHERE "nodes_ancestors"."node_id" = "nodes"."id" AND "nodes_ancestors"."ancestor_id" = $1"#;
const REPARENT_CHILDREN: &str = r#"UPDATE "nodes" SET "parent_id" = $2 WHERE "parent_id" = $1"#;
const REMOVE: &str = r#"DELETE FROM "nodes" WHERE "id" = $1"#;
const CHILD_COUNT: &str = r#"SELECT COUNT(*) AS "count" FROM "nodes" WHERE "parent_id" = $1"#;

const CYCLE_PROBE: &str = r#"SELECT 1 AS "hit" FROM "nodes_ancestors" WHERE "node_id" = $1 AND "ancestor_id" = $2 LIMIT 1"#;
const LINK_COPY: &str = r#"INSERT INTO "nodes_ancestors" ("node_id", "ancestor_id") SELECT $1, "ancestor_id" FROM "nodes_ancestors" WHERE "node_id" = $2"#;
const LINK_DIRECT: &str = r#"INSERT INTO "nodes_ancestors" ("node_id", "ancestor_id") VALUES ($1, $2)"#;
const UNLINK_NODE: &str = r#"DELETE FROM "nodes_ancestors" WHERE "node_id" = $1"#;
const DETACH_AS_ANCESTOR: &str = r#"DELETE FROM "nodes_ancestors" WHERE "ancestor_id" = $1"#;
const SEVER_CHAIN: &str = r#"DELETE FROM "nodes_ancestors" WHERE "ancestor_id" IN (SELECT up."ancestor_id" FROM "nodes_ancestors" AS up WHERE up."node_id" = $1) AND "node_id" IN (SELECT down."node_id" FROM "nodes_ancestors" AS down WHERE down."ancestor_id" = $1)"#;
const REATTACH_CHAIN: &str = r#"INSERT INTO "nodes_ancestors" ("node_id", "ancestor_id") SELECT down."node_id", up."ancestor_id" FROM "nodes_ancestors" AS up CROSS JOIN "nodes_ancestors" AS down WHERE up."node_id" = $1 AND down."ancestor_id" = $1"#;
const REMOVE_SUBTREE: &str = r#"DELETE FROM "nodes" USING "nodes_ancestors" WHERE "nodes_ancestors"."node_id" = "nodes"."id" AND "nodes_ancestors"."ancestor_id" = $1"#;

fn engine() -> TreeEngine {
    let config = TreeOptions::default()
        .advisory_lock_strategy(AdvisoryLockStrategy::Disabled)
        .apply(TreeConfig::new("nodes"));
    TreeEngine::new(config)
}

fn node_row(
    id: i64,
    parent_id: Option<i64>,
    level: i32,
    name: &str,
) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([
        ("id", Value::from(id)),
        ("parent_id", Value::from(parent_id)),
        ("level", Value::from(level)),
        ("name", Value::from(name.to_owned())),
    ])
}

fn level_row(level: i32) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([("level", Value::from(level))])
}

fn id_row(id: i64) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([("id", Value::from(id))])
}

fn count_row(count: i64) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([("count", Value::from(count))])
}

fn exec_ok(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

fn stmt<I>(sql: &str, values: I) -> Statement
where
    I: IntoIterator<Item = Value>,
{
    Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
}

#[tokio::test]
async fn insert_root_is_a_single_create() -> Result<(), TreeError> {
    let db: DatabaseConnection = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![id_row(1)]])
        .into_connection();

    let row = engine().insert(&db, "root", None).await?;
    assert_eq!(row.id, 1);
    assert_eq!(row.level, 0);
    assert!(row.is_root());

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([stmt(
            CREATE,
            ["root".into(), Option::<i64>::None.into(), 0i32.into()],
        )])]
    );
    Ok(())
}

#[tokio::test]
async fn insert_child_links_after_create() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![level_row(0)], vec![id_row(2)]])
        .append_exec_results([exec_ok(0), exec_ok(1)])
        .into_connection();

    let row = engine().insert(&db, "child", Some(1)).await?;
    assert_eq!(row.level, 1);

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(LEVEL_OF, [1i64.into()]),
            stmt(CREATE, ["child".into(), Some(1i64).into(), 1i32.into()]),
            stmt(LINK_COPY, [2i64.into(), 1i64.into()]),
            stmt(LINK_DIRECT, [2i64.into(), 1i64.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn move_with_subtree_rewrites_chains_in_order() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(3, Some(1), 1, "a")],
            vec![], // cycle probe finds nothing
            vec![level_row(0)],
        ])
        .append_exec_results([
            exec_ok(2),
            exec_ok(1),
            exec_ok(1),
            exec_ok(1),
            exec_ok(2),
            exec_ok(1),
            exec_ok(2),
        ])
        .into_connection();

    engine()
        .move_node(&db, 3, Some(9), SubtreePolicy::WithSubtree)
        .await?;

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(FIND, [3i64.into()]),
            stmt(CYCLE_PROBE, [9i64.into(), 3i64.into()]),
            stmt(LEVEL_OF, [9i64.into()]),
            stmt(SEVER_CHAIN, [3i64.into()]),
            stmt(UNLINK_NODE, [3i64.into()]),
            stmt(LINK_COPY, [3i64.into(), 9i64.into()]),
            stmt(LINK_DIRECT, [3i64.into(), 9i64.into()]),
            stmt(REATTACH_CHAIN, [3i64.into()]),
            stmt(UPDATE_PARENT_AND_LEVEL, [3i64.into(), Some(9i64).into(), 1i32.into()]),
            stmt(SHIFT_LEVELS, [3i64.into(), 0i32.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn move_promoting_children_excises_before_relocating() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(3, Some(1), 1, "a")],
            vec![],
            vec![level_row(0)],
        ])
        .append_exec_results([
            exec_ok(2),
            exec_ok(2),
            exec_ok(2),
            exec_ok(0),
            exec_ok(1),
            exec_ok(1),
            exec_ok(1),
            exec_ok(0),
            exec_ok(1),
        ])
        .into_connection();

    engine()
        .move_node(&db, 3, Some(9), SubtreePolicy::PromoteChildren)
        .await?;

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(FIND, [3i64.into()]),
            stmt(CYCLE_PROBE, [9i64.into(), 3i64.into()]),
            stmt(LEVEL_OF, [9i64.into()]),
            stmt(REPARENT_CHILDREN, [3i64.into(), Some(1i64).into()]),
            stmt(SHIFT_LEVELS, [3i64.into(), (-1i32).into()]),
            stmt(DETACH_AS_ANCESTOR, [3i64.into()]),
            stmt(SEVER_CHAIN, [3i64.into()]),
            stmt(UNLINK_NODE, [3i64.into()]),
            stmt(LINK_COPY, [3i64.into(), 9i64.into()]),
            stmt(LINK_DIRECT, [3i64.into(), 9i64.into()]),
            stmt(REATTACH_CHAIN, [3i64.into()]),
            stmt(UPDATE_PARENT_AND_LEVEL, [3i64.into(), Some(9i64).into(), 1i32.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn move_to_unchanged_parent_is_a_noop() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![node_row(3, Some(9), 1, "a")]])
        .into_connection();

    engine()
        .move_node(&db, 3, Some(9), SubtreePolicy::WithSubtree)
        .await?;

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([stmt(FIND, [3i64.into()])])]
    );
    Ok(())
}

#[tokio::test]
async fn move_under_own_descendant_is_rejected_before_any_write() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(3, Some(1), 1, "a")],
            vec![BTreeMap::from([("hit", Value::from(1i32))])],
        ])
        .into_connection();

    let err = engine()
        .move_node(&db, 3, Some(5), SubtreePolicy::WithSubtree)
        .await
        .unwrap_err();

    assert!(matches!(err, TreeError::CyclicMove { node: 3, target: 5 }));
}

#[tokio::test]
async fn move_under_self_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![node_row(3, Some(1), 1, "a")]])
        .into_connection();

    let err = engine()
        .move_node(&db, 3, Some(3), SubtreePolicy::WithSubtree)
        .await
        .unwrap_err();

    assert!(matches!(err, TreeError::CyclicMove { node: 3, target: 3 }));
}

#[tokio::test]
async fn cascading_delete_removes_subtree_then_node() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(3, Some(1), 1, "a")],
            vec![count_row(2)],
        ])
        .append_exec_results([exec_ok(4), exec_ok(1), exec_ok(1)])
        .into_connection();

    let removed = engine().delete(&db, 3, SubtreePolicy::WithSubtree).await?;
    assert_eq!(removed, 5);

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(FIND, [3i64.into()]),
            stmt(CHILD_COUNT, [3i64.into()]),
            stmt(REMOVE_SUBTREE, [3i64.into()]),
            stmt(UNLINK_NODE, [3i64.into()]),
            stmt(REMOVE, [3i64.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn promoting_delete_shifts_levels_before_detaching() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(3, Some(1), 1, "a")],
            vec![count_row(2)],
        ])
        .append_exec_results([exec_ok(2), exec_ok(2), exec_ok(2), exec_ok(1), exec_ok(1)])
        .into_connection();

    let removed = engine()
        .delete(&db, 3, SubtreePolicy::PromoteChildren)
        .await?;
    assert_eq!(removed, 1);

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(FIND, [3i64.into()]),
            stmt(CHILD_COUNT, [3i64.into()]),
            stmt(REPARENT_CHILDREN, [3i64.into(), Some(1i64).into()]),
            stmt(SHIFT_LEVELS, [3i64.into(), (-1i32).into()]),
            stmt(DETACH_AS_ANCESTOR, [3i64.into()]),
            stmt(UNLINK_NODE, [3i64.into()]),
            stmt(REMOVE, [3i64.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn leaf_delete_still_unlinks_defensively() -> Result<(), TreeError> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![node_row(7, Some(1), 1, "leaf")],
            vec![count_row(0)],
        ])
        .append_exec_results([exec_ok(1), exec_ok(1)])
        .into_connection();

    let removed = engine().delete(&db, 7, SubtreePolicy::WithSubtree).await?;
    assert_eq!(removed, 1);

    assert_eq!(
        db.into_transaction_log(),
        [Transaction::many([
            stmt(FIND, [7i64.into()]),
            stmt(CHILD_COUNT, [7i64.into()]),
            stmt(UNLINK_NODE, [7i64.into()]),
            stmt(REMOVE, [7i64.into()]),
        ])]
    );
    Ok(())
}

#[tokio::test]
async fn missing_node_surfaces_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<BTreeMap<&'static str, Value>>::new()])
        .into_connection();

    let err = engine()
        .delete(&db, 42, SubtreePolicy::WithSubtree)
        .await
        .unwrap_err();

    assert!(matches!(err, TreeError::NodeNotFound(42)));
}

#[tokio::test]
async fn insert_under_missing_parent_fails() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<BTreeMap<&'static str, Value>>::new()])
        .into_connection();

    let err = engine().insert(&db, "orphan", Some(99)).await.unwrap_err();
    assert!(matches!(err, TreeError::ParentNotFound(99)));
}
