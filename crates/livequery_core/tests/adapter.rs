//! Integration tests for the database adapter over a callback-style driver.

use livequery_core::{
    CoreError, DriverError, FieldType, Fields, QualifiedTablename, Row, SerdeSchema, Statement,
    TransactionMode,
};
use livequery_testkit::{init_testable, main_table, tablename_set_strategy};
use proptest::prelude::*;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, PartialEq)]
struct Bar {
    i: i64,
}

#[tokio::test]
async fn running_a_write_publishes_its_tables() {
    let (_conn, notifier, adapter) = init_testable("test.db");
    assert!(notifier.notifications().is_empty());

    adapter
        .run(&Statement::new("update bars set i = 1"))
        .await
        .unwrap();

    assert_eq!(notifier.published_tables(), vec![vec![main_table("bars")]]);
    assert_eq!(notifier.notifications()[0].db_name, "test.db");
}

#[tokio::test]
async fn running_a_read_only_statement_publishes_nothing() {
    let (conn, notifier, adapter) = init_testable("test.db");

    let result = adapter
        .run(&Statement::new("select foo from bars"))
        .await
        .unwrap();

    assert_eq!(result.rows_affected, 0);
    assert_eq!(conn.transactions()[0].mode, TransactionMode::ReadOnly);
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn write_after_a_read_in_one_statement_publishes() {
    let (conn, notifier, adapter) = init_testable("test.db");

    adapter
        .run(&Statement::new("select 1; delete from bars"))
        .await
        .unwrap();

    assert_eq!(conn.transactions()[0].mode, TransactionMode::ReadWrite);
    assert_eq!(notifier.published_tables(), vec![vec![main_table("bars")]]);
}

#[tokio::test]
async fn query_and_raw_never_publish() {
    let (_conn, notifier, adapter) = init_testable("test.db");

    adapter
        .query(&Statement::new("select i from bars"), &SerdeSchema::<Bar>::new())
        .await
        .unwrap();
    adapter
        .raw(&Statement::new("delete from bars"))
        .await
        .unwrap();

    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn query_returns_typed_rows() {
    let (_conn, _notifier, adapter) = init_testable("test.db");

    let bars = adapter
        .query(&Statement::new("select foo from bars"), &SerdeSchema::<Bar>::new())
        .await
        .unwrap();

    assert_eq!(bars, vec![Bar { i: 0 }]);
}

#[tokio::test]
async fn raw_returns_rows_verbatim() {
    let (conn, _notifier, adapter) = init_testable("test.db");
    let rows = vec![
        Row::new().with("i", 1).with("name", "a"),
        Row::new().with("i", 2).with("name", "b"),
    ];
    conn.set_rows(rows.clone());

    let result = adapter.raw(&Statement::new("select * from bars")).await.unwrap();
    assert_eq!(result, rows);
}

#[tokio::test]
async fn query_fails_whole_call_on_one_bad_row() {
    let (conn, _notifier, adapter) = init_testable("test.db");
    conn.set_rows(vec![
        Row::new().with("i", 1),
        Row::new().with("i", "not a number"),
        Row::new().with("i", 3),
    ]);

    let result = adapter
        .query(&Statement::new("select i from bars"), &SerdeSchema::<Bar>::new())
        .await;

    match result {
        Err(CoreError::SchemaValidation(e)) => assert_eq!(e.row, 1),
        other => panic!("expected schema validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn bound_fields_coerce_before_validation() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Todo {
        id: i64,
        done: bool,
    }

    let (conn, _notifier, adapter) = init_testable("test.db");
    conn.set_rows(vec![
        Row::new().with("id", 1).with("done", 0),
        Row::new().with("id", 2).with("done", 1),
    ]);
    let todos = adapter.with_table_schema(
        Fields::new()
            .field("id", FieldType::Integer)
            .field("done", FieldType::Bool),
    );

    let stmt = Statement::new("select id, done from todos");
    let typed = todos.query(&stmt, &SerdeSchema::<Todo>::new()).await.unwrap();
    assert_eq!(
        typed,
        vec![Todo { id: 1, done: false }, Todo { id: 2, done: true }]
    );

    // The unbound adapter still sees integers.
    assert!(adapter
        .query(&stmt, &SerdeSchema::<Todo>::new())
        .await
        .is_err());
}

#[tokio::test]
async fn driver_failure_publishes_nothing() {
    let (conn, notifier, adapter) = init_testable("test.db");
    conn.fail_next(DriverError::with_code("database is locked", 5));

    let err = adapter
        .run(&Statement::new("update bars set i = 1"))
        .await
        .unwrap_err();

    match err {
        CoreError::Driver(e) => assert_eq!(e.code, Some(5)),
        other => panic!("expected driver error, got {other:?}"),
    }
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn delayed_completion_publishes_after_commit() {
    let (conn, notifier, adapter) = init_testable("test.db");
    conn.set_delay(Some(Duration::from_millis(20)));

    let stmt = Statement::new("insert into bars values (1)");
    let run = adapter.run(&stmt);
    assert!(notifier.notifications().is_empty());
    run.await.unwrap();

    assert_eq!(notifier.published_tables(), vec![vec![main_table("bars")]]);
}

#[tokio::test]
async fn table_names_of_statement() {
    let (_conn, _notifier, adapter) = init_testable("test.db");

    assert_eq!(
        adapter.table_names(&Statement::new("select foo from bar")),
        vec![QualifiedTablename::new("main", "bar")]
    );
}

#[tokio::test]
async fn run_in_transaction_publishes_union_once() {
    let (conn, notifier, adapter) = init_testable("test.db");

    let result = adapter
        .run_in_transaction(&[
            Statement::new("insert into foos values (1)"),
            Statement::new("select * from items"),
            Statement::new("update bars set i = 2"),
            Statement::new("update foos set i = 3"),
        ])
        .await
        .unwrap();

    assert_eq!(result.rows_affected, 3);
    assert_eq!(conn.transactions().len(), 1);
    assert_eq!(
        notifier.published_tables(),
        vec![vec![main_table("foos"), main_table("bars")]]
    );
}

fn write_statement(tables: &[QualifiedTablename]) -> Statement {
    let mut sql = format!("insert into {}.{} select * from t", tables[0].namespace, tables[0].tablename);
    for table in &tables[1..] {
        sql.push_str(&format!(" join {}.{}", table.namespace, table.tablename));
    }
    Statement::new(sql)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn published_tables_cover_written_tables(tables in tablename_set_strategy(5)) {
        prop_assume!(!tables.is_empty());
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (_conn, notifier, adapter) = init_testable("test.db");
            adapter.run(&write_statement(&tables)).await.unwrap();

            let published = notifier.published_tables();
            assert_eq!(published.len(), 1);
            for table in &tables {
                assert!(published[0].contains(table), "missing {table}");
            }
        });
    }
}
