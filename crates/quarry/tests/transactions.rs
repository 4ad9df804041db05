//! Transaction nesting and the `transaction!` macros against a recording driver.

mod common;

use common::{Call, database, database_with};
use quarry::{ConnectionConfig, Database, DatabaseConfig, Dialect, QuarryError, QuarryResult, Value};

#[tokio::test]
async fn nested_begin_only_reaches_driver_once() {
    let (db, rec) = database(Dialect::MySql);

    let tx = db.begin(None).await.unwrap();
    tx.begin().await.unwrap();
    assert_eq!(tx.depth().await, 2);

    tx.table("accounts")
        .where_eq("id", 1)
        .decrement(&tx, "balance", 100)
        .await
        .unwrap();

    tx.rollback().await.unwrap();
    assert!(tx.in_transaction().await);
    assert_eq!(tx.depth().await, 1);
    assert_eq!(rec.count(&Call::Rollback), 0);

    tx.commit().await.unwrap();
    assert!(!tx.in_transaction().await);

    assert_eq!(rec.connects(), 1);
    assert_eq!(rec.count(&Call::Begin), 1);
    assert_eq!(rec.count(&Call::Commit), 1);
    assert_eq!(rec.count(&Call::Close), 1);
    assert_eq!(
        rec.statements(),
        vec!["UPDATE `accounts` SET `balance` = `balance` - ? WHERE `accounts`.`id` = ?".to_string()]
    );
}

#[tokio::test]
async fn commit_without_transaction_is_usage_error() {
    let (db, _rec) = database(Dialect::Sqlite);
    let tx = db.begin(None).await.unwrap();
    tx.commit().await.unwrap();

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, QuarryError::Usage(_)));
}

#[tokio::test]
async fn statements_in_a_transaction_share_one_connection() {
    let (db, rec) = database(Dialect::Postgres);
    let tx = db.begin(None).await.unwrap();

    tx.table("users").where_eq("id", 1).get(&tx).await.unwrap();
    tx.table("users").where_eq("id", 2).get(&tx).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(rec.connects(), 1);
    assert_eq!(
        rec.calls(),
        vec![
            Call::Begin,
            Call::Query(
                r#"SELECT * FROM "users" WHERE "users"."id" = $1"#.to_string(),
                vec![Value::Int(1)]
            ),
            Call::Query(
                r#"SELECT * FROM "users" WHERE "users"."id" = $1"#.to_string(),
                vec![Value::Int(2)]
            ),
            Call::Commit,
            Call::Close,
        ]
    );
}

async fn transfer(db: &Database, amount: i64) -> QuarryResult<u64> {
    quarry::transaction!(db, tx, {
        if amount <= 0 {
            return Err(QuarryError::validation("amount must be positive"));
        }
        let debited = tx
            .table("accounts")
            .where_eq("id", 1)
            .decrement(&tx, "balance", amount)
            .await?;
        tx.table("accounts")
            .where_eq("id", 2)
            .increment(&tx, "balance", amount)
            .await?;
        Ok::<_, QuarryError>(debited)
    })
}

#[tokio::test]
async fn transaction_macro_commits_on_ok() {
    let (db, rec) = database(Dialect::MySql);
    rec.set_rows_affected(1);

    assert_eq!(transfer(&db, 100).await.unwrap(), 1);
    assert_eq!(rec.count(&Call::Begin), 1);
    assert_eq!(rec.count(&Call::Commit), 1);
    assert_eq!(rec.count(&Call::Rollback), 0);
    assert_eq!(rec.statements().len(), 2);
}

#[tokio::test]
async fn transaction_macro_rolls_back_on_err() {
    let (db, rec) = database(Dialect::MySql);

    let err = transfer(&db, 0).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(rec.count(&Call::Commit), 0);
    assert_eq!(rec.count(&Call::Rollback), 1);
    assert!(rec.statements().is_empty());
}

#[tokio::test]
async fn failed_rollback_is_reported_with_the_original_error() {
    let (db, rec) = database(Dialect::MySql);
    rec.fail_rollback();

    let err = transfer(&db, -5).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("amount must be positive"));
    assert!(message.contains("(rollback failed: "));
}

#[tokio::test]
async fn failed_begin_closes_the_connection_and_keeps_its_error() {
    let (db, rec) = database(Dialect::Postgres);
    rec.fail_begin();
    rec.fail_close();

    let err = db.begin(None).await.unwrap_err();
    assert!(err.to_string().contains("begin refused"));
    assert_eq!(rec.calls(), vec![Call::Begin, Call::Close]);
}

fn two_connections() -> DatabaseConfig {
    DatabaseConfig::new("main")
        .with_connection("main", ConnectionConfig::new("mysql"))
        .with_connection("reporting", ConnectionConfig::new("mysql").prefix("rpt_"))
}

async fn archive(db: &Database) -> QuarryResult<String> {
    quarry::transaction_on!(db, "reporting", tx, {
        tx.table("events").where_eq("id", 9).get(&tx).await?;
        Ok::<_, QuarryError>(tx.name().to_string())
    })
}

#[tokio::test]
async fn transaction_on_uses_the_named_connection() {
    let (db, rec) = database_with(two_connections(), Dialect::MySql);

    assert_eq!(archive(&db).await.unwrap(), "reporting");
    assert_eq!(
        rec.statements(),
        vec!["SELECT * FROM `rpt_events` WHERE `rpt_events`.`id` = ?".to_string()]
    );
}

#[tokio::test]
async fn transaction_rejects_builders_for_other_connections() {
    let (db, rec) = database_with(two_connections(), Dialect::MySql);
    let tx = db.begin(Some("reporting")).await.unwrap();

    let err = db.query_on("main", "users").get(&tx).await.unwrap_err();
    assert!(matches!(err, QuarryError::Usage(_)));

    tx.rollback().await.unwrap();
    assert!(rec.statements().is_empty());
}

#[tokio::test]
async fn database_transaction_closure() {
    let (db, rec) = database(Dialect::Sqlite);
    rec.set_last_insert_id(3);

    let id = db
        .transaction(None, |tx| async move {
            let row = tx.table("users").create(&tx, [("name", "alice")]).await?;
            row.try_get::<i64>("id")
        })
        .await
        .unwrap();
    assert_eq!(id, 3);
    assert_eq!(rec.count(&Call::Commit), 1);

    let err = db
        .transaction(None, |tx| async move {
            tx.table("users").where_op("id", "~~", 1).get(&tx).await
        })
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(rec.count(&Call::Rollback), 1);
}
