//! Builder execution through `Database` against a recording driver.

mod common;

use common::{Call, database, database_with, row};
use quarry::{
    ConnectionConfig, Database, DatabaseConfig, Dialect, QuarryError, SoftDelete, Table, Timestamps, Value,
};
use serde::Deserialize;
use std::time::Duration;

fn users_with_soft_delete() -> Table {
    Table::new("users").with_scope(SoftDelete::new())
}

#[tokio::test]
async fn soft_delete_turns_delete_into_update() {
    let (db, rec) = database(Dialect::MySql);
    rec.set_rows_affected(1);

    let affected = db
        .query_table(&users_with_soft_delete())
        .where_eq("id", 1)
        .delete(&db)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let calls = rec.calls();
    match &calls[0] {
        Call::Execute(sql, bindings) => {
            assert_eq!(
                sql,
                "UPDATE `users` SET `deleted_at` = ? WHERE `users`.`id` = ?"
            );
            assert!(matches!(bindings[0], Value::Timestamp(_)));
            assert_eq!(bindings[1], Value::Int(1));
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn soft_delete_filters_and_force_deletes() {
    let (db, rec) = database(Dialect::MySql);
    let users = db.query_table(&users_with_soft_delete()).where_eq("id", 1);

    users.get(&db).await.unwrap();
    users.force_delete(&db).await.unwrap();
    users.restore(&db).await.unwrap();

    assert_eq!(
        rec.statements(),
        vec![
            "SELECT * FROM `users` WHERE `users`.`id` = ? AND `users`.`deleted_at` IS NULL".to_string(),
            "DELETE FROM `users` WHERE `users`.`id` = ?".to_string(),
            "UPDATE `users` SET `deleted_at` = ? WHERE `users`.`id` = ?".to_string(),
        ]
    );
}

#[tokio::test]
async fn delete_without_where_is_refused() {
    let (db, rec) = database(Dialect::MySql);

    let err = db.table("users").delete(&db).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("allow_delete_all"));

    let err = db
        .query_table(&users_with_soft_delete())
        .delete(&db)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(rec.connects(), 0);

    db.table("users").allow_delete_all().delete(&db).await.unwrap();
    assert_eq!(rec.statements(), vec!["DELETE FROM `users`".to_string()]);
}

#[tokio::test]
async fn delete_with_only_empty_groups_is_refused() {
    let (db, rec) = database(Dialect::MySql);

    let err = db
        .table("users")
        .where_group(|q| q)
        .where_group(|q| q.where_group(|q| q))
        .delete(&db)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(rec.connects(), 0);

    rec.set_rows_affected(1);
    let n = db
        .table("users")
        .where_group(|q| q)
        .where_group(|q| q.where_eq("id", 4))
        .delete(&db)
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        rec.statements(),
        vec!["DELETE FROM `users` WHERE (`users`.`id` = ?)".to_string()]
    );
}

#[tokio::test]
async fn create_uses_last_insert_id_on_mysql() {
    let (db, rec) = database(Dialect::MySql);
    rec.set_rows_affected(1);
    rec.set_last_insert_id(42);

    let created = db
        .table("users")
        .create(&db, [("name", "alice")])
        .await
        .unwrap();
    assert_eq!(created.get("id"), Some(&Value::Int(42)));
    assert_eq!(created.get("name"), Some(&Value::from("alice")));
    assert_eq!(
        rec.statements(),
        vec!["INSERT INTO `users` (`name`) VALUES (?)".to_string()]
    );
}

#[tokio::test]
async fn create_queries_identity_on_mssql() {
    let (db, rec) = database(Dialect::Mssql);
    rec.push_rows(vec![row([("id", Value::Int(7))])]);

    let created = db
        .table("users")
        .create(&db, [("name", "bob")])
        .await
        .unwrap();
    assert_eq!(created.get("id"), Some(&Value::Int(7)));
    assert_eq!(
        rec.statements(),
        vec![
            "INSERT INTO [users] ([name]) VALUES (@P1)".to_string(),
            "SELECT @@Identity AS id".to_string(),
        ]
    );
}

#[tokio::test]
async fn create_returns_the_returning_row_on_postgres() {
    let (db, rec) = database(Dialect::Postgres);
    let stored = row([
        ("id", Value::Int(5)),
        ("name", Value::from("carol")),
        ("created_at", Value::Null),
    ]);
    rec.push_rows(vec![stored.clone()]);

    let created = db
        .table("users")
        .create(&db, [("name", "carol")])
        .await
        .unwrap();
    assert_eq!(created, stored);
    assert_eq!(
        rec.statements(),
        vec![r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING *"#.to_string()]
    );
}

#[tokio::test]
async fn timestamps_are_filled_on_insert() {
    let (db, rec) = database(Dialect::Sqlite);
    let posts = Table::new("posts").with_scope(Timestamps::new());

    db.query_table(&posts)
        .create(&db, [("title", "hello")])
        .await
        .unwrap();
    match &rec.calls()[0] {
        Call::Execute(sql, bindings) => {
            assert_eq!(
                sql,
                r#"INSERT INTO "posts" ("title", "created_at", "updated_at") VALUES (?, ?, ?)"#
            );
            assert_eq!(bindings.len(), 3);
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn missing_driver_is_reported() {
    let config = DatabaseConfig::new("main").with_connection("main", ConnectionConfig::new("mssql"));
    let db = Database::new(config).unwrap();

    let err = db.table("users").get(&db).await.unwrap_err();
    assert!(err.is_driver_unavailable());
}

#[tokio::test]
async fn builder_errors_surface_before_any_io() {
    let (db, rec) = database(Dialect::MySql);

    let err = db
        .table("users")
        .where_op("id", "~~", 1)
        .get(&db)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = db.query_on("reporting", "users").get(&db).await.unwrap_err();
    assert!(err.is_configuration());

    assert_eq!(rec.connects(), 0);
}

#[tokio::test]
async fn slow_statement_times_out_and_is_cancelled() {
    let (db, rec) = database(Dialect::MySql);
    rec.set_delay(Duration::from_millis(500));

    let err = db
        .table("users")
        .timeout(Duration::from_millis(20))
        .get(&db)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(rec.count(&Call::Cancel), 1);
    assert_eq!(rec.count(&Call::Close), 1);
}

#[tokio::test]
async fn configured_timeout_applies_without_builder_override() {
    let config = DatabaseConfig::new("main").with_connection(
        "main",
        ConnectionConfig::new("mysql").query_timeout(Duration::from_millis(20)),
    );
    let (db, rec) = database_with(config, Dialect::MySql);
    rec.set_delay(Duration::from_millis(500));

    let err = db.table("users").get(&db).await.unwrap_err();
    assert!(matches!(err, QuarryError::Timeout(_)));
}

#[tokio::test]
async fn single_row_reads() {
    let (db, rec) = database(Dialect::MySql);
    let users = db.table("users");

    rec.push_rows(vec![row([("id", Value::Int(1))])]);
    let first = users.first(&db).await.unwrap();
    assert_eq!(first.and_then(|r| r.get("id").cloned()), Some(Value::Int(1)));

    rec.push_rows(Vec::new());
    let err = users.find_or_fail(&db, 9).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no row in 'users' with id = 9"));

    rec.push_rows(vec![row([("id", Value::Int(1))]), row([("id", Value::Int(2))])]);
    let err = users.sole(&db).await.unwrap_err();
    assert!(matches!(err, QuarryError::MultipleRecords(2)));

    rec.push_rows(Vec::new());
    users.last(&db).await.unwrap();

    assert_eq!(
        rec.statements(),
        vec![
            "SELECT * FROM `users` LIMIT 1".to_string(),
            "SELECT * FROM `users` WHERE `users`.`id` = ? LIMIT 1".to_string(),
            "SELECT * FROM `users` LIMIT 2".to_string(),
            "SELECT * FROM `users` ORDER BY `users`.`id` DESC LIMIT 1".to_string(),
        ]
    );
}

#[tokio::test]
async fn aggregates_and_plucks() {
    let (db, rec) = database(Dialect::MySql);
    let users = db.table("users").where_eq("active", true).order_by("name").limit(5);

    rec.push_rows(vec![row([("count", Value::Int(3))])]);
    assert_eq!(users.fetch_count(&db).await.unwrap(), 3);

    rec.push_rows(vec![row([("age", Value::Null)])]);
    assert_eq!(users.fetch_max(&db, "age").await.unwrap(), Value::Null);

    rec.push_rows(vec![
        row([("name", Value::from("a"))]),
        row([("name", Value::from("b"))]),
    ]);
    assert_eq!(
        users.pluck(&db, "name").await.unwrap(),
        vec![Value::from("a"), Value::from("b")]
    );

    rec.push_rows(Vec::new());
    assert!(!users.exists(&db).await.unwrap());

    let statements = rec.statements();
    assert_eq!(
        statements[0],
        "SELECT COUNT(*) AS count FROM `users` WHERE `users`.`active` = ?"
    );
    assert_eq!(
        statements[1],
        "SELECT MAX(`users`.`age`) AS age FROM `users` WHERE `users`.`active` = ?"
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

#[tokio::test]
async fn rows_deserialize_into_structs() {
    let (db, rec) = database(Dialect::Postgres);
    rec.push_rows(vec![row([("id", Value::Int(1)), ("name", Value::from("ann"))])]);

    let users: Vec<User> = db.table("users").get_as(&db).await.unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "ann".to_string()
        }]
    );
}

#[tokio::test]
async fn prefix_is_applied_from_the_connection() {
    let config = DatabaseConfig::new("main")
        .with_connection("main", ConnectionConfig::new("sqlite").prefix("app_"));
    let (db, rec) = database_with(config, Dialect::Sqlite);
    rec.set_rows_affected(2);

    let n = db
        .table("users")
        .where_in("id", [1, 2])
        .update(&db, [("active", false)])
        .await
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(
        rec.statements(),
        vec![r#"UPDATE "app_users" SET "active" = ? WHERE "app_users"."id" IN (?, ?)"#.to_string()]
    );
}
