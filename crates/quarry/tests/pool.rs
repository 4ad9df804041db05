//! Worker-keyed pool behaviour against a recording driver.

mod common;

use common::{Call, database};
use quarry::{ConnectionPool, Dialect, PoolStats, QuarryError, WorkerId};
use std::sync::Arc;

fn pool(high_water: usize) -> (ConnectionPool, common::Recorder) {
    let (db, rec) = database(Dialect::MySql);
    (ConnectionPool::new(Arc::new(db), None, high_water), rec)
}

#[tokio::test]
async fn same_worker_shares_a_connection() {
    let (pool, rec) = pool(4);
    let worker = WorkerId::key("job-1");

    let a = pool.checkout(worker.clone()).await.unwrap();
    let b = pool.checkout(worker.clone()).await.unwrap();
    a.begin().await.unwrap();
    assert_eq!(b.depth().await, 1);
    b.commit().await.unwrap();

    assert_eq!(rec.connects(), 1);
    assert_eq!(rec.count(&Call::Close), 0);
    assert_eq!(
        pool.stats().await,
        PoolStats {
            connections: 1,
            checked_out: 1,
            high_water: 4
        }
    );

    drop(a);
    drop(b);
    assert_eq!(pool.stats().await.checked_out, 0);
}

#[tokio::test]
async fn different_workers_get_different_connections() {
    let (pool, rec) = pool(4);

    let a = pool.checkout(WorkerId::key("a")).await.unwrap();
    let b = pool.checkout(WorkerId::key("b")).await.unwrap();
    a.table("users").where_eq("id", 1).get(&a).await.unwrap();
    b.table("users").where_eq("id", 2).get(&b).await.unwrap();

    assert_eq!(rec.connects(), 2);
    assert_eq!(pool.stats().await.connections, 2);
}

#[tokio::test]
async fn recycling_skips_busy_connections() {
    let (pool, rec) = pool(1);

    let a = pool.checkout(WorkerId::key("a")).await.unwrap();
    a.begin().await.unwrap();
    drop(a);

    let b = pool.checkout(WorkerId::key("b")).await.unwrap();
    let c = pool.checkout(WorkerId::key("c")).await.unwrap();

    // a is in a transaction, b and c are checked out
    assert_eq!(pool.stats().await.connections, 3);
    assert_eq!(rec.count(&Call::Close), 0);

    drop(b);
    drop(c);
    assert_eq!(pool.recycle_idle().await, 2);
    assert_eq!(rec.count(&Call::Close), 2);
    assert_eq!(pool.stats().await.connections, 1);

    let a = pool.checkout(WorkerId::key("a")).await.unwrap();
    assert_eq!(a.depth().await, 1);
    a.commit().await.unwrap();
    assert_eq!(rec.count(&Call::Commit), 1);
    assert_eq!(rec.count(&Call::Close), 2);
}

#[tokio::test]
async fn release_only_closes_idle_connections() {
    let (pool, rec) = pool(4);
    let worker = WorkerId::key("w");

    let handle = pool.checkout(worker.clone()).await.unwrap();
    assert!(!pool.release(&worker).await);

    drop(handle);
    assert!(pool.release(&worker).await);
    assert_eq!(rec.count(&Call::Close), 1);
    assert!(!pool.release(&worker).await);
}

#[tokio::test]
async fn pooled_connection_rejects_other_connection_names() {
    let (pool, _rec) = pool(4);
    let conn = pool.checkout_current().await.unwrap();
    assert_eq!(conn.worker(), &WorkerId::current());

    let err = conn
        .table("users")
        .on_connection("reporting")
        .get(&conn)
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Usage(_)));
}
