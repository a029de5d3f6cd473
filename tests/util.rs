#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use ekklesia_lib::migrate::apply_migrations;
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

/// In-memory database with the full schema applied.
pub async fn migrated_pool() -> SqlitePool {
    let pool = temp_pool().await;
    apply_migrations(&pool).await.expect("apply migrations");
    pool
}

pub async fn add_member(pool: &SqlitePool, name: &str) -> String {
    let data = json!({ "full_name": name });
    let row = ekklesia_lib::commands::create_command(
        pool,
        "members",
        data.as_object().cloned().unwrap(),
    )
    .await
    .expect("create member");
    row.get("id").and_then(Value::as_str).unwrap().to_string()
}

pub async fn add_event(pool: &SqlitePool, title: &str, starts_on: &str) -> String {
    let data = json!({ "title": title, "starts_on": starts_on });
    let row = ekklesia_lib::commands::create_command(
        pool,
        "events",
        data.as_object().cloned().unwrap(),
    )
    .await
    .expect("create event");
    row.get("id").and_then(Value::as_str).unwrap().to_string()
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}
