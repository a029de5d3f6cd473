use serde_json::{Map, Value};
use sqlx::SqlitePool;

use crate::{repo, validation::validate_row, AppResult};

pub async fn list_command(
    pool: &SqlitePool,
    table: &str,
    order_by: Option<&str>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Value>> {
    repo::list_active(pool, table, order_by, limit, offset)
        .await
        .map_err(|err| {
            err.with_context("operation", "list")
                .with_context("table", table.to_string())
        })
}

pub async fn get_command(pool: &SqlitePool, table: &str, id: &str) -> AppResult<Option<Value>> {
    let result = async {
        let mut conn = pool.acquire().await?;
        repo::get_active(&mut conn, table, id).await
    }
    .await;
    result.map_err(|err| err.with_contexts([("operation", "get"), ("table", table), ("id", id)]))
}

pub async fn create_command(
    pool: &SqlitePool,
    table: &str,
    data: Map<String, Value>,
) -> AppResult<Value> {
    let result = async {
        validate_row(table, &data)?;
        let mut conn = pool.acquire().await?;
        repo::insert(&mut conn, table, data).await
    }
    .await;
    match result {
        Ok(row) => {
            let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
            tracing::info!(target: "ekklesia", event = "row_created", table = table, id = %id);
            Ok(row)
        }
        Err(err) => Err(err
            .with_context("operation", "create")
            .with_context("table", table.to_string())),
    }
}

pub async fn update_command(
    pool: &SqlitePool,
    table: &str,
    id: &str,
    data: Map<String, Value>,
) -> AppResult<Value> {
    let result = async {
        validate_row(table, &data)?;
        let mut conn = pool.acquire().await?;
        repo::update(&mut conn, table, id, data).await
    }
    .await;
    result.map_err(|err| {
        err.with_contexts([("operation", "update"), ("table", table), ("id", id)])
    })
}

pub async fn delete_command(pool: &SqlitePool, table: &str, id: &str) -> AppResult<()> {
    repo::set_deleted_at(pool, table, id)
        .await
        .map_err(|err| err.with_contexts([("operation", "delete"), ("table", table), ("id", id)]))
}

pub async fn restore_command(pool: &SqlitePool, table: &str, id: &str) -> AppResult<()> {
    repo::clear_deleted_at(pool, table, id)
        .await
        .map_err(|err| err.with_contexts([("operation", "restore"), ("table", table), ("id", id)]))
}
