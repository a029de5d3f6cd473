//! Generic row access over the registry tables.
//!
//! Rows travel as JSON objects so the CLI and callers can pass arbitrary
//! field subsets. Table and column names are checked against a fixed
//! catalogue before any SQL is formatted.

use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteArguments, SqliteRow},
    Column, Row, Sqlite, SqliteConnection, SqlitePool, TypeInfo, ValueRef,
};

use crate::{id::new_uuid_v7, time::now_ms, AppError, AppResult};

pub const INVALID_TABLE: &str = "REPO/INVALID_TABLE";
pub const INVALID_COLUMN: &str = "REPO/INVALID_COLUMN";
pub const INVALID_ORDER: &str = "REPO/INVALID_ORDER";
pub const NOT_FOUND: &str = "REPO/NOT_FOUND";
pub const INVALID_PAYLOAD: &str = "REPO/INVALID_PAYLOAD";

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// Columns a caller may write. `id` and timestamps are managed here.
    pub writable: &'static [&'static str],
    pub required: &'static [&'static str],
    pub default_order: &'static str,
}

pub const REGISTRY_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "members",
        writable: &["full_name", "phone", "email", "role", "joined_on"],
        required: &["full_name"],
        default_order: "full_name, id",
    },
    TableSpec {
        name: "categories",
        writable: &["name", "description"],
        required: &["name"],
        default_order: "name, id",
    },
    TableSpec {
        name: "events",
        writable: &["title", "kind", "starts_on", "location", "notes"],
        required: &["title", "starts_on"],
        default_order: "starts_on DESC, id",
    },
];

#[allow(clippy::result_large_err)]
pub fn table_spec(table: &str) -> AppResult<&'static TableSpec> {
    REGISTRY_TABLES
        .iter()
        .find(|spec| spec.name == table)
        .ok_or_else(|| AppError::new(INVALID_TABLE, "Unknown table").with_context("table", table))
}

#[allow(clippy::result_large_err)]
fn check_columns(spec: &TableSpec, data: &Map<String, Value>) -> AppResult<()> {
    for key in data.keys() {
        if !spec.writable.contains(&key.as_str()) {
            return Err(AppError::new(INVALID_COLUMN, "Column cannot be written")
                .with_context("table", spec.name)
                .with_context("column", key.clone()));
        }
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn check_order(spec: &TableSpec, order_by: Option<&str>) -> AppResult<String> {
    let Some(order) = order_by.map(str::trim).filter(|o| !o.is_empty()) else {
        return Ok(spec.default_order.to_string());
    };
    for term in order.split(',') {
        let mut parts = term.split_whitespace();
        let column = parts.next().unwrap_or_default();
        let direction = parts.next();
        let known = column == "id"
            || column == "created_at"
            || column == "updated_at"
            || spec.writable.contains(&column);
        let direction_ok = matches!(
            direction.map(str::to_ascii_uppercase).as_deref(),
            None | Some("ASC") | Some("DESC")
        );
        if !known || !direction_ok || parts.next().is_some() {
            return Err(AppError::new(INVALID_ORDER, "Unsupported ordering")
                .with_context("table", spec.name)
                .with_context("order_by", order.to_string()));
        }
    }
    Ok(order.to_string())
}

pub fn row_to_value(row: SqliteRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let val = match row.try_get_raw(idx).ok() {
            Some(raw) if raw.is_null() => Value::Null,
            Some(raw) => match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "REAL" => row
                    .try_get::<f64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => row
                    .try_get::<String, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            },
            None => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    Value::Object(map)
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    v: &Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match v {
        Value::Null => q.bind(Option::<i64>::None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(Option::<i64>::None)
            }
        }
        Value::Bool(b) => q.bind(*b as i64),
        Value::String(s) => q.bind(s.clone()),
        _ => q.bind(v.to_string()),
    }
}

pub async fn list_active(
    pool: &SqlitePool,
    table: &str,
    order_by: Option<&str>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Value>> {
    let spec = table_spec(table)?;
    let order = check_order(spec, order_by)?;
    let mut sql = format!(
        "SELECT * FROM {} WHERE deleted_at IS NULL ORDER BY {order}",
        spec.name
    );
    if limit.is_some() || offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
    }
    let mut query = sqlx::query(&sql);
    if limit.is_some() || offset.is_some() {
        query = query.bind(limit.unwrap_or(-1)).bind(offset.unwrap_or(0));
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_to_value).collect())
}

/// `get(table, id)`: the live row, or `None` when absent or soft-deleted.
pub async fn get_active(conn: &mut SqliteConnection, table: &str, id: &str) -> AppResult<Option<Value>> {
    let spec = table_spec(table)?;
    let sql = format!(
        "SELECT * FROM {} WHERE id = ? AND deleted_at IS NULL",
        spec.name
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;
    Ok(row.map(row_to_value))
}

/// `insert(table, fields)`: assigns id and timestamps, returns the stored row.
pub async fn insert(
    conn: &mut SqliteConnection,
    table: &str,
    mut data: Map<String, Value>,
) -> AppResult<Value> {
    let spec = table_spec(table)?;
    let id = match data.remove("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        None | Some(Value::Null) | Some(Value::String(_)) => new_uuid_v7(),
        Some(_) => {
            return Err(AppError::new(INVALID_PAYLOAD, "id must be a string")
                .with_context("table", spec.name));
        }
    };
    check_columns(spec, &data)?;
    for required in spec.required {
        let present = data
            .get(*required)
            .map(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
            .unwrap_or(false);
        if !present {
            return Err(AppError::new(INVALID_PAYLOAD, "Missing required field")
                .with_context("table", spec.name)
                .with_context("field", *required));
        }
    }

    let now = now_ms();
    data.insert("id".into(), Value::String(id.clone()));
    data.insert("created_at".into(), Value::from(now));
    data.insert("updated_at".into(), Value::from(now));

    let cols: Vec<String> = data.keys().cloned().collect();
    let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        spec.name,
        cols.join(","),
        placeholders.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        if let Some(value) = data.get(c) {
            query = bind_value(query, value);
        }
    }
    query.execute(&mut *conn).await?;

    get_active(conn, spec.name, &id)
        .await?
        .ok_or_else(|| AppError::new(NOT_FOUND, "Row missing after insert").with_context("id", id))
}

/// `update(table, id, fields)`: patches writable columns and returns the row.
pub async fn update(
    conn: &mut SqliteConnection,
    table: &str,
    id: &str,
    mut data: Map<String, Value>,
) -> AppResult<Value> {
    let spec = table_spec(table)?;
    data.remove("id");
    data.remove("created_at");
    data.remove("updated_at");
    check_columns(spec, &data)?;
    data.insert("updated_at".into(), Value::from(now_ms()));

    let cols: Vec<String> = data.keys().cloned().collect();
    let set_clause: Vec<String> = cols.iter().map(|c| format!("{c} = ?")).collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? AND deleted_at IS NULL",
        spec.name,
        set_clause.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        if let Some(value) = data.get(c) {
            query = bind_value(query, value);
        }
    }
    let res = query.bind(id).execute(&mut *conn).await?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(NOT_FOUND, "Record not found").with_context("id", id));
    }
    get_active(conn, spec.name, id)
        .await?
        .ok_or_else(|| AppError::new(NOT_FOUND, "Record not found").with_context("id", id))
}

pub async fn set_deleted_at(pool: &SqlitePool, table: &str, id: &str) -> AppResult<()> {
    let spec = table_spec(table)?;
    let sql = format!(
        "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        spec.name
    );
    let now = now_ms();
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(NOT_FOUND, "Record not found").with_context("id", id));
    }
    Ok(())
}

pub async fn clear_deleted_at(pool: &SqlitePool, table: &str, id: &str) -> AppResult<()> {
    let spec = table_spec(table)?;
    let sql = format!(
        "UPDATE {} SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
        spec.name
    );
    let res = sqlx::query(&sql)
        .bind(now_ms())
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(NOT_FOUND, "Record not found").with_context("id", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tables_are_rejected() {
        let err = table_spec("pledges; DROP TABLE members").unwrap_err();
        assert_eq!(err.code(), INVALID_TABLE);
    }

    #[test]
    fn writes_outside_catalogue_are_rejected() {
        let spec = table_spec("members").unwrap();
        let mut data = Map::new();
        data.insert("full_name".into(), Value::from("Ruth"));
        data.insert("deleted_at".into(), Value::from(1));
        let err = check_columns(spec, &data).unwrap_err();
        assert_eq!(err.code(), INVALID_COLUMN);
        assert_eq!(err.context().get("column").map(String::as_str), Some("deleted_at"));
    }

    #[test]
    fn ordering_accepts_known_columns_only() {
        let spec = table_spec("events").unwrap();
        assert_eq!(check_order(spec, None).unwrap(), "starts_on DESC, id");
        assert_eq!(check_order(spec, Some("title asc, id")).unwrap(), "title asc, id");
        assert_eq!(
            check_order(spec, Some("title; DELETE")).unwrap_err().code(),
            INVALID_ORDER
        );
        assert_eq!(
            check_order(spec, Some("title sideways")).unwrap_err().code(),
            INVALID_ORDER
        );
    }
}
