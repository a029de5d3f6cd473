use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{error::SQLITE_CONSTRAINT_UNIQUE, id::new_uuid_v7, time::now_ms, AppError, AppResult};

pub const ATTENDANCE_DUPLICATE: &str = "ATTENDANCE/DUPLICATE";
pub const ATTENDANCE_EVENT_MISSING: &str = "ATTENDANCE/EVENT_MISSING";
pub const ATTENDANCE_MEMBER_MISSING: &str = "ATTENDANCE/MEMBER_MISSING";
pub const ATTENDANCE_INVALID_HEADCOUNT: &str = "ATTENDANCE/INVALID_HEADCOUNT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub event_id: String,
    /// `None` for anonymous visitor headcounts.
    pub member_id: Option<String>,
    pub headcount: i64,
    pub recorded_at: i64,
}

impl TryFrom<&SqliteRow> for AttendanceRecord {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            event_id: row.try_get("event_id").map_err(AppError::from)?,
            member_id: row.try_get("member_id").map_err(AppError::from)?,
            headcount: row.try_get("headcount").map_err(AppError::from)?,
            recorded_at: row.try_get("recorded_at").map_err(AppError::from)?,
        })
    }
}

async fn live_row_exists(pool: &SqlitePool, table: &'static str, id: &str) -> AppResult<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ? AND deleted_at IS NULL");
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Checks a member in to an event, or records a visitor headcount when
/// `member_id` is `None`. A member can be checked in once per event.
pub async fn record_attendance(
    pool: &SqlitePool,
    event_id: &str,
    member_id: Option<&str>,
    headcount: i64,
) -> AppResult<AttendanceRecord> {
    let wrap = |err: AppError| {
        err.with_context("operation", "record_attendance")
            .with_context("event_id", event_id.to_string())
    };

    if headcount <= 0 || (member_id.is_some() && headcount != 1) {
        return Err(wrap(
            AppError::new(
                ATTENDANCE_INVALID_HEADCOUNT,
                "Member check-ins count one person; visitor headcounts must be positive.",
            )
            .with_context("headcount", headcount.to_string()),
        ));
    }
    if !live_row_exists(pool, "events", event_id).await.map_err(wrap)? {
        return Err(wrap(AppError::new(ATTENDANCE_EVENT_MISSING, "Event not found.")));
    }
    if let Some(member) = member_id {
        if !live_row_exists(pool, "members", member).await.map_err(wrap)? {
            return Err(wrap(
                AppError::new(ATTENDANCE_MEMBER_MISSING, "Member record not found.")
                    .with_context("member_id", member.to_string()),
            ));
        }
    }

    let record = AttendanceRecord {
        id: new_uuid_v7(),
        event_id: event_id.to_string(),
        member_id: member_id.map(str::to_string),
        headcount,
        recorded_at: now_ms(),
    };
    sqlx::query(
        "INSERT INTO attendance (id, event_id, member_id, headcount, recorded_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.event_id)
    .bind(record.member_id.as_deref())
    .bind(record.headcount)
    .bind(record.recorded_at)
    .execute(pool)
    .await
    .map_err(|err| {
        let app = AppError::from(err);
        if app.code() == SQLITE_CONSTRAINT_UNIQUE {
            AppError::new(ATTENDANCE_DUPLICATE, "Member already checked in to this event.")
                .with_context("member_id", member_id.unwrap_or_default().to_string())
                .with_cause(app)
        } else {
            app
        }
    })
    .map_err(wrap)?;

    tracing::info!(
        target: "ekklesia",
        event = "attendance_recorded",
        event_id = %record.event_id,
        member_id = record.member_id.as_deref(),
        headcount = record.headcount
    );
    Ok(record)
}

pub async fn list_attendance(pool: &SqlitePool, event_id: &str) -> AppResult<Vec<AttendanceRecord>> {
    let rows = sqlx::query("SELECT * FROM attendance WHERE event_id = ? ORDER BY recorded_at, id")
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "list_attendance")
                .with_context("event_id", event_id.to_string())
        })?;
    rows.iter().map(AttendanceRecord::try_from).collect()
}

/// Members checked in plus visitor headcounts.
pub async fn event_headcount(pool: &SqlitePool, event_id: &str) -> AppResult<i64> {
    let total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(headcount), 0) FROM attendance WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(pool)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "event_headcount")
                    .with_context("event_id", event_id.to_string())
            })?;
    Ok(total)
}
