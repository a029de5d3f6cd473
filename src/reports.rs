use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::{
    error::MEMBER_OR_CATEGORY_MISSING,
    model::{Payment, PaymentFilter, PledgeStatus},
    money::Money,
    payments::list_payments,
    time::DateRange,
    AppError, AppResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category_id: String,
    pub category_name: String,
    pub total: Money,
    pub payments: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStatement {
    pub user_id: String,
    pub full_name: String,
    pub payments: Vec<Payment>,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PledgeStatusSummary {
    pub status: PledgeStatus,
    pub pledges: i64,
    pub committed: Money,
    pub fulfilled: Money,
    /// Sum of per-pledge shortfalls; over-fulfilled pledges contribute zero.
    pub outstanding: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventAttendance {
    pub event_id: String,
    pub title: String,
    pub starts_on: String,
    pub members: i64,
    pub headcount: i64,
}

fn report_error(err: sqlx::Error, report: &'static str) -> AppError {
    AppError::from(err).with_context("report", report)
}

/// Totals per contribution category over the range, largest first.
pub async fn contributions_by_category(
    pool: &SqlitePool,
    range: DateRange,
) -> AppResult<Vec<CategoryTotal>> {
    range.validate()?;
    let rows = sqlx::query(
        "SELECT c.id AS category_id, c.name AS category_name, \
                COALESCE(SUM(p.amount), 0) AS total, COUNT(p.id) AS payments \
         FROM payments p JOIN categories c ON c.id = p.category_id \
         WHERE (?1 IS NULL OR p.payment_date >= ?1) AND (?2 IS NULL OR p.payment_date <= ?2) \
         GROUP BY c.id, c.name \
         ORDER BY total DESC, c.name",
    )
    .bind(range.from)
    .bind(range.to)
    .fetch_all(pool)
    .await
    .map_err(|err| report_error(err, "contributions_by_category"))?;

    rows.iter()
        .map(|row| {
            Ok(CategoryTotal {
                category_id: row.try_get("category_id")?,
                category_name: row.try_get("category_name")?,
                total: Money::from_minor(row.try_get("total")?),
                payments: row.try_get("payments")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(|err| report_error(err, "contributions_by_category"))
}

pub async fn member_statement(
    pool: &SqlitePool,
    user_id: &str,
    range: DateRange,
) -> AppResult<MemberStatement> {
    let full_name: Option<String> = sqlx::query_scalar("SELECT full_name FROM members WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| report_error(err, "member_statement"))?;
    let full_name = full_name.ok_or_else(|| {
        AppError::new(MEMBER_OR_CATEGORY_MISSING, "Member record not found.")
            .with_context("user_id", user_id.to_string())
    })?;

    let filter = PaymentFilter {
        user_id: Some(user_id.to_string()),
        category_id: None,
        range,
    };
    let payments = list_payments(pool, &filter).await?;
    let total = Money::checked_sum(payments.iter().map(|p| p.amount)).map_err(|err| {
        AppError::from(err)
            .with_context("report", "member_statement")
            .with_context("user_id", user_id.to_string())
    })?;
    Ok(MemberStatement {
        user_id: user_id.to_string(),
        full_name,
        payments,
        total,
    })
}

/// One line per status, always in pending, fulfilled, cancelled order.
pub async fn pledge_summary(pool: &SqlitePool) -> AppResult<Vec<PledgeStatusSummary>> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS pledges, \
                COALESCE(SUM(amount), 0) AS committed, \
                COALESCE(SUM(fulfilled_amount), 0) AS fulfilled, \
                COALESCE(SUM(MAX(amount - fulfilled_amount, 0)), 0) AS outstanding \
         FROM pledges GROUP BY status",
    )
    .fetch_all(pool)
    .await
    .map_err(|err| report_error(err, "pledge_summary"))?;

    let mut summary: Vec<PledgeStatusSummary> = PledgeStatus::ALL
        .iter()
        .map(|status| PledgeStatusSummary {
            status: *status,
            pledges: 0,
            committed: Money::ZERO,
            fulfilled: Money::ZERO,
            outstanding: Money::ZERO,
        })
        .collect();

    for row in rows {
        let status: String = row
            .try_get("status")
            .map_err(|err| report_error(err, "pledge_summary"))?;
        let Some(line) = summary.iter_mut().find(|line| line.status.as_str() == status) else {
            tracing::warn!(target: "ekklesia", event = "report_unknown_status", status = %status);
            continue;
        };
        let read = |name: &str| -> AppResult<i64> {
            row.try_get::<i64, _>(name)
                .map_err(|err| report_error(err, "pledge_summary"))
        };
        line.pledges = read("pledges")?;
        line.committed = Money::from_minor(read("committed")?);
        line.fulfilled = Money::from_minor(read("fulfilled")?);
        line.outstanding = Money::from_minor(read("outstanding")?);
    }
    Ok(summary)
}

pub async fn attendance_by_event(
    pool: &SqlitePool,
    range: DateRange,
) -> AppResult<Vec<EventAttendance>> {
    range.validate()?;
    let rows = sqlx::query(
        "SELECT e.id AS event_id, e.title, e.starts_on, \
                COUNT(a.member_id) AS members, COALESCE(SUM(a.headcount), 0) AS headcount \
         FROM events e LEFT JOIN attendance a ON a.event_id = e.id \
         WHERE e.deleted_at IS NULL \
           AND (?1 IS NULL OR e.starts_on >= ?1) AND (?2 IS NULL OR e.starts_on <= ?2) \
         GROUP BY e.id, e.title, e.starts_on \
         ORDER BY e.starts_on, e.id",
    )
    .bind(range.from)
    .bind(range.to)
    .fetch_all(pool)
    .await
    .map_err(|err| report_error(err, "attendance_by_event"))?;

    rows.iter()
        .map(|row| {
            Ok(EventAttendance {
                event_id: row.try_get("event_id")?,
                title: row.try_get("title")?,
                starts_on: row.try_get("starts_on")?,
                members: row.try_get("members")?,
                headcount: row.try_get("headcount")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(|err| report_error(err, "attendance_by_event"))
}
