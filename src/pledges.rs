//! Pledge lifecycle: creation, fulfillment through payments, cancellation.
//!
//! A fulfillment appends one payment and moves the pledge's running total in
//! a single transaction. The total is incremented by SQL rather than written
//! back from a value read earlier, so concurrent fulfillments of one pledge
//! all count.

use futures::FutureExt;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    db::with_tx,
    error::{PLEDGE_DECODE, PLEDGE_INVALID_TRANSITION},
    id::new_uuid_v7,
    model::{
        NewPayment, NewPledge, ParseEnumError, Pledge, PledgeFilter, PledgePaymentInput,
        PledgeStatus,
    },
    money::{Money, MoneyError},
    payments::{check_len, ensure_member_and_category, insert_payment, require_positive},
    time::now_ms,
    AppError, AppResult,
};

const MAX_DESCRIPTION_LEN: usize = 500;

/// Status a pledge takes once its running total reaches `new_fulfilled`.
///
/// Reaching the committed amount fulfills the pledge, any positive total keeps
/// it pending, and a non-positive total leaves the current status untouched.
/// Totals above the commitment are not clamped.
pub fn resolve_status(current: PledgeStatus, new_fulfilled: Money, amount: Money) -> PledgeStatus {
    if new_fulfilled >= amount {
        PledgeStatus::Fulfilled
    } else if new_fulfilled.is_positive() {
        PledgeStatus::Pending
    } else {
        current
    }
}

async fn fetch_pledge(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<Pledge>> {
    let row = sqlx::query("SELECT * FROM pledges WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(Pledge::try_from).transpose()
}

pub async fn create_pledge(pool: &SqlitePool, input: NewPledge) -> AppResult<Pledge> {
    require_positive(input.amount)?;
    check_len(&input.description, "description", MAX_DESCRIPTION_LEN)?;

    let pledge = with_tx(pool, move |conn| {
        async move {
            ensure_member_and_category(conn, &input.user_id, &input.category_id).await?;
            let id = new_uuid_v7();
            let now = now_ms();
            sqlx::query(
                "INSERT INTO pledges (id, user_id, category_id, amount, fulfilled_amount, due_date, \
                 status, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&input.user_id)
            .bind(&input.category_id)
            .bind(input.amount.minor())
            .bind(input.due_date)
            .bind(PledgeStatus::Pending.as_str())
            .bind(&input.description)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            fetch_pledge(conn, &id)
                .await?
                .ok_or_else(|| AppError::pledge_not_found(&id).with_context("stage", "after_insert"))
        }
        .boxed()
    })
    .await
    .map_err(|err| err.with_context("operation", "create_pledge"))?;

    tracing::info!(
        target: "ekklesia",
        event = "pledge_created",
        pledge_id = %pledge.id,
        user_id = %pledge.user_id,
        category_id = %pledge.category_id,
        amount = pledge.amount.minor()
    );
    Ok(pledge)
}

pub async fn get_pledge(pool: &SqlitePool, id: &str) -> AppResult<Option<Pledge>> {
    let mut conn = pool.acquire().await?;
    fetch_pledge(&mut conn, id)
        .await
        .map_err(|err| err.with_context("operation", "get_pledge"))
}

pub async fn require_pledge(pool: &SqlitePool, id: &str) -> AppResult<Pledge> {
    get_pledge(pool, id)
        .await?
        .ok_or_else(|| AppError::pledge_not_found(id))
}

pub async fn list_pledges(pool: &SqlitePool, filter: &PledgeFilter) -> AppResult<Vec<Pledge>> {
    let mut sql = String::from("SELECT * FROM pledges WHERE 1=1");
    if filter.user_id.is_some() {
        sql.push_str(" AND user_id = ?");
    }
    if filter.category_id.is_some() {
        sql.push_str(" AND category_id = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC, id");

    let mut query = sqlx::query(&sql);
    if let Some(user_id) = &filter.user_id {
        query = query.bind(user_id);
    }
    if let Some(category_id) = &filter.category_id {
        query = query.bind(category_id);
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "list_pledges"))?;
    rows.iter().map(Pledge::try_from).collect()
}

/// Moves a pending pledge to `cancelled`. The row is kept.
pub async fn cancel_pledge(pool: &SqlitePool, id: &str) -> AppResult<Pledge> {
    let pledge_id = id.to_string();
    let pledge = with_tx(pool, move |conn| {
        async move {
            let now = now_ms();
            let res = sqlx::query(
                "UPDATE pledges SET status = 'cancelled', updated_at = ? \
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(now)
            .bind(&pledge_id)
            .execute(&mut *conn)
            .await?;
            let current = fetch_pledge(conn, &pledge_id)
                .await?
                .ok_or_else(|| AppError::pledge_not_found(&pledge_id))?;
            match (res.rows_affected(), current.status) {
                (0, PledgeStatus::Fulfilled) => Err(AppError::new(
                    PLEDGE_INVALID_TRANSITION,
                    "A fulfilled pledge cannot be cancelled.",
                )
                .with_context("pledge_id", pledge_id.clone())),
                _ => Ok(current),
            }
        }
        .boxed()
    })
    .await
    .map_err(|err| err.with_context("operation", "cancel_pledge"))?;

    tracing::info!(target: "ekklesia", event = "pledge_cancelled", pledge_id = %pledge.id);
    Ok(pledge)
}

/// Records a payment against a pledge and returns the updated pledge.
///
/// Fails with `PLEDGE/NOT_FOUND` before any write when the pledge does not
/// exist. A failure at any later step rolls back both the payment and the
/// pledge update. A duplicate `idempotency_key` fails with
/// `PAYMENT/DUPLICATE` and leaves the pledge unchanged.
pub async fn record_pledge_payment(
    pool: &SqlitePool,
    input: PledgePaymentInput,
) -> AppResult<Pledge> {
    require_positive(input.amount)?;
    let pledge_id = input.pledge_id.clone();
    let amount = input.amount;

    let (pledge, previous_status) = with_tx(pool, move |conn| {
        async move {
            // The increment runs first so this transaction holds the write
            // lock before it observes the running total. SQLite turns an
            // overflowing integer sum into a float, so totals that would
            // leave i64 are not matched.
            let row: Option<(String, String, i64, i64, String)> = sqlx::query_as(
                "UPDATE pledges \
                 SET fulfilled_amount = fulfilled_amount + ?1, updated_at = ?2 \
                 WHERE id = ?3 AND fulfilled_amount <= ?4 - ?1 \
                 RETURNING user_id, category_id, amount, fulfilled_amount, status",
            )
            .bind(input.amount.minor())
            .bind(now_ms())
            .bind(&input.pledge_id)
            .bind(i64::MAX)
            .fetch_optional(&mut *conn)
            .await?;
            let Some((user_id, category_id, committed, fulfilled, status)) = row else {
                let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM pledges WHERE id = ?")
                    .bind(&input.pledge_id)
                    .fetch_optional(&mut *conn)
                    .await?;
                return Err(match exists {
                    Some(_) => AppError::from(MoneyError::Overflow),
                    None => AppError::pledge_not_found(&input.pledge_id),
                });
            };

            let current: PledgeStatus = status.parse().map_err(|err: ParseEnumError| {
                AppError::new(PLEDGE_DECODE, err.to_string()).with_context("status", status.clone())
            })?;
            let next = resolve_status(
                current,
                Money::from_minor(fulfilled),
                Money::from_minor(committed),
            );

            insert_payment(
                conn,
                NewPayment {
                    user_id,
                    category_id,
                    amount: input.amount,
                    payment_method: input.payment_method,
                    reference_number: input.reference_number,
                    description: input.description,
                    payment_date: None,
                    idempotency_key: input.idempotency_key,
                },
            )
            .await?;

            if next != current {
                sqlx::query("UPDATE pledges SET status = ? WHERE id = ?")
                    .bind(next.as_str())
                    .bind(&input.pledge_id)
                    .execute(&mut *conn)
                    .await?;
            }

            let pledge = fetch_pledge(conn, &input.pledge_id)
                .await?
                .ok_or_else(|| AppError::pledge_not_found(&input.pledge_id))?;
            Ok((pledge, current))
        }
        .boxed()
    })
    .await
    .map_err(|err: AppError| {
        err.with_context("operation", "record_pledge_payment")
            .with_context("pledge_id", pledge_id.clone())
    })?;

    if previous_status == PledgeStatus::Cancelled {
        tracing::warn!(
            target: "ekklesia",
            event = "pledge_payment_on_cancelled",
            pledge_id = %pledge.id,
            status = pledge.status.as_str()
        );
    }
    if pledge.fulfilled_amount > pledge.amount {
        tracing::warn!(
            target: "ekklesia",
            event = "pledge_over_fulfilled",
            pledge_id = %pledge.id,
            amount = pledge.amount.minor(),
            fulfilled_amount = pledge.fulfilled_amount.minor()
        );
    }
    tracing::info!(
        target: "ekklesia",
        event = "pledge_payment_recorded",
        pledge_id = %pledge.id,
        amount = amount.minor(),
        fulfilled_amount = pledge.fulfilled_amount.minor(),
        status = pledge.status.as_str()
    );
    Ok(pledge)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PledgeProgress {
    pub pledge_id: String,
    pub amount: Money,
    pub fulfilled_amount: Money,
    pub remaining: Money,
    /// Portion above the commitment; zero unless over-fulfilled.
    pub overpaid: Money,
    /// Whole percent of the commitment paid, not capped at 100.
    pub percent: i64,
    pub status: PledgeStatus,
}

pub fn pledge_progress(pledge: &Pledge) -> PledgeProgress {
    let percent = if pledge.amount.is_positive() {
        pledge.fulfilled_amount.minor().saturating_mul(100) / pledge.amount.minor()
    } else {
        0
    };
    PledgeProgress {
        pledge_id: pledge.id.clone(),
        amount: pledge.amount,
        fulfilled_amount: pledge.fulfilled_amount,
        remaining: pledge.amount.saturating_remaining(pledge.fulfilled_amount),
        overpaid: pledge.fulfilled_amount.saturating_remaining(pledge.amount),
        percent,
        status: pledge.status,
    }
}
