use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    db::with_tx,
    error::{MEMBER_OR_CATEGORY_MISSING, SQLITE_CONSTRAINT_UNIQUE, VALIDATION_TEXT},
    id::new_uuid_v7,
    model::{NewPayment, Payment, PaymentFilter},
    money::Money,
    time::{now_ms, today},
    AppError, AppResult,
};
use futures::FutureExt;

const MAX_REFERENCE_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Amounts must be positive and no larger than [`Money::MAX`].
#[allow(clippy::result_large_err)]
pub(crate) fn require_positive(amount: Money) -> AppResult<()> {
    if !amount.is_positive() {
        return Err(AppError::invalid_amount("Amount must be greater than zero.", amount));
    }
    if amount > Money::MAX {
        return Err(
            AppError::invalid_amount("Amount exceeds the largest amount the ledger accepts.", amount)
                .with_context("max", Money::MAX.to_string()),
        );
    }
    Ok(())
}

/// Rejects text longer than `max_len` characters. The value is kept as given.
#[allow(clippy::result_large_err)]
pub(crate) fn check_len(value: &str, field: &'static str, max_len: usize) -> AppResult<()> {
    if value.chars().count() > max_len {
        return Err(AppError::new(VALIDATION_TEXT, "Value is too long.")
            .with_context("field", field)
            .with_context("max", max_len.to_string()));
    }
    Ok(())
}

/// Idempotency keys are compared after trimming; a blank key means none.
#[allow(clippy::result_large_err)]
fn clean_key(value: Option<String>) -> AppResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    check_len(trimmed, "idempotency_key", MAX_REFERENCE_LEN)?;
    Ok(Some(trimmed.to_string()))
}

/// Both referenced rows must exist and not be soft-deleted.
pub(crate) async fn ensure_member_and_category(
    conn: &mut SqliteConnection,
    user_id: &str,
    category_id: &str,
) -> AppResult<()> {
    let member: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM members WHERE id = ? AND deleted_at IS NULL")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    if member.is_none() {
        return Err(
            AppError::new(MEMBER_OR_CATEGORY_MISSING, "Member record not found.")
                .with_context("user_id", user_id.to_string()),
        );
    }
    let category: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM categories WHERE id = ? AND deleted_at IS NULL")
            .bind(category_id)
            .fetch_optional(&mut *conn)
            .await?;
    if category.is_none() {
        return Err(
            AppError::new(MEMBER_OR_CATEGORY_MISSING, "Contribution category not found.")
                .with_context("category_id", category_id.to_string()),
        );
    }
    Ok(())
}

fn map_insert_error(err: sqlx::Error, idempotency_key: Option<&str>) -> AppError {
    let app = AppError::from(err);
    if app.code() == SQLITE_CONSTRAINT_UNIQUE && app.message().contains("idempotency_key") {
        return AppError::duplicate_payment(idempotency_key, app);
    }
    app
}

/// Appends one row to the payment ledger. Existing rows are never touched.
///
/// Amount, method, reference and description are stored exactly as supplied.
pub(crate) async fn insert_payment(
    conn: &mut SqliteConnection,
    input: NewPayment,
) -> AppResult<Payment> {
    if let Some(reference) = &input.reference_number {
        check_len(reference, "reference_number", MAX_REFERENCE_LEN)?;
    }
    if let Some(description) = &input.description {
        check_len(description, "description", MAX_DESCRIPTION_LEN)?;
    }
    let payment = Payment {
        id: new_uuid_v7(),
        user_id: input.user_id,
        category_id: input.category_id,
        amount: input.amount,
        payment_method: input.payment_method,
        reference_number: input.reference_number,
        description: input.description,
        payment_date: input.payment_date.unwrap_or_else(today),
        idempotency_key: clean_key(input.idempotency_key)?,
        created_at: now_ms(),
    };

    sqlx::query(
        "INSERT INTO payments (id, user_id, category_id, amount, payment_method, reference_number, \
         description, payment_date, idempotency_key, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.id)
    .bind(&payment.user_id)
    .bind(&payment.category_id)
    .bind(payment.amount.minor())
    .bind(payment.payment_method.as_str())
    .bind(payment.reference_number.as_deref())
    .bind(payment.description.as_deref())
    .bind(payment.payment_date)
    .bind(payment.idempotency_key.as_deref())
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| map_insert_error(err, payment.idempotency_key.as_deref()))?;

    Ok(payment)
}

/// Records a standalone contribution that is not tied to any pledge.
pub async fn record_contribution(pool: &SqlitePool, input: NewPayment) -> AppResult<Payment> {
    require_positive(input.amount)?;
    let user_id = input.user_id.clone();
    let payment = with_tx(pool, move |conn| {
        async move {
            ensure_member_and_category(conn, &input.user_id, &input.category_id).await?;
            insert_payment(conn, input).await
        }
        .boxed()
    })
    .await
    .map_err(|err| {
        err.with_context("operation", "record_contribution")
            .with_context("user_id", user_id)
    })?;

    tracing::info!(
        target: "ekklesia",
        event = "contribution_recorded",
        payment_id = %payment.id,
        user_id = %payment.user_id,
        category_id = %payment.category_id,
        amount = payment.amount.minor(),
        method = payment.payment_method.as_str()
    );
    Ok(payment)
}

pub async fn get_payment(pool: &SqlitePool, id: &str) -> AppResult<Option<Payment>> {
    let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "get_payment"))?;
    row.as_ref().map(Payment::try_from).transpose()
}

pub async fn require_payment(pool: &SqlitePool, id: &str) -> AppResult<Payment> {
    get_payment(pool, id)
        .await?
        .ok_or_else(|| AppError::payment_not_found(id))
}

pub async fn list_payments(pool: &SqlitePool, filter: &PaymentFilter) -> AppResult<Vec<Payment>> {
    filter.range.validate()?;
    let mut sql = String::from("SELECT * FROM payments WHERE 1=1");
    if filter.user_id.is_some() {
        sql.push_str(" AND user_id = ?");
    }
    if filter.category_id.is_some() {
        sql.push_str(" AND category_id = ?");
    }
    if filter.range.from.is_some() {
        sql.push_str(" AND payment_date >= ?");
    }
    if filter.range.to.is_some() {
        sql.push_str(" AND payment_date <= ?");
    }
    sql.push_str(" ORDER BY payment_date DESC, created_at DESC, id");

    let mut query = sqlx::query(&sql);
    if let Some(user_id) = &filter.user_id {
        query = query.bind(user_id);
    }
    if let Some(category_id) = &filter.category_id {
        query = query.bind(category_id);
    }
    if let Some(from) = filter.range.from {
        query = query.bind(from);
    }
    if let Some(to) = filter.range.to {
        query = query.bind(to);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "list_payments"))?;
    rows.iter().map(Payment::try_from).collect()
}
