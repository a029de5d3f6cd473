//! Coded errors shared by the ledger, the registry and the CLI.
//!
//! Every failure carries an `AREA/REASON` code from `codes.rs`, a message fit
//! for a church administrator, free-form context, and optionally the lower
//! level error it wraps. [`AppError::kind`] folds the codes into the few
//! outcomes callers branch on.

use std::collections::HashMap;
use std::fmt;
use std::io::Error as IoError;

use serde::Serialize;
use sqlx::Error as SqlxError;

use crate::money::MoneyError;

mod codes;
pub use codes::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// The error this one wraps, such as the constraint behind a duplicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Coarse outcome of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The addressed pledge, payment, member or event does not exist.
    NotFound,
    /// Input was rejected before anything was written.
    Invalid,
    /// The write would repeat a payment or check-in already recorded.
    Duplicate,
    /// The record exists but is in a state that forbids the change.
    Conflict,
    /// The database failed or refused the statement; the transaction rolled back.
    WriteFailure,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Conflict => "conflict",
            ErrorKind::WriteFailure => "write_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn pledge_not_found(pledge_id: &str) -> Self {
        AppError::new(PLEDGE_NOT_FOUND, "Pledge not found").with_context("pledge_id", pledge_id)
    }

    pub fn payment_not_found(payment_id: &str) -> Self {
        AppError::new(PAYMENT_NOT_FOUND, "Payment not found").with_context("id", payment_id)
    }

    pub fn member_not_found(member_id: &str) -> Self {
        AppError::new(MEMBER_NOT_FOUND, "Member not found").with_context("id", member_id)
    }

    /// A second payment under an idempotency key that was already used.
    pub fn duplicate_payment(idempotency_key: Option<&str>, cause: AppError) -> Self {
        let mut err = AppError::new(
            PAYMENT_DUPLICATE,
            "A payment with this idempotency key was already recorded.",
        );
        if let Some(key) = idempotency_key {
            err = err.with_context("idempotency_key", key);
        }
        err.with_cause(cause)
    }

    pub fn invalid_amount(message: impl Into<String>, amount: impl fmt::Display) -> Self {
        AppError::new(VALIDATION_AMOUNT, message).with_context("amount", amount.to_string())
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        let code = self.code.as_str();
        match code {
            PLEDGE_NOT_FOUND | PAYMENT_NOT_FOUND | MEMBER_NOT_FOUND | "SQLX/ROW_NOT_FOUND" => {
                ErrorKind::NotFound
            }
            PAYMENT_DUPLICATE | SQLITE_CONSTRAINT_UNIQUE => ErrorKind::Duplicate,
            PLEDGE_INVALID_TRANSITION => ErrorKind::Conflict,
            MONEY_OVERFLOW => ErrorKind::Invalid,
            _ if code.ends_with("/NOT_FOUND") || code.ends_with("_MISSING") => {
                ErrorKind::NotFound
            }
            _ if code.ends_with("/DUPLICATE") => ErrorKind::Duplicate,
            _ if code.starts_with("VALIDATION/") || code.contains("/INVALID_") => {
                ErrorKind::Invalid
            }
            _ if code.starts_with("Sqlite/") || code.starts_with("SQLX/") || code.starts_with("IO/") => {
                ErrorKind::WriteFailure
            }
            _ => ErrorKind::Internal,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// True when the error, or any error in its cause chain, carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.code == code || self.cause().is_some_and(|c| c.has_code(code))
    }

    pub fn log_with_event(&self, event: &'static str) {
        tracing::error!(
            target: "ekklesia",
            event = event,
            code = %self.code,
            kind = self.kind().as_str(),
            message = %self.message,
            context = ?self.context,
            cause = ?self.cause().map(AppError::code),
        );
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<MoneyError> for AppError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::Overflow => AppError::new(
                MONEY_OVERFLOW,
                "The total is larger than the ledger can represent.",
            ),
            other => AppError::new(VALIDATION_AMOUNT, other.to_string()),
        }
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let mut app_error = AppError::new(format!("IO/{:?}", error.kind()), error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out waiting for the database; another write may be holding it.",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_NOT_FOUND", format!("Column not found: {name}"))
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn ledger_codes_map_to_kinds() {
        assert_eq!(AppError::pledge_not_found("p1").kind(), ErrorKind::NotFound);
        assert_eq!(AppError::payment_not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::new(MEMBER_OR_CATEGORY_MISSING, "gone").kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            AppError::new(PLEDGE_INVALID_TRANSITION, "fulfilled").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AppError::new("ATTENDANCE/EVENT_MISSING", "no event").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppError::new("ATTENDANCE/DUPLICATE", "again").kind(),
            ErrorKind::Duplicate
        );
        assert_eq!(AppError::new(SQLITE_CONSTRAINT_CHECK, "check").kind(), ErrorKind::WriteFailure);
        assert_eq!(AppError::new(PLEDGE_DECODE, "bad status").kind(), ErrorKind::Internal);
    }

    #[test]
    fn pledge_not_found_names_the_pledge() {
        let err = AppError::pledge_not_found("p-42");
        assert_eq!(err.to_string(), r#"[PLEDGE/NOT_FOUND] Pledge not found ({"pledge_id": "p-42"})"#);
    }

    #[test]
    fn duplicate_payment_keeps_the_constraint_as_cause() {
        let constraint = AppError::new(SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed");
        let err = AppError::duplicate_payment(Some("mpesa-QF12"), constraint);
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(err.context().get("idempotency_key").map(String::as_str), Some("mpesa-QF12"));
        assert!(err.has_code(SQLITE_CONSTRAINT_UNIQUE));
        assert!(!err.has_code(PLEDGE_NOT_FOUND));
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("[Sqlite/2067] UNIQUE constraint failed".to_string())
        );
    }

    #[test]
    fn money_errors_become_amount_codes() {
        assert_eq!(AppError::from(MoneyError::Overflow).code(), MONEY_OVERFLOW);
        let err = AppError::from(MoneyError::OutOfRange("9e16".into()));
        assert_eq!(err.code(), VALIDATION_AMOUNT);
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn serialized_error_omits_empty_parts() {
        let err = AppError::invalid_amount("Amount must be greater than zero.", "0.00");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], VALIDATION_AMOUNT);
        assert_eq!(value["context"]["amount"], "0.00");
        assert!(value.get("cause").is_none());
    }

    #[tokio::test]
    async fn sqlite_unique_violation_carries_extended_code() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE payments (id TEXT PRIMARY KEY, idempotency_key TEXT UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO payments VALUES ('a', 'k1')")
            .execute(&pool)
            .await
            .unwrap();
        let err = sqlx::query("INSERT INTO payments VALUES ('b', 'k1')")
            .execute(&pool)
            .await
            .map_err(AppError::from)
            .unwrap_err();
        assert_eq!(err.code(), SQLITE_CONSTRAINT_UNIQUE);
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert!(err.message().contains("payments.idempotency_key"));

        let missing = sqlx::query("SELECT 1 FROM payments WHERE id = 'zz'")
            .fetch_one(&pool)
            .await
            .map_err(AppError::from)
            .err()
            .unwrap();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
