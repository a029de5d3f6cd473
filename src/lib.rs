//! Church administration core: member registry, contribution ledger, pledge
//! tracking, attendance logging and reports over a local SQLite database.

pub mod attendance;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod money;
pub mod payments;
pub mod pledges;
pub mod reports;
pub mod repo;
pub mod time;
pub mod validation;

pub use error::{AppError, AppResult};
pub use model::{
    NewPayment, NewPledge, Payment, PaymentFilter, PaymentMethod, Pledge, PledgeFilter,
    PledgePaymentInput, PledgeStatus,
};
pub use money::Money;
pub use payments::{get_payment, list_payments, record_contribution, require_payment};
pub use pledges::{
    cancel_pledge, create_pledge, get_pledge, list_pledges, pledge_progress,
    record_pledge_payment, require_pledge, resolve_status, PledgeProgress,
};

use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database at `path` and bring its schema up
/// to date.
pub async fn open_database(path: &Path) -> anyhow::Result<SqlitePool> {
    let pool = db::open_sqlite_pool(path).await?;
    migrate::apply_migrations(&pool).await?;
    Ok(pool)
}
