//! Error codes surfaced by the ledger, grouped by the entity they concern.
//!
//! Codes are `AREA/REASON`. The CLI prints them verbatim and tests match on
//! them, so they are part of the public surface.

pub const PLEDGE_NOT_FOUND: &str = "PLEDGE/NOT_FOUND";
pub const PLEDGE_INVALID_TRANSITION: &str = "PLEDGE/INVALID_TRANSITION";
pub const PLEDGE_DECODE: &str = "PLEDGE/DECODE";

pub const PAYMENT_NOT_FOUND: &str = "PAYMENT/NOT_FOUND";
pub const PAYMENT_DUPLICATE: &str = "PAYMENT/DUPLICATE";
pub const PAYMENT_DECODE: &str = "PAYMENT/DECODE";

pub const MEMBER_NOT_FOUND: &str = "MEMBER/NOT_FOUND";
/// A pledge or payment names a member or category that is absent or removed.
pub const MEMBER_OR_CATEGORY_MISSING: &str = "VALIDATION/MEMBER_OR_CATEGORY";

pub const VALIDATION_AMOUNT: &str = "VALIDATION/AMOUNT";
pub const VALIDATION_TEXT: &str = "VALIDATION/TEXT";
pub const VALIDATION_STATUS: &str = "VALIDATION/STATUS";
pub const VALIDATION_PAYMENT_METHOD: &str = "VALIDATION/PAYMENT_METHOD";
pub const VALIDATION_DATE: &str = "VALIDATION/DATE";
pub const VALIDATION_DATE_RANGE: &str = "VALIDATION/DATE_RANGE";

/// A running total left the range of `i64` minor units.
pub const MONEY_OVERFLOW: &str = "MONEY/OVERFLOW";

/// SQLite extended result code for a violated UNIQUE constraint.
pub const SQLITE_CONSTRAINT_UNIQUE: &str = "Sqlite/2067";
/// SQLite extended result code for a violated FOREIGN KEY constraint.
pub const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "Sqlite/787";
/// SQLite extended result code for a violated CHECK constraint.
pub const SQLITE_CONSTRAINT_CHECK: &str = "Sqlite/275";
