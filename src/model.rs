use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{
    error::{PAYMENT_DECODE, PLEDGE_DECODE},
    money::Money,
    AppError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PledgeStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl PledgeStatus {
    pub const ALL: [PledgeStatus; 3] = [
        PledgeStatus::Pending,
        PledgeStatus::Fulfilled,
        PledgeStatus::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PledgeStatus::Pending => "pending",
            PledgeStatus::Fulfilled => "fulfilled",
            PledgeStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for PledgeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PledgeStatus::Pending),
            "fulfilled" => Ok(PledgeStatus::Fulfilled),
            "cancelled" => Ok(PledgeStatus::Cancelled),
            other => Err(ParseEnumError::new("pledge status", other)),
        }
    }
}

impl fmt::Display for PledgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Mpesa,
    BankTransfer,
    Cheque,
    Card,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::Mpesa,
        PaymentMethod::BankTransfer,
        PaymentMethod::Cheque,
        PaymentMethod::Card,
        PaymentMethod::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "mpesa" => Ok(PaymentMethod::Mpesa),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cheque" => Ok(PaymentMethod::Cheque),
            "card" => Ok(PaymentMethod::Card),
            "other" => Ok(PaymentMethod::Other),
            other => Err(ParseEnumError::new("payment method", other)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's commitment toward a contribution category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub amount: Money,
    pub fulfilled_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub status: PledgeStatus,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Pledge {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let status: String = row.try_get("status").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            user_id: row.try_get("user_id").map_err(AppError::from)?,
            category_id: row.try_get("category_id").map_err(AppError::from)?,
            amount: Money::from_minor(row.try_get("amount").map_err(AppError::from)?),
            fulfilled_amount: Money::from_minor(
                row.try_get("fulfilled_amount").map_err(AppError::from)?,
            ),
            due_date: row.try_get("due_date").map_err(AppError::from)?,
            status: status.parse().map_err(|err: ParseEnumError| {
                AppError::new(PLEDGE_DECODE, err.to_string()).with_context("status", status.clone())
            })?,
            description: row.try_get("description").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

/// One entry of the append-only contribution ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub payment_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for Payment {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let method: String = row.try_get("payment_method").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            user_id: row.try_get("user_id").map_err(AppError::from)?,
            category_id: row.try_get("category_id").map_err(AppError::from)?,
            amount: Money::from_minor(row.try_get("amount").map_err(AppError::from)?),
            payment_method: method.parse().map_err(|err: ParseEnumError| {
                AppError::new(PAYMENT_DECODE, err.to_string())
                    .with_context("payment_method", method.clone())
            })?,
            reference_number: row.try_get("reference_number").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            payment_date: row.try_get("payment_date").map_err(AppError::from)?,
            idempotency_key: row.try_get("idempotency_key").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPledge {
    pub user_id: String,
    pub category_id: String,
    pub amount: Money,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

/// Arguments of a fulfillment: a payment recorded against a pledge.
#[derive(Debug, Clone, Deserialize)]
pub struct PledgePaymentInput {
    pub pledge_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Caller-chosen token; a second attempt carrying the same token is rejected.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl PledgePaymentInput {
    pub fn new(pledge_id: impl Into<String>, amount: Money, payment_method: PaymentMethod) -> Self {
        Self {
            pledge_id: pledge_id.into(),
            amount,
            payment_method,
            reference_number: None,
            description: None,
            idempotency_key: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub user_id: String,
    pub category_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to today when absent.
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PledgeFilter {
    pub user_id: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<PledgeStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<String>,
    pub category_id: Option<String>,
    pub range: crate::time::DateRange,
}
