use chrono::{Local, NaiveDate, Utc};

use crate::{
    error::{VALIDATION_DATE, VALIDATION_DATE_RANGE},
    AppError, AppResult,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Calendar date used for `payment_date` stamps.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[allow(clippy::result_large_err)]
pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|err| {
        AppError::new(VALIDATION_DATE, "Dates must use YYYY-MM-DD")
            .with_context("value", value.to_string())
            .with_context("error", err.to_string())
    })
}

/// Inclusive calendar range used by listings and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> AppResult<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(AppError::new(
                VALIDATION_DATE_RANGE,
                "Range start must not be after its end",
            )
            .with_context("from", from.to_string())
            .with_context("to", to.to_string())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_reasonable() {
        let a = now_ms();
        assert!(a > 1_500_000_000_000); // after 2017
        assert!(a < 4_100_000_000_000); // before year ~2100
    }

    #[test]
    fn parse_date_accepts_iso_and_rejects_garbage() {
        let d = parse_date(" 2024-03-01 ").expect("iso date");
        assert_eq!(d.to_string(), "2024-03-01");
        let err = parse_date("01/03/2024").unwrap_err();
        assert_eq!(err.code(), "VALIDATION/DATE");
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = DateRange::new(
            Some(parse_date("2024-01-01").unwrap()),
            Some(parse_date("2024-01-31").unwrap()),
        );
        assert!(range.contains(parse_date("2024-01-01").unwrap()));
        assert!(range.contains(parse_date("2024-01-31").unwrap()));
        assert!(!range.contains(parse_date("2024-02-01").unwrap()));
        assert!(DateRange::default().contains(parse_date("1999-12-31").unwrap()));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = DateRange::new(
            Some(parse_date("2024-02-01").unwrap()),
            Some(parse_date("2024-01-01").unwrap()),
        );
        assert_eq!(range.validate().unwrap_err().code(), "VALIDATION/DATE_RANGE");
    }
}
