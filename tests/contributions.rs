use anyhow::Result;
use chrono::NaiveDate;
use ekklesia_lib::{
    list_payments, record_contribution, require_payment, time::DateRange, Money, NewPayment,
    PaymentFilter, PaymentMethod,
};

#[path = "util.rs"]
mod util;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn gift(user_id: &str, category: &str, major: i64, on: &str) -> NewPayment {
    NewPayment {
        user_id: user_id.to_string(),
        category_id: category.to_string(),
        amount: Money::from_major(major),
        payment_method: PaymentMethod::Cash,
        reference_number: None,
        description: None,
        payment_date: Some(date(on)),
        idempotency_key: None,
    }
}

#[tokio::test]
async fn contribution_is_recorded_and_readable() -> Result<()> {
    let pool = util::migrated_pool().await;
    let member = util::add_member(&pool, "Agnes Wairimu").await;

    let mut input = gift(&member, "tithe", 1_500, "2024-03-03");
    input.reference_number = Some("  CHQ-0042 ".into());
    input.description = Some("   ".into());
    let payment = record_contribution(&pool, input).await?;

    let stored = require_payment(&pool, &payment.id).await?;
    assert_eq!(stored, payment);
    assert_eq!(stored.amount, Money::from_major(1_500));
    assert_eq!(stored.payment_method, PaymentMethod::Cash);
    assert_eq!(stored.reference_number.as_deref(), Some("  CHQ-0042 "));
    assert_eq!(stored.description.as_deref(), Some("   "));
    assert_eq!(stored.payment_date, date("2024-03-03"));
    Ok(())
}

#[tokio::test]
async fn missing_payment_has_its_own_code() -> Result<()> {
    let pool = util::migrated_pool().await;
    let err = require_payment(&pool, "nope").await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn contribution_rejects_bad_input() -> Result<()> {
    let pool = util::migrated_pool().await;
    let member = util::add_member(&pool, "Moses Kirui").await;

    let err = record_contribution(&pool, gift(&member, "tithe", 0, "2024-01-07"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/AMOUNT");

    let err = record_contribution(&pool, gift("ghost", "tithe", 10, "2024-01-07"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/MEMBER_OR_CATEGORY");
    assert_eq!(err.context().get("user_id").map(String::as_str), Some("ghost"));

    let err = record_contribution(&pool, gift(&member, "missions", 10, "2024-01-07"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/MEMBER_OR_CATEGORY");

    let mut too_large = gift(&member, "tithe", 0, "2024-01-07");
    too_large.amount = Money::from_minor(Money::MAX.minor() + 1);
    let err = record_contribution(&pool, too_large).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/AMOUNT");
    assert_eq!(err.context().get("max").map(String::as_str), Some("1000000000000.00"));

    assert_eq!(util::count(&pool, "SELECT COUNT(*) FROM payments").await, 0);
    Ok(())
}

#[tokio::test]
async fn amounts_at_the_ceiling_are_accepted() -> Result<()> {
    let pool = util::migrated_pool().await;
    let member = util::add_member(&pool, "Harambee Trust").await;

    let mut input = gift(&member, "building_fund", 0, "2024-05-05");
    input.amount = "1,000,000,000,000".parse()?;
    let payment = record_contribution(&pool, input).await?;
    assert_eq!(payment.amount, Money::MAX);
    assert!("90000000000000000".parse::<Money>().is_err());
    Ok(())
}

#[tokio::test]
async fn idempotency_key_blocks_a_second_write() -> Result<()> {
    let pool = util::migrated_pool().await;
    let member = util::add_member(&pool, "Faith Njoki").await;

    let mut input = gift(&member, "offering", 200, "2024-02-11");
    input.idempotency_key = Some("offering-2024-02-11-faith".into());
    record_contribution(&pool, input.clone()).await?;
    let err = record_contribution(&pool, input).await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT/DUPLICATE");
    assert!(err.has_code(ekklesia_lib::error::SQLITE_CONSTRAINT_UNIQUE));
    assert_eq!(util::count(&pool, "SELECT COUNT(*) FROM payments").await, 1);
    Ok(())
}

#[tokio::test]
async fn list_filters_by_member_category_and_dates() -> Result<()> {
    let pool = util::migrated_pool().await;
    let a = util::add_member(&pool, "Alice").await;
    let b = util::add_member(&pool, "Bob").await;
    record_contribution(&pool, gift(&a, "tithe", 100, "2024-01-07")).await?;
    record_contribution(&pool, gift(&a, "offering", 20, "2024-01-14")).await?;
    record_contribution(&pool, gift(&a, "tithe", 100, "2024-02-04")).await?;
    record_contribution(&pool, gift(&b, "tithe", 300, "2024-01-21")).await?;

    let for_a = list_payments(
        &pool,
        &PaymentFilter {
            user_id: Some(a.clone()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(for_a.len(), 3);
    assert_eq!(for_a[0].payment_date, date("2024-02-04"));

    let january_tithes = list_payments(
        &pool,
        &PaymentFilter {
            user_id: None,
            category_id: Some("tithe".into()),
            range: DateRange::new(Some(date("2024-01-01")), Some(date("2024-01-31"))),
        },
    )
    .await?;
    let total = Money::checked_sum(january_tithes.iter().map(|p| p.amount))?;
    assert_eq!(january_tithes.len(), 2);
    assert_eq!(total, Money::from_major(400));

    let err = list_payments(
        &pool,
        &PaymentFilter {
            range: DateRange::new(Some(date("2024-02-01")), Some(date("2024-01-01"))),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/DATE_RANGE");
    Ok(())
}
