mod common;

use adledger::application::{AppError, ErrorKind};
use adledger::domain::TransactionType;
use adledger::storage::Repository;
use anyhow::Result;
use common::{test_service, Agency};

#[tokio::test]
async fn test_recharge_increases_balance_and_records_transaction() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    let result = service
        .recharge(&agency.admin, agency.customer.id, 10000, Some("Q2 top-up".into()))
        .await?;

    assert_eq!(result.updated_balance, 10000);
    assert_eq!(result.transaction.amount_cents, 10000);
    assert_eq!(result.transaction.transaction_type, TransactionType::Recharge);
    assert_eq!(result.transaction.note, "Q2 top-up");
    assert_eq!(agency.balance(&service).await?, 10000);

    let transactions = service
        .list_transactions(&agency.admin, agency.customer.id, None)
        .await?;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].id, result.transaction.id);

    Ok(())
}

#[tokio::test]
async fn test_deduction_may_take_balance_negative() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    let result = service
        .deduct(&agency.admin, agency.customer.id, 2000, None)
        .await?;

    assert_eq!(result.updated_balance, -2000);
    assert_eq!(result.transaction.amount_cents, -2000);
    assert_eq!(result.transaction.note, "Admin deduction");
    assert_eq!(agency.balance(&service).await?, -2000);

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected_without_effect() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    for amount in [0, -100] {
        let err = service
            .recharge(&agency.admin, agency.customer.id, amount, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(agency.balance(&service).await?, 5000);
    let transactions = service
        .list_transactions(&agency.admin, agency.customer.id, None)
        .await?;
    assert_eq!(transactions.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_balance_cannot_leave_cents_range() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    service
        .recharge(&agency.admin, agency.customer.id, i64::MAX - 10, None)
        .await?;
    let err = service
        .recharge(&agency.admin, agency.customer.id, 100, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { field: "amount", .. }));
    assert_eq!(agency.balance(&service).await?, i64::MAX - 10);

    // Back to zero, then as far negative as a single deduction goes.
    service
        .deduct(&agency.admin, agency.customer.id, i64::MAX - 10, None)
        .await?;
    service
        .deduct(&agency.admin, agency.customer.id, i64::MAX, None)
        .await?;
    let err = service
        .deduct(&agency.admin, agency.customer.id, 2, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(agency.balance(&service).await?, -i64::MAX);

    let transactions = service
        .list_transactions(&agency.admin, agency.customer.id, None)
        .await?;
    assert_eq!(transactions.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_store_reports_overflowing_balance_as_error() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;
    service
        .recharge(&agency.admin, agency.customer.id, i64::MAX, None)
        .await?;

    let mut tx = service.repository().begin().await?;
    let adjusted = Repository::adjust_balance(&mut tx, agency.customer.id, 1).await;
    assert!(adjusted.is_err());
    tx.rollback().await?;

    assert_eq!(agency.balance(&service).await?, i64::MAX);

    Ok(())
}

#[tokio::test]
async fn test_transaction_for_unknown_customer_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    let err = service
        .recharge(&agency.admin, uuid::Uuid::new_v4(), 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The admin account is not a customer either.
    let err = service
        .recharge(&agency.admin, agency.admin.user_id, 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn test_customers_cannot_adjust_balances() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    let err = service
        .recharge(&agency.customer_caller(), agency.customer.id, 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(agency.balance(&service).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_transactions_listed_newest_first_with_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    service
        .recharge(&agency.admin, agency.customer.id, 1000, None)
        .await?;
    service
        .recharge(&agency.admin, agency.customer.id, 2000, None)
        .await?;
    let last = service
        .deduct(&agency.admin, agency.customer.id, 500, None)
        .await?;

    let all = service
        .list_transactions(&agency.customer_caller(), agency.customer.id, None)
        .await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, last.transaction.id);
    assert_eq!(all.iter().map(|t| t.amount_cents).sum::<i64>(), 2500);

    let limited = service
        .list_transactions(&agency.admin, agency.customer.id, Some(2))
        .await?;
    assert_eq!(limited.len(), 2);

    Ok(())
}
