mod common;

use adledger::application::ErrorKind;
use anyhow::Result;
use common::{test_service, Agency};

#[tokio::test]
async fn test_ledger_is_consistent_after_mixed_operations() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 10000).await?;
    let other = service
        .create_customer(&agency.admin, "globex", None, None)
        .await?;

    let first = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-14"))
        .await?;
    service
        .record_spend(&agency.admin, agency.spend(1500, "2024-05-15"))
        .await?;
    service.delete_spend(&agency.admin, first.spend_log.id).await?;
    service
        .deduct(&agency.admin, agency.customer.id, 12000, None)
        .await?;
    service.deduct(&agency.admin, other.id, 2000, None).await?;

    let report = service.reconcile(&agency.admin).await?;
    assert!(report.is_healthy(), "{:?}", report.issues);
    assert_eq!(report.customer_count, 2);

    let acme = report
        .customers
        .iter()
        .find(|c| c.customer_id == agency.customer.id)
        .unwrap();
    assert_eq!(acme.transactions_total, -2000);
    assert_eq!(acme.live_spend_total, 1500);
    assert_eq!(acme.balance_cents, -3500);
    assert_eq!(acme.expected_cents, -3500);

    Ok(())
}

#[tokio::test]
async fn test_drift_is_reported_not_repaired() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 10000).await?;

    sqlx::query("UPDATE users SET balance_cents = balance_cents + 500 WHERE username = 'acme'")
        .execute(service.repository().pool())
        .await?;

    let report = service.reconcile(&agency.admin).await?;
    assert!(!report.is_healthy());
    assert_eq!(report.issues.len(), 1);

    let mismatches: Vec<_> = report.mismatches().collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].discrepancy_cents, 500);
    assert_eq!(mismatches[0].expected_cents, 10000);

    assert_eq!(agency.balance(&service).await?, 10500);

    Ok(())
}

#[tokio::test]
async fn test_reconcile_requires_admin() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::setup(&service).await?;

    let err = service
        .reconcile(&agency.customer_caller())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    Ok(())
}
