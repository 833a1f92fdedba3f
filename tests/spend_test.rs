mod common;

use std::sync::Arc;

use adledger::application::{AppError, ErrorKind};
use adledger::domain::AdDraft;
use anyhow::Result;
use chrono::NaiveDate;
use common::{test_service, Agency};
use tokio::sync::Barrier;

#[tokio::test]
async fn test_spend_then_delete_restores_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 10000).await?;

    let recorded = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-15"))
        .await?;
    assert_eq!(recorded.updated_balance, 7000);
    assert_eq!(recorded.customer_id, agency.customer.id);
    assert_eq!(recorded.spend_log.creator_id, agency.admin.user_id);
    assert_eq!(agency.balance(&service).await?, 7000);

    let deleted = service
        .delete_spend(&agency.admin, recorded.spend_log.id)
        .await?;
    assert_eq!(deleted.refunded_amount, 3000);
    assert_eq!(deleted.updated_balance, 10000);
    assert_eq!(deleted.customer_id, agency.customer.id);
    assert_eq!(agency.balance(&service).await?, 10000);

    Ok(())
}

#[tokio::test]
async fn test_spend_exceeding_balance_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let err = service
        .record_spend(&agency.admin, agency.spend(8000, "2024-05-15"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert!(matches!(
        err,
        AppError::InsufficientBalance {
            balance: 5000,
            required: 8000,
            ..
        }
    ));
    assert_eq!(agency.balance(&service).await?, 5000);
    assert_eq!(
        service
            .repository()
            .count_spend_logs_for_customer(agency.customer.id)
            .await?,
        0
    );

    Ok(())
}

#[tokio::test]
async fn test_spend_may_use_entire_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let recorded = service
        .record_spend(&agency.admin, agency.spend(5000, "2024-05-15"))
        .await?;
    assert_eq!(recorded.updated_balance, 0);

    let err = service
        .record_spend(&agency.admin, agency.spend(1, "2024-05-15"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    Ok(())
}

#[tokio::test]
async fn test_deleting_spend_refunds_even_when_balance_is_negative() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 3000).await?;

    let recorded = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-15"))
        .await?;
    service
        .deduct(&agency.admin, agency.customer.id, 5000, None)
        .await?;
    assert_eq!(agency.balance(&service).await?, -5000);

    let deleted = service
        .delete_spend(&agency.admin, recorded.spend_log.id)
        .await?;
    assert_eq!(deleted.updated_balance, -2000);

    Ok(())
}

#[tokio::test]
async fn test_invalid_spend_input_is_rejected_before_any_change() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let err = service
        .record_spend(&agency.admin, agency.spend(0, "2024-05-15"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { field: "amount", .. }));

    let err = service
        .record_spend(&agency.admin, agency.spend_on(1000, "2024-05-15", "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { field: "platform", .. }));

    let mut unknown_ad = agency.spend(1000, "2024-05-15");
    unknown_ad.ad_id = uuid::Uuid::new_v4();
    let err = service
        .record_spend(&agency.admin, unknown_ad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AdNotFound(_)));

    assert_eq!(agency.balance(&service).await?, 5000);

    Ok(())
}

#[tokio::test]
async fn test_spend_against_another_customers_ad_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let other = service
        .create_customer(&agency.admin, "globex", None, None)
        .await?;
    let other_ad = service
        .create_ad(&agency.admin, other.id, AdDraft::named("Globex brand"))
        .await?;

    let mut spend = agency.spend(1000, "2024-05-15");
    spend.ad_id = other_ad.id;
    let err = service.record_spend(&agency.admin, spend).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(agency.balance(&service).await?, 5000);

    Ok(())
}

#[tokio::test]
async fn test_customers_cannot_record_or_delete_spend() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;
    let recorded = service
        .record_spend(&agency.admin, agency.spend(1000, "2024-05-15"))
        .await?;

    let err = service
        .record_spend(&agency.customer_caller(), agency.spend(1000, "2024-05-15"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = service
        .delete_spend(&agency.customer_caller(), recorded.spend_log.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(agency.balance(&service).await?, 4000);

    Ok(())
}

#[tokio::test]
async fn test_failed_spend_insert_leaves_balance_untouched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 10000).await?;

    // Fail the spend-log insert that follows the balance debit.
    sqlx::query(
        r#"
        CREATE TRIGGER fail_spend_insert BEFORE INSERT ON ad_spend_logs
        BEGIN
            SELECT RAISE(ABORT, 'injected fault');
        END
        "#,
    )
    .execute(service.repository().pool())
    .await?;

    let err = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-15"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert_eq!(agency.balance(&service).await?, 10000);
    assert_eq!(
        service
            .repository()
            .count_spend_logs_for_customer(agency.customer.id)
            .await?,
        0
    );

    sqlx::query("DROP TRIGGER fail_spend_insert")
        .execute(service.repository().pool())
        .await?;

    let recorded = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-15"))
        .await?;
    assert_eq!(recorded.updated_balance, 7000);

    Ok(())
}

#[tokio::test]
async fn test_deleting_missing_spend_log_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let recorded = service
        .record_spend(&agency.admin, agency.spend(1000, "2024-05-15"))
        .await?;
    service
        .delete_spend(&agency.admin, recorded.spend_log.id)
        .await?;

    let err = service
        .delete_spend(&agency.admin, recorded.spend_log.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SpendLogNotFound(_)));
    assert_eq!(agency.balance(&service).await?, 5000);

    Ok(())
}

#[tokio::test]
async fn test_amend_replaces_spend_log() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 10000).await?;

    let original = service
        .record_spend(&agency.admin, agency.spend(3000, "2024-05-14"))
        .await?;
    let amended = service
        .amend_spend(
            &agency.admin,
            original.spend_log.id,
            agency.spend_on(4500, "2024-05-15", "meta"),
        )
        .await?;

    assert_eq!(amended.deleted.refunded_amount, 3000);
    assert_eq!(amended.deleted.updated_balance, 10000);
    assert_eq!(amended.recorded.updated_balance, 5500);
    assert_ne!(amended.recorded.spend_log.id, original.spend_log.id);

    let logs = service
        .list_spend_logs(&agency.admin, agency.customer.id, agency.ad.id)
        .await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].platform, "meta");
    assert_eq!(logs[0].amount_cents, 4500);

    Ok(())
}

#[tokio::test]
async fn test_amend_keeps_deletion_when_replacement_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let original = service
        .record_spend(&agency.admin, agency.spend(2000, "2024-05-15"))
        .await?;
    let err = service
        .amend_spend(
            &agency.admin,
            original.spend_log.id,
            agency.spend(9000, "2024-05-15"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    assert_eq!(agency.balance(&service).await?, 5000);
    assert!(
        service
            .list_spend_logs(&agency.admin, agency.customer.id, agency.ad.id)
            .await?
            .is_empty()
    );

    Ok(())
}

#[tokio::test]
async fn test_amend_with_unknown_target_deletes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    let other = service
        .create_customer(&agency.admin, "globex", None, None)
        .await?;
    let other_ad = service
        .create_ad(&agency.admin, other.id, AdDraft::named("Globex brand"))
        .await?;
    let original = service
        .record_spend(&agency.admin, agency.spend(2000, "2024-05-15"))
        .await?;

    let mut foreign_ad = agency.spend(1000, "2024-05-16");
    foreign_ad.ad_id = other_ad.id;
    let err = service
        .amend_spend(&agency.admin, original.spend_log.id, foreign_ad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AdNotFound(_)));

    let mut unknown_customer = agency.spend(1000, "2024-05-16");
    unknown_customer.customer_id = uuid::Uuid::new_v4();
    let err = service
        .amend_spend(&agency.admin, original.spend_log.id, unknown_customer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CustomerNotFound(_)));

    assert_eq!(agency.balance(&service).await?, 3000);
    let logs = service
        .list_spend_logs(&agency.admin, agency.customer.id, agency.ad.id)
        .await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, original.spend_log.id);

    Ok(())
}

#[tokio::test]
async fn test_spend_date_needs_four_digit_year() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let agency = Agency::funded(&service, 5000).await?;

    for spend_date in [
        NaiveDate::from_ymd_opt(10000, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(-1, 6, 1).unwrap(),
    ] {
        let mut spend = agency.spend(1000, "2024-05-15");
        spend.spend_date = spend_date;
        let err = service.record_spend(&agency.admin, spend).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "spend_date", .. }));
    }
    assert_eq!(agency.balance(&service).await?, 5000);

    let edge = service
        .record_spend(&agency.admin, agency.spend(1000, "9999-12-31"))
        .await?;
    assert_eq!(edge.updated_balance, 4000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spends_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let agency = Arc::new(Agency::funded(&service, 5000).await?);

    let num_concurrent = 10;
    let barrier = Arc::new(Barrier::new(num_concurrent));
    let mut handles = Vec::new();

    for _ in 0..num_concurrent {
        let service = Arc::clone(&service);
        let agency = Arc::clone(&agency);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service
                .record_spend(&agency.admin, agency.spend(1000, "2024-05-15"))
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InsufficientBalance, "{err}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(agency.balance(&service).await?, 0);
    assert_eq!(
        service
            .repository()
            .count_spend_logs_for_customer(agency.customer.id)
            .await?,
        5
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_refund_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let agency = Arc::new(Agency::funded(&service, 5000).await?);

    let recorded = service
        .record_spend(&agency.admin, agency.spend(2000, "2024-05-15"))
        .await?;
    let spend_log_id = recorded.spend_log.id;

    let num_concurrent = 4;
    let barrier = Arc::new(Barrier::new(num_concurrent));
    let mut handles = Vec::new();

    for _ in 0..num_concurrent {
        let service = Arc::clone(&service);
        let agency = Arc::clone(&agency);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service.delete_spend(&agency.admin, spend_log_id).await
        }));
    }

    let mut refunded = 0;
    for handle in handles {
        match handle.await? {
            Ok(deletion) => refunded += deletion.refunded_amount,
            Err(err) => assert!(matches!(err, AppError::SpendLogNotFound(_)), "{err}"),
        }
    }

    assert_eq!(refunded, 2000);
    assert_eq!(agency.balance(&service).await?, 5000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recharges_are_not_lost() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let agency = Arc::new(Agency::setup(&service).await?);

    let num_concurrent = 8;
    let barrier = Arc::new(Barrier::new(num_concurrent));
    let mut handles = Vec::new();

    for i in 0..num_concurrent {
        let service = Arc::clone(&service);
        let agency = Arc::clone(&agency);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service
                .recharge(&agency.admin, agency.customer.id, (i as i64 + 1) * 100, None)
                .await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    // 100 + 200 + ... + 800
    assert_eq!(agency.balance(&service).await?, 3600);

    Ok(())
}
