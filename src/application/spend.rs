use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    is_storable_date, AdId, AdSpendLog, Caller, Cents, NewSpend, SpendLogId, UserId,
};
use crate::storage::Repository;

use super::service::{require_admin, require_positive, require_view};
use super::{AppError, LedgerService};

/// Result of recording spend
#[derive(Debug, Clone, Serialize)]
pub struct SpendResult {
    pub spend_log: AdSpendLog,
    pub customer_id: UserId,
    pub updated_balance: Cents,
}

/// Result of deleting spend
#[derive(Debug, Clone, Serialize)]
pub struct SpendDeletion {
    pub spend_log: AdSpendLog,
    pub customer_id: UserId,
    pub refunded_amount: Cents,
    pub updated_balance: Cents,
}

/// Result of replacing one spend log with another
#[derive(Debug, Clone, Serialize)]
pub struct SpendAmendment {
    pub deleted: SpendDeletion,
    pub recorded: SpendResult,
}

fn validate_spend_input(spend: &NewSpend) -> Result<(), AppError> {
    require_positive(spend.amount_cents)?;
    if spend.platform.trim().is_empty() {
        return Err(AppError::validation("platform", "must not be empty"));
    }
    if !is_storable_date(spend.spend_date) {
        return Err(AppError::validation(
            "spend_date",
            format!("{} is outside years 0000-9999", spend.spend_date),
        ));
    }
    Ok(())
}

impl LedgerService {
    /// Record ad spend and charge it to the customer's balance.
    ///
    /// The balance must cover the amount. The debit and the new spend log
    /// commit together.
    pub async fn record_spend(
        &self,
        caller: &Caller,
        spend: NewSpend,
    ) -> Result<SpendResult, AppError> {
        require_admin(caller, "record_spend")?;
        validate_spend_input(&spend)?;

        let customer = self.load_customer(spend.customer_id).await?;
        let ad = self.load_customer_ad(customer.id, spend.ad_id).await?;

        if customer.balance_cents < spend.amount_cents {
            warn!(
                customer_id = %customer.id,
                balance_cents = customer.balance_cents,
                amount_cents = spend.amount_cents,
                "Rejected spend: insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                customer: customer.username,
                balance: customer.balance_cents,
                required: spend.amount_cents,
            });
        }

        let spend_log = AdSpendLog::new(&spend, caller.user_id)?;

        let mut tx = self.repo.begin().await?;
        let debited = Repository::debit_balance(&mut tx, customer.id, spend_log.amount_cents).await?;
        let Some(updated_balance) = debited else {
            // Another writer spent the balance after the check above.
            tx.rollback().await.context("Failed to roll back spend")?;
            let balance = self.load_customer(customer.id).await?.balance_cents;
            warn!(
                customer_id = %customer.id,
                balance_cents = balance,
                amount_cents = spend_log.amount_cents,
                "Rejected spend: insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                customer: customer.username,
                balance,
                required: spend_log.amount_cents,
            });
        };
        Repository::insert_spend_log(&mut tx, &spend_log).await?;
        tx.commit().await.context("Failed to commit spend")?;

        info!(
            customer_id = %customer.id,
            ad_id = %ad.id,
            spend_log_id = %spend_log.id,
            amount_cents = spend_log.amount_cents,
            balance_cents = updated_balance,
            "Recorded ad spend"
        );

        Ok(SpendResult {
            spend_log,
            customer_id: customer.id,
            updated_balance,
        })
    }

    /// Delete a spend log and refund its amount to the owning customer.
    ///
    /// The refund always succeeds regardless of the balance's sign. A spend
    /// log is refunded at most once: if a concurrent delete got there first,
    /// this call reports it as not found.
    pub async fn delete_spend(
        &self,
        caller: &Caller,
        spend_log_id: SpendLogId,
    ) -> Result<SpendDeletion, AppError> {
        require_admin(caller, "delete_spend")?;

        let existing = self
            .repo
            .get_spend_log(spend_log_id)
            .await?
            .ok_or_else(|| AppError::SpendLogNotFound(spend_log_id.to_string()))?;
        let ad = self
            .repo
            .get_ad(existing.ad_id)
            .await?
            .ok_or_else(|| AppError::AdNotFound(existing.ad_id.to_string()))?;
        let customer = self.load_customer(ad.customer_id).await?;

        let mut tx = self.repo.begin().await?;
        let spend_log = Repository::delete_spend_log(&mut tx, spend_log_id)
            .await?
            .ok_or_else(|| AppError::SpendLogNotFound(spend_log_id.to_string()))?;
        let updated_balance =
            Repository::adjust_balance(&mut tx, customer.id, spend_log.amount_cents)
                .await?
                .ok_or_else(|| AppError::CustomerNotFound(customer.id.to_string()))?;
        tx.commit().await.context("Failed to commit spend deletion")?;

        info!(
            customer_id = %customer.id,
            ad_id = %ad.id,
            spend_log_id = %spend_log.id,
            refunded_cents = spend_log.amount_cents,
            balance_cents = updated_balance,
            "Deleted ad spend"
        );

        Ok(SpendDeletion {
            refunded_amount: spend_log.amount_cents,
            spend_log,
            customer_id: customer.id,
            updated_balance,
        })
    }

    /// Replace a spend log: delete it (with refund), then record `replacement`.
    ///
    /// These are two separate commits. The replacement's customer and ad are
    /// checked before anything is deleted; if the replacement is still
    /// rejected afterwards (say, the balance no longer covers it), the
    /// deletion stays in effect and the error is returned.
    pub async fn amend_spend(
        &self,
        caller: &Caller,
        spend_log_id: SpendLogId,
        replacement: NewSpend,
    ) -> Result<SpendAmendment, AppError> {
        require_admin(caller, "amend_spend")?;
        validate_spend_input(&replacement)?;
        let customer = self.load_customer(replacement.customer_id).await?;
        self.load_customer_ad(customer.id, replacement.ad_id).await?;

        let deleted = self.delete_spend(caller, spend_log_id).await?;
        let recorded = match self.record_spend(caller, replacement).await {
            Ok(recorded) => recorded,
            Err(err) => {
                warn!(
                    spend_log_id = %spend_log_id,
                    error = %err,
                    "Spend log deleted but replacement was rejected"
                );
                return Err(err);
            }
        };

        Ok(SpendAmendment { deleted, recorded })
    }

    /// List the spend logs of one of a customer's ads, latest first.
    pub async fn list_spend_logs(
        &self,
        caller: &Caller,
        customer_id: UserId,
        ad_id: AdId,
    ) -> Result<Vec<AdSpendLog>, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        let ad = self.load_customer_ad(customer.id, ad_id).await?;
        Ok(self.repo.list_spend_logs_for_ad(ad.id).await?)
    }
}
