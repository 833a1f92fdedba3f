use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Caller, Cents, FinancialTransaction, TransactionType, UserId};
use crate::storage::Repository;

use super::service::{require_admin, require_positive, require_view};
use super::{AppError, LedgerService};

/// Result of recording a recharge or deduction
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub transaction: FinancialTransaction,
    pub updated_balance: Cents,
}

/// Parse a transaction type name, naming the `type` field on failure.
pub fn parse_transaction_type(input: &str) -> Result<TransactionType, AppError> {
    TransactionType::from_str(input.trim()).ok_or_else(|| {
        AppError::validation(
            "type",
            format!("'{}' is not one of: recharge, deduction", input.trim()),
        )
    })
}

impl LedgerService {
    /// Record an admin recharge or deduction.
    ///
    /// The transaction row and the balance change commit together. No floor
    /// applies: a deduction may take the balance below zero.
    pub async fn record_transaction(
        &self,
        caller: &Caller,
        customer_id: UserId,
        transaction_type: TransactionType,
        amount_cents: Cents,
        note: Option<String>,
    ) -> Result<TransactionResult, AppError> {
        require_admin(caller, "record_transaction")?;
        if let Err(err) = require_positive(amount_cents) {
            warn!(customer_id = %customer_id, amount_cents, "Rejected transaction: invalid amount");
            return Err(err);
        }
        let customer = self.load_customer(customer_id).await?;

        let transaction =
            FinancialTransaction::new(customer.id, transaction_type, amount_cents, note)?;
        if customer
            .balance_cents
            .checked_add(transaction.amount_cents)
            .is_none()
        {
            warn!(
                customer_id = %customer.id,
                balance_cents = customer.balance_cents,
                amount_cents = transaction.amount_cents,
                "Rejected transaction: balance out of range"
            );
            return Err(AppError::validation(
                "amount",
                "balance would leave the representable range",
            ));
        }

        let mut tx = self.repo.begin().await?;
        let updated_balance =
            Repository::adjust_balance(&mut tx, customer.id, transaction.amount_cents)
                .await?
                .ok_or_else(|| AppError::CustomerNotFound(customer.id.to_string()))?;
        Repository::insert_transaction(&mut tx, &transaction).await?;
        tx.commit()
            .await
            .context("Failed to commit financial transaction")?;

        info!(
            customer_id = %customer.id,
            transaction_id = %transaction.id,
            transaction_type = %transaction_type,
            amount_cents = transaction.amount_cents,
            balance_cents = updated_balance,
            "Recorded financial transaction"
        );

        Ok(TransactionResult {
            transaction,
            updated_balance,
        })
    }

    /// Add credit to a customer's balance.
    pub async fn recharge(
        &self,
        caller: &Caller,
        customer_id: UserId,
        amount_cents: Cents,
        note: Option<String>,
    ) -> Result<TransactionResult, AppError> {
        self.record_transaction(
            caller,
            customer_id,
            TransactionType::Recharge,
            amount_cents,
            note,
        )
        .await
    }

    /// Remove credit from a customer's balance.
    pub async fn deduct(
        &self,
        caller: &Caller,
        customer_id: UserId,
        amount_cents: Cents,
        note: Option<String>,
    ) -> Result<TransactionResult, AppError> {
        self.record_transaction(
            caller,
            customer_id,
            TransactionType::Deduction,
            amount_cents,
            note,
        )
        .await
    }

    /// List a customer's financial transactions, newest first.
    pub async fn list_transactions(
        &self,
        caller: &Caller,
        customer_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<FinancialTransaction>, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        Ok(self.repo.list_transactions(customer.id, limit).await?)
    }
}
