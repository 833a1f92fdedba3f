use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, NonPositiveAmount, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credit added to the customer's balance
    Recharge,
    /// Credit removed from the customer's balance by an admin
    Deduction,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Recharge => "recharge",
            TransactionType::Deduction => "deduction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "recharge" => Some(TransactionType::Recharge),
            "deduction" => Some(TransactionType::Deduction),
            _ => None,
        }
    }

    /// Signed ledger amount for a positive input amount.
    pub fn signed(&self, amount_cents: Cents) -> Cents {
        match self {
            TransactionType::Recharge => amount_cents,
            TransactionType::Deduction => -amount_cents,
        }
    }

    pub fn default_note(&self) -> &'static str {
        match self {
            TransactionType::Recharge => "Admin recharge",
            TransactionType::Deduction => "Admin deduction",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An admin balance adjustment. Append-only: never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: TransactionId,
    pub customer_id: UserId,
    /// Signed amount: positive for recharges, negative for deductions
    pub amount_cents: Cents,
    pub transaction_type: TransactionType,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

impl FinancialTransaction {
    /// Create a transaction from a positive amount; the sign follows the type.
    pub fn new(
        customer_id: UserId,
        transaction_type: TransactionType,
        amount_cents: Cents,
        note: Option<String>,
    ) -> Result<Self, NonPositiveAmount> {
        if amount_cents <= 0 {
            return Err(NonPositiveAmount(amount_cents));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            customer_id,
            amount_cents: transaction_type.signed(amount_cents),
            transaction_type,
            note: note
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| transaction_type.default_note().to_string()),
            timestamp: Utc::now(),
        })
    }
}
