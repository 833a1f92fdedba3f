use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AdId, Cents, NonPositiveAmount, UserId};

pub type SpendLogId = Uuid;

/// Ad-platform consumption charged against a customer's balance.
///
/// Each live spend log stands for exactly one balance decrement of
/// `amount_cents`; deleting it refunds exactly that amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdSpendLog {
    pub id: SpendLogId,
    pub ad_id: AdId,
    /// Always positive
    pub amount_cents: Cents,
    pub platform: String,
    /// Calendar day the spend is attributed to
    pub spend_date: NaiveDate,
    /// Admin who recorded the spend
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Input for recording spend.
#[derive(Debug, Clone)]
pub struct NewSpend {
    pub ad_id: AdId,
    pub customer_id: UserId,
    pub amount_cents: Cents,
    pub platform: String,
    pub spend_date: NaiveDate,
}

impl AdSpendLog {
    pub fn new(spend: &NewSpend, creator_id: UserId) -> Result<Self, NonPositiveAmount> {
        if spend.amount_cents <= 0 {
            return Err(NonPositiveAmount(spend.amount_cents));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            ad_id: spend.ad_id,
            amount_cents: spend.amount_cents,
            platform: spend.platform.trim().to_string(),
            spend_date: spend.spend_date,
            creator_id,
            created_at: Utc::now(),
        })
    }
}
