use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type AdId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdStatus {
    Active,
    Paused,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Active => "active",
            AdStatus::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AdStatus::Active),
            "paused" => Some(AdStatus::Paused),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ad campaign owned by one customer. Only its id and owner matter to the
/// ledger; the rest is display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub customer_id: UserId,
    pub name: String,
    pub status: AdStatus,
    pub platform: Option<String>,
    pub unit_price_cents: Option<Cents>,
    pub budget_cents: Option<Cents>,
    pub billing_type: Option<String>,
    pub ad_format: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Editable ad attributes, used for both creation and update.
#[derive(Debug, Clone, Default)]
pub struct AdDraft {
    pub name: String,
    pub status: Option<AdStatus>,
    pub platform: Option<String>,
    pub unit_price_cents: Option<Cents>,
    pub budget_cents: Option<Cents>,
    pub billing_type: Option<String>,
    pub ad_format: Option<String>,
}

impl AdDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_status(mut self, status: AdStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl Ad {
    /// New ads start paused unless the draft says otherwise.
    pub fn new(customer_id: UserId, draft: AdDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            name: draft.name,
            status: draft.status.unwrap_or(AdStatus::Paused),
            platform: draft.platform,
            unit_price_cents: draft.unit_price_cents,
            budget_cents: draft.budget_cents,
            billing_type: draft.billing_type,
            ad_format: draft.ad_format,
            created_at: Utc::now(),
        }
    }

    /// Apply an update. Fields absent from the draft keep their current value.
    pub fn apply(&mut self, draft: AdDraft) {
        self.name = draft.name;
        if let Some(status) = draft.status {
            self.status = status;
        }
        if draft.platform.is_some() {
            self.platform = draft.platform;
        }
        if draft.unit_price_cents.is_some() {
            self.unit_price_cents = draft.unit_price_cents;
        }
        if draft.budget_cents.is_some() {
            self.budget_cents = draft.budget_cents;
        }
        if draft.billing_type.is_some() {
            self.billing_type = draft.billing_type;
        }
        if draft.ad_format.is_some() {
            self.ad_format = draft.ad_format;
        }
    }
}
