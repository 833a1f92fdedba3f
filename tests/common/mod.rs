// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use adledger::application::LedgerService;
use adledger::domain::{Ad, AdDraft, Caller, Cents, NewSpend, User};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Helper to parse an RFC 3339 instant
pub fn instant(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

/// Test fixture: an operator plus one customer with one ad
pub struct Agency {
    pub admin: Caller,
    pub customer: User,
    pub ad: Ad,
}

impl Agency {
    /// Create the admin, customer "acme" and an active ad on "tiktok".
    pub async fn setup(service: &LedgerService) -> Result<Self> {
        let admin = service.ensure_admin("admin").await?.as_caller();
        let customer = service
            .create_customer(&admin, "acme", Some("Acme Ltd".into()), None)
            .await?;
        let ad = service
            .create_ad(&admin, customer.id, AdDraft::named("Spring launch").with_platform("tiktok"))
            .await?;
        Ok(Self {
            admin,
            customer,
            ad,
        })
    }

    /// Same as `setup`, then recharge the customer.
    pub async fn funded(service: &LedgerService, amount_cents: Cents) -> Result<Self> {
        let agency = Self::setup(service).await?;
        service
            .recharge(&agency.admin, agency.customer.id, amount_cents, None)
            .await?;
        Ok(agency)
    }

    /// Spend input against the fixture's ad.
    pub fn spend(&self, amount_cents: Cents, spend_date: &str) -> NewSpend {
        self.spend_on(amount_cents, spend_date, "tiktok")
    }

    pub fn spend_on(&self, amount_cents: Cents, spend_date: &str, platform: &str) -> NewSpend {
        NewSpend {
            ad_id: self.ad.id,
            customer_id: self.customer.id,
            amount_cents,
            platform: platform.to_string(),
            spend_date: date(spend_date),
        }
    }

    pub fn customer_caller(&self) -> Caller {
        self.customer.as_caller()
    }

    /// Current stored balance of the fixture's customer.
    pub async fn balance(&self, service: &LedgerService) -> Result<Cents> {
        Ok(service
            .get_customer(&self.admin, self.customer.id)
            .await?
            .balance_cents)
    }
}
