use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::{
    is_storable_date, reference_today, Ad, AdId, Caller, Cents, SpendWindow, UserId,
};
use crate::storage::SpendQuery;

use super::service::require_view;
use super::{AppError, LedgerService};

/// Default length of the detail series when no start date is given.
pub const DEFAULT_DETAIL_DAYS: u64 = 30;

/// Dashboard figures for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendSummary {
    pub customer_id: UserId,
    /// Reference-timezone day the windows were computed for
    pub as_of: NaiveDate,
    pub balance_cents: Cents,
    pub today_cents: Cents,
    pub this_week_cents: Cents,
    pub last_7_days_cents: Cents,
}

/// Total spend of one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySpend {
    pub date: NaiveDate,
    pub amount_cents: Cents,
}

/// Filter for the per-day spend series
#[derive(Debug, Clone, Default)]
pub struct DetailFilter {
    /// First day included (defaults to 30 days before `to`'s default, today)
    pub from: Option<NaiveDate>,
    /// Last day included (defaults to today)
    pub to: Option<NaiveDate>,
    pub platform: Option<String>,
    pub ad_id: Option<AdId>,
}

/// Spend totals of one ad
#[derive(Debug, Clone, Serialize)]
pub struct AdSpendOverview {
    pub ad: Ad,
    pub total_spend_cents: Cents,
    pub today_spend_cents: Cents,
}

fn require_storable(field: &'static str, date: NaiveDate) -> Result<NaiveDate, AppError> {
    if is_storable_date(date) {
        Ok(date)
    } else {
        Err(AppError::validation(
            field,
            format!("{} is outside years 0000-9999", date),
        ))
    }
}

impl LedgerService {
    /// The reference-timezone day of `now`.
    fn today(&self, now: DateTime<Utc>) -> Result<NaiveDate, AppError> {
        require_storable("now", reference_today(now, self.offset))
    }

    /// Total spend of a customer within a window ending now.
    pub async fn summarize(
        &self,
        caller: &Caller,
        customer_id: UserId,
        window: SpendWindow,
    ) -> Result<Cents, AppError> {
        self.summarize_at(caller, customer_id, window, Utc::now()).await
    }

    /// Total spend of a customer within a window, as seen at `now`.
    pub async fn summarize_at(
        &self,
        caller: &Caller,
        customer_id: UserId,
        window: SpendWindow,
        now: DateTime<Utc>,
    ) -> Result<Cents, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        let today = self.today(now)?;
        self.window_total(customer.id, window, today).await
    }

    async fn window_total(
        &self,
        customer_id: UserId,
        window: SpendWindow,
        today: NaiveDate,
    ) -> Result<Cents, AppError> {
        let (start, end) = window.bounds(today);
        let query = SpendQuery::for_customer(customer_id).between(start, end);
        let total = self.repo.sum_spend(&query).await?;
        debug!(customer_id = %customer_id, window = %window, %start, %end, total, "Summed spend");
        Ok(total)
    }

    /// Balance plus today / this week / last 7 days spend, as of now.
    pub async fn spend_summary(
        &self,
        caller: &Caller,
        customer_id: UserId,
    ) -> Result<SpendSummary, AppError> {
        self.spend_summary_at(caller, customer_id, Utc::now()).await
    }

    /// Balance plus today / this week / last 7 days spend, as seen at `now`.
    pub async fn spend_summary_at(
        &self,
        caller: &Caller,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<SpendSummary, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        let today = self.today(now)?;

        Ok(SpendSummary {
            customer_id: customer.id,
            as_of: today,
            balance_cents: customer.balance_cents,
            today_cents: self.window_total(customer.id, SpendWindow::Today, today).await?,
            this_week_cents: self
                .window_total(customer.id, SpendWindow::ThisWeek, today)
                .await?,
            last_7_days_cents: self
                .window_total(customer.id, SpendWindow::Last7Days, today)
                .await?,
        })
    }

    /// Per-day spend of a customer, oldest day first. Days without spend are
    /// omitted.
    pub async fn detail_series(
        &self,
        caller: &Caller,
        customer_id: UserId,
        filter: DetailFilter,
    ) -> Result<Vec<DailySpend>, AppError> {
        self.detail_series_at(caller, customer_id, filter, Utc::now())
            .await
    }

    /// Per-day spend of a customer, with defaults resolved against `now`.
    pub async fn detail_series_at(
        &self,
        caller: &Caller,
        customer_id: UserId,
        filter: DetailFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailySpend>, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        let today = self.today(now)?;

        let to = require_storable("to", filter.to.unwrap_or(today))?;
        let from = match filter.from {
            Some(from) => require_storable("from", from)?,
            None => today - Days::new(DEFAULT_DETAIL_DAYS),
        };
        if from > to {
            return Err(AppError::validation(
                "date_range",
                format!("start {} is after end {}", from, to),
            ));
        }

        let until = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::validation("to", format!("{} has no following day", to)))?;
        let mut query = SpendQuery::for_customer(customer.id).between(from, until);
        query.platform = filter
            .platform
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(ad_id) = filter.ad_id {
            let ad = self.load_customer_ad(customer.id, ad_id).await?;
            query = query.for_ad(ad.id);
        }

        let series = self.repo.spend_by_date(&query).await?;
        Ok(series
            .into_iter()
            .map(|(date, amount_cents)| DailySpend { date, amount_cents })
            .collect())
    }

    /// Total and today's spend for each of a customer's ads, newest ad first.
    pub async fn ad_spend_overview(
        &self,
        caller: &Caller,
        customer_id: UserId,
    ) -> Result<Vec<AdSpendOverview>, AppError> {
        self.ad_spend_overview_at(caller, customer_id, Utc::now())
            .await
    }

    /// Total and today's spend for each of a customer's ads, as seen at `now`.
    pub async fn ad_spend_overview_at(
        &self,
        caller: &Caller,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AdSpendOverview>, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        let (today_start, today_end) = SpendWindow::Today.bounds(self.today(now)?);

        let ads = self.repo.list_ads_for_customer(customer.id).await?;
        let mut overview = Vec::with_capacity(ads.len());
        for ad in ads {
            let all_time = SpendQuery::for_customer(customer.id).for_ad(ad.id);
            let today = all_time.clone().between(today_start, today_end);

            overview.push(AdSpendOverview {
                total_spend_cents: self.repo.sum_spend(&all_time).await?,
                today_spend_cents: self.repo.sum_spend(&today).await?,
                ad,
            });
        }

        Ok(overview)
    }
}
