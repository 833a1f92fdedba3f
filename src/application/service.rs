use chrono::FixedOffset;
use tracing::{debug, info};

use crate::config::Settings;
use crate::domain::{
    is_valid_mobile_phone, parse_cents, Ad, AdDraft, AdId, Caller, Cents, CustomerProfile,
    ParseCentsError, Role, User, UserId,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Every operation takes the acting [`Caller`] explicitly; the service never
/// looks identity up on its own.
pub struct LedgerService {
    pub(super) repo: Repository,
    pub(super) offset: FixedOffset,
}

impl LedgerService {
    /// Create a new ledger service with the given repository and the
    /// reference timezone used for daily statistics.
    pub fn new(repo: Repository, offset: FixedOffset) -> Self {
        Self { repo, offset }
    }

    /// Open the database described by `settings`. With `create`, the file is
    /// created if missing and the schema is applied.
    pub async fn open(settings: &Settings, create: bool) -> Result<Self, AppError> {
        let offset = settings.reference_offset()?;
        let repo = if create {
            let db_url = format!("sqlite:{}?mode=rwc", settings.database);
            Repository::init(&db_url, settings.busy_timeout).await?
        } else {
            let db_url = format!("sqlite:{}", settings.database);
            Repository::connect(&db_url, settings.busy_timeout).await?
        };
        debug!(database = %settings.database, utc_offset_hours = settings.utc_offset_hours, "Opened ledger");
        Ok(Self::new(repo, offset))
    }

    /// Initialize a new database at the given path with default settings.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        Self::open(&Settings::new(database_path), true).await
    }

    /// Connect to an existing database with default settings.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        Self::open(&Settings::new(database_path), false).await
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn reference_offset(&self) -> FixedOffset {
        self.offset
    }

    // ========================
    // Identity
    // ========================

    /// Create the operator account if it does not exist yet.
    pub async fn ensure_admin(&self, username: &str) -> Result<User, AppError> {
        let username = normalize_username(username)?;
        match self.repo.get_user_by_username(&username).await? {
            Some(user) if user.role == Role::Admin => Ok(user),
            Some(_) => Err(AppError::UsernameTaken(username)),
            None => {
                let admin = User::new(username, Role::Admin);
                self.repo.save_user(&admin).await?;
                info!(username = %admin.username, "Created admin account");
                Ok(admin)
            }
        }
    }

    /// Resolve a username to the identity operations run under.
    pub async fn resolve_caller(&self, username: &str) -> Result<Caller, AppError> {
        self.repo
            .get_user_by_username(username)
            .await?
            .map(|user| user.as_caller())
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    // ========================
    // Customer operations
    // ========================

    /// Create a new customer account with a zero balance.
    pub async fn create_customer(
        &self,
        caller: &Caller,
        username: &str,
        company_name: Option<String>,
        contact_person: Option<String>,
    ) -> Result<User, AppError> {
        require_admin(caller, "create_customer")?;
        let username = normalize_username(username)?;

        if self.repo.get_user_by_username(&username).await?.is_some() {
            return Err(AppError::UsernameTaken(username));
        }

        let mut customer = User::new(username, Role::Customer);
        if let Some(company) = non_blank(company_name) {
            customer = customer.with_company_name(company);
        }
        if let Some(contact) = non_blank(contact_person) {
            customer = customer.with_contact_person(contact);
        }

        self.repo.save_user(&customer).await?;
        info!(customer_id = %customer.id, username = %customer.username, "Created customer");
        Ok(customer)
    }

    /// Get a customer account.
    pub async fn get_customer(&self, caller: &Caller, id: UserId) -> Result<User, AppError> {
        require_view(caller, id)?;
        self.load_customer(id).await
    }

    /// Get a customer account by username.
    pub async fn get_customer_by_username(
        &self,
        caller: &Caller,
        username: &str,
    ) -> Result<User, AppError> {
        let customer = self
            .repo
            .get_user_by_username(username)
            .await?
            .filter(User::is_customer)
            .ok_or_else(|| AppError::CustomerNotFound(username.to_string()))?;
        require_view(caller, customer.id)?;
        Ok(customer)
    }

    /// List customers, newest first.
    pub async fn list_customers(
        &self,
        caller: &Caller,
        search: Option<&str>,
    ) -> Result<Vec<User>, AppError> {
        require_admin(caller, "list_customers")?;
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        Ok(self.repo.list_customers(search).await?)
    }

    /// Update a customer's contact details. Admins may edit any customer;
    /// a customer may edit its own profile.
    pub async fn update_customer(
        &self,
        caller: &Caller,
        customer_id: UserId,
        profile: CustomerProfile,
    ) -> Result<User, AppError> {
        if !caller.can_view(customer_id) {
            return Err(AppError::Forbidden {
                action: "update_customer",
            });
        }
        if let Some(phone) = profile.mobile_phone.as_deref().map(str::trim) {
            if !phone.is_empty() && !is_valid_mobile_phone(phone) {
                return Err(AppError::validation(
                    "mobile_phone",
                    format!("'{}' is not an 11-digit mobile number", phone),
                ));
            }
        }
        let mut customer = self.load_customer(customer_id).await?;

        customer.apply_profile(profile);
        self.repo.update_user_profile(&customer).await?;
        info!(customer_id = %customer.id, "Updated customer profile");
        Ok(customer)
    }

    /// Delete a customer account. Only accounts with a zero balance and no
    /// ads or transactions can go; anything else would lose ledger history.
    pub async fn delete_customer(
        &self,
        caller: &Caller,
        customer_id: UserId,
    ) -> Result<User, AppError> {
        require_admin(caller, "delete_customer")?;
        let customer = self.load_customer(customer_id).await?;

        if !self.repo.delete_customer_if_unused(customer.id).await? {
            return Err(AppError::validation(
                "customer",
                "customer still has a balance, ads or transactions",
            ));
        }
        info!(customer_id = %customer.id, username = %customer.username, "Deleted customer");
        Ok(customer)
    }

    pub(super) async fn load_customer(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .filter(User::is_customer)
            .ok_or_else(|| AppError::CustomerNotFound(id.to_string()))
    }

    /// Load an ad and check that it belongs to `customer_id`. An ad owned by
    /// someone else is reported as not found.
    pub(super) async fn load_customer_ad(
        &self,
        customer_id: UserId,
        ad_id: AdId,
    ) -> Result<Ad, AppError> {
        self.repo
            .get_ad(ad_id)
            .await?
            .filter(|ad| ad.customer_id == customer_id)
            .ok_or_else(|| AppError::AdNotFound(ad_id.to_string()))
    }

    // ========================
    // Ad operations
    // ========================

    /// Create an ad for a customer.
    pub async fn create_ad(
        &self,
        caller: &Caller,
        customer_id: UserId,
        draft: AdDraft,
    ) -> Result<Ad, AppError> {
        require_admin(caller, "create_ad")?;
        let draft = validate_draft(draft)?;
        let customer = self.load_customer(customer_id).await?;

        let ad = Ad::new(customer.id, draft);
        self.repo.save_ad(&ad).await?;
        info!(ad_id = %ad.id, customer_id = %customer.id, "Created ad");
        Ok(ad)
    }

    /// Update an ad's attributes. Fields left unset in the draft are kept.
    pub async fn update_ad(
        &self,
        caller: &Caller,
        customer_id: UserId,
        ad_id: AdId,
        draft: AdDraft,
    ) -> Result<Ad, AppError> {
        require_admin(caller, "update_ad")?;
        let draft = validate_draft(draft)?;
        let mut ad = self.load_customer_ad(customer_id, ad_id).await?;

        ad.apply(draft);
        self.repo.update_ad(&ad).await?;
        Ok(ad)
    }

    /// Get one of a customer's ads.
    pub async fn get_ad(
        &self,
        caller: &Caller,
        customer_id: UserId,
        ad_id: AdId,
    ) -> Result<Ad, AppError> {
        require_view(caller, customer_id)?;
        self.load_customer_ad(customer_id, ad_id).await
    }

    /// List a customer's ads, newest first.
    pub async fn list_ads(&self, caller: &Caller, customer_id: UserId) -> Result<Vec<Ad>, AppError> {
        require_view(caller, customer_id)?;
        let customer = self.load_customer(customer_id).await?;
        Ok(self.repo.list_ads_for_customer(customer.id).await?)
    }

    /// Delete an ad. Ads with spend logs cannot be deleted: their logs would
    /// disappear without the matching refunds.
    pub async fn delete_ad(
        &self,
        caller: &Caller,
        customer_id: UserId,
        ad_id: AdId,
    ) -> Result<Ad, AppError> {
        require_admin(caller, "delete_ad")?;
        let ad = self.load_customer_ad(customer_id, ad_id).await?;

        if !self.repo.delete_ad_if_unused(ad.id).await? {
            return Err(AppError::validation(
                "ad",
                "ad still has spend logs; delete them first",
            ));
        }
        info!(ad_id = %ad.id, customer_id = %customer_id, "Deleted ad");
        Ok(ad)
    }
}

/// Parse a user-supplied decimal amount into cents.
pub fn parse_amount(input: &str) -> Result<Cents, AppError> {
    parse_cents(input).map_err(|err| match err {
        ParseCentsError::TooPrecise => AppError::validation("amount", err.to_string()),
        _ => AppError::validation("amount", format!("{} ('{}')", err, input.trim())),
    })
}

pub(super) fn require_admin(caller: &Caller, action: &'static str) -> Result<(), AppError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden { action })
    }
}

pub(super) fn require_view(caller: &Caller, customer_id: UserId) -> Result<(), AppError> {
    if caller.can_view(customer_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            action: "view_other_customer",
        })
    }
}

pub(super) fn require_positive(amount_cents: Cents) -> Result<(), AppError> {
    if amount_cents > 0 {
        Ok(())
    } else {
        Err(AppError::validation(
            "amount",
            format!("must be positive, got {}", crate::domain::format_cents(amount_cents)),
        ))
    }
}

fn normalize_username(username: &str) -> Result<String, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username", "must not be empty"));
    }
    Ok(username.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_draft(mut draft: AdDraft) -> Result<AdDraft, AppError> {
    draft.name = draft.name.trim().to_string();
    if draft.name.is_empty() {
        return Err(AppError::validation("name", "ad name must not be empty"));
    }
    if draft.unit_price_cents.is_some_and(|p| p < 0) {
        return Err(AppError::validation("unit_price", "must not be negative"));
    }
    if draft.budget_cents.is_some_and(|b| b < 0) {
        return Err(AppError::validation("budget", "must not be negative"));
    }
    draft.platform = non_blank(draft.platform);
    draft.billing_type = non_blank(draft.billing_type);
    draft.ad_format = non_blank(draft.ad_format);
    Ok(draft)
}
