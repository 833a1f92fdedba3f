use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    is_storable_date, Ad, AdId, AdSpendLog, AdStatus, Cents, FinancialTransaction, LedgerTotals, Role, SpendLogId,
    TransactionType, User, UserId,
};

use super::MIGRATION_001_INITIAL;

/// A store transaction. Every balance mutation runs inside exactly one.
pub type StoreTx = Transaction<'static, Sqlite>;

const USER_COLUMNS: &str =
    "id, username, role, balance_cents, company_name, company_website, contact_person, mobile_phone, contact_qq, created_at";
const AD_COLUMNS: &str = "id, customer_id, name, status, platform, unit_price_cents, budget_cents, billing_type, ad_format, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, customer_id, amount_cents, transaction_type, note, timestamp";
const SPEND_LOG_COLUMNS: &str =
    "id, ad_id, amount_cents, platform, spend_date, creator_id, created_at";

/// Filter for aggregating spend logs of one customer.
#[derive(Debug, Clone)]
pub struct SpendQuery {
    pub customer_id: UserId,
    /// Inclusive lower bound on spend date
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound on spend date
    pub until: Option<NaiveDate>,
    pub platform: Option<String>,
    pub ad_id: Option<AdId>,
}

impl SpendQuery {
    pub fn for_customer(customer_id: UserId) -> Self {
        Self {
            customer_id,
            from: None,
            until: None,
            platform: None,
            ad_id: None,
        }
    }

    pub fn between(mut self, from: NaiveDate, until: NaiveDate) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    pub fn for_ad(mut self, ad_id: AdId) -> Self {
        self.ad_id = Some(ad_id);
        self
    }

    /// Every stored date lies before an upper bound past year 9999, whose
    /// text form would not sort after them.
    fn until_bound(&self) -> Option<NaiveDate> {
        self.until.filter(|until| is_storable_date(*until))
    }

    fn where_clause(&self) -> String {
        let mut clause = String::from(" WHERE a.customer_id = ?");
        if self.from.is_some() {
            clause.push_str(" AND l.spend_date >= ?");
        }
        if self.until_bound().is_some() {
            clause.push_str(" AND l.spend_date < ?");
        }
        if self.platform.is_some() {
            clause.push_str(" AND l.platform = ?");
        }
        if self.ad_id.is_some() {
            clause.push_str(" AND l.ad_id = ?");
        }
        clause
    }

    fn bind_values(&self) -> Vec<String> {
        let mut values = vec![self.customer_id.to_string()];
        if let Some(from) = self.from {
            values.push(from.to_string());
        }
        if let Some(until) = self.until_bound() {
            values.push(until.to_string());
        }
        if let Some(platform) = &self.platform {
            values.push(platform.clone());
        }
        if let Some(ad_id) = self.ad_id {
            values.push(ad_id.to_string());
        }
        values
    }
}

/// Repository for persisting and querying accounts, ads and ledger records.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    ///
    /// Writers wait up to `busy_timeout` for the database write lock before
    /// the statement fails as busy.
    pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// The underlying pool, for callers that need raw access (tests, tooling).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a store transaction.
    ///
    /// Statements inside the transaction should write before they read so
    /// that a contended write lock is waited for rather than failing on a
    /// stale snapshot.
    pub async fn begin(&self) -> Result<StoreTx> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    // ========================
    // User operations
    // ========================

    /// Save a new user to the database.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role, balance_cents, company_name, company_website, contact_person, mobile_phone, contact_qq, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(user.role.as_str())
        .bind(user.balance_cents)
        .bind(&user.company_name)
        .bind(&user.company_website)
        .bind(&user.contact_person)
        .bind(&user.mobile_phone)
        .bind(&user.contact_qq)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    /// Write a user's contact details. Identity, role and balance are
    /// untouched.
    pub async fn update_user_profile(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET company_name = ?, company_website = ?, contact_person = ?, mobile_phone = ?, contact_qq = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.company_name)
        .bind(&user.company_website)
        .bind(&user.contact_person)
        .bind(&user.mobile_phone)
        .bind(&user.contact_qq)
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update user profile")?;
        Ok(())
    }

    /// Delete a customer with a zero balance and no ads or transactions.
    /// Returns false when any of those remain.
    pub async fn delete_customer_if_unused(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = ?
              AND role = 'customer'
              AND balance_cents = 0
              AND NOT EXISTS (SELECT 1 FROM ads WHERE customer_id = users.id)
              AND NOT EXISTS (SELECT 1 FROM financial_transactions WHERE customer_id = users.id)
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to delete customer")?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// List customers, newest first, optionally filtered by a
    /// case-insensitive username substring.
    pub async fn list_customers(&self, search: Option<&str>) -> Result<Vec<User>> {
        let mut query = format!("SELECT {USER_COLUMNS} FROM users WHERE role = 'customer'");
        if search.is_some() {
            query.push_str(" AND username LIKE '%' || ? || '%'");
        }
        query.push_str(" ORDER BY created_at DESC, username");

        let mut sql_query = sqlx::query(&query);
        if let Some(term) = search {
            sql_query = sql_query.bind(term);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list customers")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    /// Add `delta_cents` to a customer's balance. Returns the new balance, or
    /// `None` when no such customer exists.
    pub async fn adjust_balance(
        tx: &mut StoreTx,
        customer_id: UserId,
        delta_cents: Cents,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET balance_cents = balance_cents + ?
            WHERE id = ? AND role = 'customer'
            RETURNING balance_cents
            "#,
        )
        .bind(delta_cents)
        .bind(customer_id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to adjust balance")?;

        row.map(|row| row.try_get::<Cents, _>("balance_cents"))
            .transpose()
            .context("Balance is no longer a whole number of cents")
    }

    /// Subtract `amount_cents` from a customer's balance only if the balance
    /// covers it. Returns the new balance, or `None` when the balance is
    /// insufficient (or the customer is gone).
    ///
    /// The floor check and the write are one statement, so concurrent debits
    /// cannot both pass the check.
    pub async fn debit_balance(
        tx: &mut StoreTx,
        customer_id: UserId,
        amount_cents: Cents,
    ) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET balance_cents = balance_cents - ?
            WHERE id = ? AND role = 'customer' AND balance_cents >= ?
            RETURNING balance_cents
            "#,
        )
        .bind(amount_cents)
        .bind(customer_id.to_string())
        .bind(amount_cents)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to debit balance")?;

        row.map(|row| row.try_get::<Cents, _>("balance_cents"))
            .transpose()
            .context("Balance is no longer a whole number of cents")
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            username: row.get("username"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            balance_cents: row.get("balance_cents"),
            company_name: row.get("company_name"),
            company_website: row.get("company_website"),
            contact_person: row.get("contact_person"),
            mobile_phone: row.get("mobile_phone"),
            contact_qq: row.get("contact_qq"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Ad operations
    // ========================

    /// Save a new ad to the database.
    pub async fn save_ad(&self, ad: &Ad) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ads (id, customer_id, name, status, platform, unit_price_cents, budget_cents, billing_type, ad_format, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ad.id.to_string())
        .bind(ad.customer_id.to_string())
        .bind(&ad.name)
        .bind(ad.status.as_str())
        .bind(&ad.platform)
        .bind(ad.unit_price_cents)
        .bind(ad.budget_cents)
        .bind(&ad.billing_type)
        .bind(&ad.ad_format)
        .bind(ad.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save ad")?;
        Ok(())
    }

    /// Overwrite an ad's editable attributes.
    pub async fn update_ad(&self, ad: &Ad) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ads
            SET name = ?, status = ?, platform = ?, unit_price_cents = ?, budget_cents = ?, billing_type = ?, ad_format = ?
            WHERE id = ?
            "#,
        )
        .bind(&ad.name)
        .bind(ad.status.as_str())
        .bind(&ad.platform)
        .bind(ad.unit_price_cents)
        .bind(ad.budget_cents)
        .bind(&ad.billing_type)
        .bind(&ad.ad_format)
        .bind(ad.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update ad")?;
        Ok(())
    }

    /// Get an ad by ID.
    pub async fn get_ad(&self, id: AdId) -> Result<Option<Ad>> {
        let row = sqlx::query(&format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch ad")?;

        row.as_ref().map(Self::row_to_ad).transpose()
    }

    /// List a customer's ads, newest first.
    pub async fn list_ads_for_customer(&self, customer_id: UserId) -> Result<Vec<Ad>> {
        let rows = sqlx::query(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE customer_id = ? ORDER BY created_at DESC, name"
        ))
        .bind(customer_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ads")?;

        rows.iter().map(Self::row_to_ad).collect()
    }

    /// Delete an ad that has no spend logs. Returns false when spend logs
    /// still reference it.
    pub async fn delete_ad_if_unused(&self, id: AdId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM ads
            WHERE id = ?
              AND NOT EXISTS (SELECT 1 FROM ad_spend_logs WHERE ad_id = ads.id)
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to delete ad")?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_ad(row: &SqliteRow) -> Result<Ad> {
        let id_str: String = row.get("id");
        let customer_id_str: String = row.get("customer_id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        Ok(Ad {
            id: Uuid::parse_str(&id_str).context("Invalid ad ID")?,
            customer_id: Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?,
            name: row.get("name"),
            status: AdStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid ad status: {}", status_str))?,
            platform: row.get("platform"),
            unit_price_cents: row.get("unit_price_cents"),
            budget_cents: row.get("budget_cents"),
            billing_type: row.get("billing_type"),
            ad_format: row.get("ad_format"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Financial transaction operations
    // ========================

    /// Insert a financial transaction inside a store transaction.
    pub async fn insert_transaction(
        tx: &mut StoreTx,
        transaction: &FinancialTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO financial_transactions (id, customer_id, amount_cents, transaction_type, note, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.customer_id.to_string())
        .bind(transaction.amount_cents)
        .bind(transaction.transaction_type.as_str())
        .bind(&transaction.note)
        .bind(transaction.timestamp.to_rfc3339())
        .execute(&mut **tx)
        .await
        .context("Failed to save financial transaction")?;
        Ok(())
    }

    /// List a customer's transactions, newest first.
    pub async fn list_transactions(
        &self,
        customer_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<FinancialTransaction>> {
        let mut query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM financial_transactions WHERE customer_id = ? ORDER BY timestamp DESC, rowid DESC"
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .bind(customer_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list financial transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<FinancialTransaction> {
        let id_str: String = row.get("id");
        let customer_id_str: String = row.get("customer_id");
        let type_str: String = row.get("transaction_type");
        let timestamp_str: String = row.get("timestamp");

        Ok(FinancialTransaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            customer_id: Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?,
            amount_cents: row.get("amount_cents"),
            transaction_type: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            note: row.get("note"),
            timestamp: parse_timestamp(&timestamp_str).context("Invalid timestamp")?,
        })
    }

    // ========================
    // Spend log operations
    // ========================

    /// Insert a spend log inside a store transaction.
    pub async fn insert_spend_log(tx: &mut StoreTx, log: &AdSpendLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ad_spend_logs (id, ad_id, amount_cents, platform, spend_date, creator_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.ad_id.to_string())
        .bind(log.amount_cents)
        .bind(&log.platform)
        .bind(log.spend_date.to_string())
        .bind(log.creator_id.to_string())
        .bind(log.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .context("Failed to save spend log")?;
        Ok(())
    }

    /// Delete a spend log inside a store transaction and return the deleted
    /// row. `None` means it was already gone.
    pub async fn delete_spend_log(tx: &mut StoreTx, id: SpendLogId) -> Result<Option<AdSpendLog>> {
        let row = sqlx::query(&format!(
            "DELETE FROM ad_spend_logs WHERE id = ? RETURNING {SPEND_LOG_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to delete spend log")?;

        row.as_ref().map(Self::row_to_spend_log).transpose()
    }

    /// Get a spend log by ID.
    pub async fn get_spend_log(&self, id: SpendLogId) -> Result<Option<AdSpendLog>> {
        let row = sqlx::query(&format!(
            "SELECT {SPEND_LOG_COLUMNS} FROM ad_spend_logs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch spend log")?;

        row.as_ref().map(Self::row_to_spend_log).transpose()
    }

    /// List an ad's spend logs, latest spend date first.
    pub async fn list_spend_logs_for_ad(&self, ad_id: AdId) -> Result<Vec<AdSpendLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {SPEND_LOG_COLUMNS} FROM ad_spend_logs WHERE ad_id = ? ORDER BY spend_date DESC, created_at DESC"
        ))
        .bind(ad_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list spend logs")?;

        rows.iter().map(Self::row_to_spend_log).collect()
    }

    /// Count the live spend logs across all of a customer's ads.
    pub async fn count_spend_logs_for_customer(&self, customer_id: UserId) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM ad_spend_logs l
            JOIN ads a ON a.id = l.ad_id
            WHERE a.customer_id = ?
            "#,
        )
        .bind(customer_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count spend logs")?;

        Ok(row.get("count"))
    }

    fn row_to_spend_log(row: &SqliteRow) -> Result<AdSpendLog> {
        let id_str: String = row.get("id");
        let ad_id_str: String = row.get("ad_id");
        let spend_date_str: String = row.get("spend_date");
        let creator_id_str: String = row.get("creator_id");
        let created_at_str: String = row.get("created_at");

        Ok(AdSpendLog {
            id: Uuid::parse_str(&id_str).context("Invalid spend log ID")?,
            ad_id: Uuid::parse_str(&ad_id_str).context("Invalid ad ID")?,
            amount_cents: row.get("amount_cents"),
            platform: row.get("platform"),
            spend_date: NaiveDate::parse_from_str(&spend_date_str, "%Y-%m-%d")
                .context("Invalid spend date")?,
            creator_id: Uuid::parse_str(&creator_id_str).context("Invalid creator ID")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Aggregations
    // ========================

    /// Sum spend matching the query.
    pub async fn sum_spend(&self, query: &SpendQuery) -> Result<Cents> {
        let sql = format!(
            "SELECT COALESCE(SUM(l.amount_cents), 0) as total FROM ad_spend_logs l JOIN ads a ON a.id = l.ad_id{}",
            query.where_clause()
        );

        let mut sql_query = sqlx::query(&sql);
        for value in query.bind_values() {
            sql_query = sql_query.bind(value);
        }

        let row = sql_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to sum spend")?;

        Ok(row.get("total"))
    }

    /// Sum spend matching the query per spend date, oldest date first.
    pub async fn spend_by_date(&self, query: &SpendQuery) -> Result<Vec<(NaiveDate, Cents)>> {
        let sql = format!(
            "SELECT l.spend_date as spend_date, SUM(l.amount_cents) as total FROM ad_spend_logs l JOIN ads a ON a.id = l.ad_id{} GROUP BY l.spend_date ORDER BY l.spend_date",
            query.where_clause()
        );

        let mut sql_query = sqlx::query(&sql);
        for value in query.bind_values() {
            sql_query = sql_query.bind(value);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to group spend by date")?;

        rows.iter()
            .map(|row| {
                let date_str: String = row.get("spend_date");
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                    .context("Invalid spend date")?;
                Ok((date, row.get("total")))
            })
            .collect()
    }

    /// Balance and history totals for every customer.
    pub async fn ledger_totals(&self) -> Result<Vec<LedgerTotals>> {
        let rows = sqlx::query(
            r#"
            SELECT
                u.id,
                u.username,
                u.balance_cents,
                COALESCE((
                    SELECT SUM(t.amount_cents)
                    FROM financial_transactions t
                    WHERE t.customer_id = u.id
                ), 0) as transactions_total,
                COALESCE((
                    SELECT SUM(l.amount_cents)
                    FROM ad_spend_logs l
                    JOIN ads a ON a.id = l.ad_id
                    WHERE a.customer_id = u.id
                ), 0) as live_spend_total
            FROM users u
            WHERE u.role = 'customer'
            ORDER BY u.username
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute ledger totals")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                Ok(LedgerTotals {
                    customer_id: Uuid::parse_str(&id_str).context("Invalid customer ID")?,
                    username: row.get("username"),
                    balance_cents: row.get("balance_cents"),
                    transactions_total: row.get("transactions_total"),
                    live_spend_total: row.get("live_spend_total"),
                })
            })
            .collect()
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
