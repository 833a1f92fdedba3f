use std::io::stdout;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{parse_amount, DetailFilter, LedgerService};
use crate::config::{Settings, DEFAULT_BUSY_TIMEOUT_SECS, DEFAULT_USER};
use crate::domain::{
    format_cents, reference_today, AdDraft, AdStatus, Caller, CustomerProfile, NewSpend,
    DEFAULT_UTC_OFFSET_HOURS,
};

/// Adledger - ad-account balance ledger
#[derive(Parser)]
#[command(name = "adledger")]
#[command(about = "Customer balances, ad spend and spend statistics for an ad agency")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "ADLEDGER_DATABASE", default_value = "adledger.db")]
    pub database: String,

    /// Username to act as
    #[arg(short = 'u', long = "as", env = "ADLEDGER_USER", default_value = DEFAULT_USER)]
    pub user: String,

    /// Hours east of UTC of the timezone that defines "today"
    #[arg(long, env = "ADLEDGER_UTC_OFFSET", default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
    pub utc_offset: i32,

    /// Seconds a write waits for the database lock
    #[arg(long, env = "ADLEDGER_BUSY_TIMEOUT", default_value_t = DEFAULT_BUSY_TIMEOUT_SECS)]
    pub busy_timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and the admin account
    Init,

    /// Customer account management
    #[command(subcommand)]
    Customer(CustomerCommands),

    /// Ad management
    #[command(subcommand)]
    Ad(AdCommands),

    /// Recharges and deductions
    #[command(subcommand)]
    Finance(FinanceCommands),

    /// Ad spend records
    #[command(subcommand)]
    Spend(SpendCommands),

    /// Spend statistics
    #[command(subcommand)]
    Stats(StatsCommands),

    /// Reconcile every balance against its history
    Check {
        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Create a customer account
    Create {
        /// Username (must be unique)
        username: String,

        /// Company name
        #[arg(long)]
        company: Option<String>,

        /// Contact person
        #[arg(long)]
        contact: Option<String>,
    },

    /// List customers
    List {
        /// Only usernames containing this text
        #[arg(short, long)]
        search: Option<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show a customer account
    Show {
        /// Customer username
        username: String,
    },

    /// Edit a customer's contact details (an empty value clears a field)
    Update {
        /// Customer username
        username: String,

        /// Company name
        #[arg(long)]
        company: Option<String>,

        /// Company website
        #[arg(long)]
        website: Option<String>,

        /// Contact person
        #[arg(long)]
        contact: Option<String>,

        /// Mobile phone (11 digits)
        #[arg(long)]
        phone: Option<String>,

        /// QQ number
        #[arg(long)]
        qq: Option<String>,
    },

    /// Delete a customer with no balance, ads or transactions
    Delete {
        /// Customer username
        username: String,
    },
}

#[derive(Subcommand)]
pub enum AdCommands {
    /// Create an ad for a customer
    Create {
        /// Customer username
        customer: String,

        /// Ad name
        name: String,

        #[command(flatten)]
        attributes: AdAttributes,
    },

    /// Update an ad
    Update {
        /// Customer username
        customer: String,

        /// Ad ID
        id: String,

        /// New ad name
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        attributes: AdAttributes,
    },

    /// List a customer's ads with their spend
    List {
        /// Customer username
        customer: String,
    },

    /// Delete an ad without spend logs
    Delete {
        /// Customer username
        customer: String,

        /// Ad ID
        id: String,
    },
}

#[derive(clap::Args)]
pub struct AdAttributes {
    /// Status: active, paused
    #[arg(long)]
    status: Option<String>,

    /// Ad platform
    #[arg(long)]
    platform: Option<String>,

    /// Unit price (e.g., "0.50")
    #[arg(long)]
    unit_price: Option<String>,

    /// Budget (e.g., "1000.00")
    #[arg(long)]
    budget: Option<String>,

    /// Billing type (e.g., CPC, CPM)
    #[arg(long)]
    billing_type: Option<String>,

    /// Ad format (e.g., video, banner)
    #[arg(long)]
    ad_format: Option<String>,
}

#[derive(Subcommand)]
pub enum FinanceCommands {
    /// Add credit to a customer's balance
    Recharge {
        /// Customer username
        customer: String,

        /// Amount (e.g., "100.00" or "100")
        amount: String,

        /// Note stored with the transaction
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Remove credit from a customer's balance (may go negative)
    Deduct {
        /// Customer username
        customer: String,

        /// Amount (e.g., "20.00" or "20")
        amount: String,

        /// Note stored with the transaction
        #[arg(short, long)]
        note: Option<String>,
    },

    /// List a customer's transactions
    List {
        /// Customer username
        customer: String,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum SpendCommands {
    /// Record ad spend and charge it to the customer
    Record {
        /// Customer username
        customer: String,

        /// Ad ID
        ad: String,

        /// Amount (e.g., "30.00")
        amount: String,

        /// Platform the spend happened on
        #[arg(short, long)]
        platform: String,

        /// Spend date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a spend log and refund its amount
    Delete {
        /// Spend log ID
        id: String,
    },

    /// Replace a spend log with a new one
    Edit {
        /// Spend log ID to replace
        id: String,

        /// Customer username
        customer: String,

        /// Ad ID for the replacement
        ad: String,

        /// Replacement amount
        amount: String,

        /// Platform the spend happened on
        #[arg(short, long)]
        platform: String,

        /// Spend date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// List the spend logs of an ad
    List {
        /// Customer username
        customer: String,

        /// Ad ID
        ad: String,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Balance and spend for today, this week and the last 7 days
    Summary {
        /// Customer username
        customer: String,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Spend per day
    Details {
        /// Customer username
        customer: String,

        /// First day (YYYY-MM-DD, defaults to 30 days ago)
        #[arg(long)]
        from: Option<String>,

        /// Last day (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        to: Option<String>,

        /// Only spend on this platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Only spend of this ad
        #[arg(long)]
        ad: Option<String>,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Total and today's spend per ad
    Ads {
        /// Customer username
        customer: String,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings::new(self.database.clone())
            .with_utc_offset_hours(self.utc_offset)
            .with_busy_timeout(Duration::from_secs(self.busy_timeout))
            .with_user(self.user.clone())
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.settings();

        match self.command {
            Commands::Init => {
                let service = LedgerService::open(&settings, true).await?;
                let admin = service.ensure_admin(&settings.user).await?;
                println!("Database initialized: {}", settings.database);
                println!("Admin account: {}", admin.username);
            }

            command => {
                let service = LedgerService::open(&settings, false).await?;
                let caller = service.resolve_caller(&settings.user).await?;
                run_command(&service, &caller, command).await?;
            }
        }

        Ok(())
    }
}

async fn run_command(service: &LedgerService, caller: &Caller, command: Commands) -> Result<()> {
    match command {
        // Runs before any caller exists; see `Cli::run`.
        Commands::Init => {}
        Commands::Customer(cmd) => run_customer_command(service, caller, cmd).await?,
        Commands::Ad(cmd) => run_ad_command(service, caller, cmd).await?,
        Commands::Finance(cmd) => run_finance_command(service, caller, cmd).await?,
        Commands::Spend(cmd) => run_spend_command(service, caller, cmd).await?,
        Commands::Stats(cmd) => run_stats_command(service, caller, cmd).await?,
        Commands::Check { format } => run_check_command(service, caller, &format).await?,
    }
    Ok(())
}

async fn run_customer_command(
    service: &LedgerService,
    caller: &Caller,
    cmd: CustomerCommands,
) -> Result<()> {
    match cmd {
        CustomerCommands::Create {
            username,
            company,
            contact,
        } => {
            let customer = service
                .create_customer(caller, &username, company, contact)
                .await?;
            println!("Created customer: {} ({})", customer.username, customer.id);
        }

        CustomerCommands::List { search, format } => {
            let customers = service.list_customers(caller, search.as_deref()).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&customers)?),
                _ => {
                    if customers.is_empty() {
                        println!("No customers found.");
                    } else {
                        println!("{:<20} {:>12} {:<24} CONTACT", "USERNAME", "BALANCE", "COMPANY");
                        println!("{}", "-".repeat(70));
                        for customer in customers {
                            println!(
                                "{:<20} {:>12} {:<24} {}",
                                truncate(&customer.username, 20),
                                format_cents(customer.balance_cents),
                                truncate(customer.company_name.as_deref().unwrap_or(""), 24),
                                customer.contact_person.as_deref().unwrap_or("")
                            );
                        }
                    }
                }
            }
        }

        CustomerCommands::Show { username } => {
            let customer = service.get_customer_by_username(caller, &username).await?;
            println!("Customer: {}", customer.username);
            println!("  ID:       {}", customer.id);
            if let Some(company) = &customer.company_name {
                println!("  Company:  {}", company);
            }
            if let Some(website) = &customer.company_website {
                println!("  Website:  {}", website);
            }
            if let Some(contact) = &customer.contact_person {
                println!("  Contact:  {}", contact);
            }
            if let Some(phone) = &customer.mobile_phone {
                println!("  Phone:    {}", phone);
            }
            if let Some(qq) = &customer.contact_qq {
                println!("  QQ:       {}", qq);
            }
            println!(
                "  Created:  {}",
                customer.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Balance:  {}", format_cents(customer.balance_cents));
        }

        CustomerCommands::Update {
            username,
            company,
            website,
            contact,
            phone,
            qq,
        } => {
            let customer = service.get_customer_by_username(caller, &username).await?;
            let profile = CustomerProfile {
                company_name: company,
                company_website: website,
                contact_person: contact,
                mobile_phone: phone,
                contact_qq: qq,
            };
            let customer = service.update_customer(caller, customer.id, profile).await?;
            println!("Updated customer: {} ({})", customer.username, customer.id);
        }

        CustomerCommands::Delete { username } => {
            let customer = service.get_customer_by_username(caller, &username).await?;
            let customer = service.delete_customer(caller, customer.id).await?;
            println!("Deleted customer: {} ({})", customer.username, customer.id);
        }
    }
    Ok(())
}

async fn run_ad_command(service: &LedgerService, caller: &Caller, cmd: AdCommands) -> Result<()> {
    match cmd {
        AdCommands::Create {
            customer,
            name,
            attributes,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let draft = attributes.into_draft(name)?;
            let ad = service.create_ad(caller, customer.id, draft).await?;
            println!("Created ad: {} [{}] ({})", ad.name, ad.status, ad.id);
        }

        AdCommands::Update {
            customer,
            id,
            name,
            attributes,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let ad_id = parse_id(&id, "ad")?;
            let name = match name {
                Some(name) => name,
                None => service.get_ad(caller, customer.id, ad_id).await?.name,
            };
            let draft = attributes.into_draft(name)?;
            let ad = service.update_ad(caller, customer.id, ad_id, draft).await?;
            println!("Updated ad: {} [{}] ({})", ad.name, ad.status, ad.id);
        }

        AdCommands::List { customer } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let ads = service.list_ads(caller, customer.id).await?;
            if ads.is_empty() {
                println!("No ads found.");
            } else {
                println!(
                    "{:<36} {:<20} {:<8} {:<12} {:>12}",
                    "ID", "NAME", "STATUS", "PLATFORM", "BUDGET"
                );
                println!("{}", "-".repeat(92));
                for ad in ads {
                    println!(
                        "{:<36} {:<20} {:<8} {:<12} {:>12}",
                        ad.id,
                        truncate(&ad.name, 20),
                        ad.status,
                        truncate(ad.platform.as_deref().unwrap_or(""), 12),
                        ad.budget_cents.map(format_cents).unwrap_or_default()
                    );
                }
            }
        }

        AdCommands::Delete { customer, id } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let ad_id = parse_id(&id, "ad")?;
            let ad = service.delete_ad(caller, customer.id, ad_id).await?;
            println!("Deleted ad: {} ({})", ad.name, ad.id);
        }
    }
    Ok(())
}

impl AdAttributes {
    fn into_draft(self, name: String) -> Result<AdDraft> {
        let status = self
            .status
            .map(|s| {
                AdStatus::from_str(&s).ok_or_else(|| {
                    anyhow::anyhow!("Invalid status '{}'. Valid: active, paused", s)
                })
            })
            .transpose()?;

        Ok(AdDraft {
            name,
            status,
            platform: self.platform,
            unit_price_cents: self.unit_price.as_deref().map(parse_amount).transpose()?,
            budget_cents: self.budget.as_deref().map(parse_amount).transpose()?,
            billing_type: self.billing_type,
            ad_format: self.ad_format,
        })
    }
}

async fn run_finance_command(
    service: &LedgerService,
    caller: &Caller,
    cmd: FinanceCommands,
) -> Result<()> {
    match cmd {
        FinanceCommands::Recharge {
            customer,
            amount,
            note,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let amount_cents = parse_amount(&amount)?;
            let result = service
                .recharge(caller, customer.id, amount_cents, note)
                .await?;
            println!(
                "Recharged {}: {} (balance {})",
                customer.username,
                format_cents(amount_cents),
                format_cents(result.updated_balance)
            );
        }

        FinanceCommands::Deduct {
            customer,
            amount,
            note,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let amount_cents = parse_amount(&amount)?;
            let result = service.deduct(caller, customer.id, amount_cents, note).await?;
            println!(
                "Deducted {}: {} (balance {})",
                customer.username,
                format_cents(amount_cents),
                format_cents(result.updated_balance)
            );
        }

        FinanceCommands::List {
            customer,
            limit,
            format,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let transactions = service.list_transactions(caller, customer.id, limit).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&transactions)?),
                "csv" => {
                    let mut writer = csv::Writer::from_writer(stdout());
                    writer.write_record(["id", "timestamp", "type", "amount_cents", "note"])?;
                    for t in &transactions {
                        writer.write_record([
                            t.id.to_string(),
                            t.timestamp.to_rfc3339(),
                            t.transaction_type.to_string(),
                            t.amount_cents.to_string(),
                            t.note.clone(),
                        ])?;
                    }
                    writer.flush()?;
                }
                _ => {
                    if transactions.is_empty() {
                        println!("No transactions found.");
                    } else {
                        println!("{:<20} {:<10} {:>12} NOTE", "DATE", "TYPE", "AMOUNT");
                        println!("{}", "-".repeat(60));
                        for t in &transactions {
                            println!(
                                "{:<20} {:<10} {:>12} {}",
                                t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                                t.transaction_type,
                                format_cents(t.amount_cents),
                                truncate(&t.note, 30)
                            );
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_spend_command(
    service: &LedgerService,
    caller: &Caller,
    cmd: SpendCommands,
) -> Result<()> {
    match cmd {
        SpendCommands::Record {
            customer,
            ad,
            amount,
            platform,
            date,
        } => {
            let spend = build_spend(service, caller, &customer, &ad, &amount, platform, date).await?;
            let result = service.record_spend(caller, spend).await?;
            println!(
                "Recorded spend: {} on {} (balance {}) ({})",
                format_cents(result.spend_log.amount_cents),
                result.spend_log.spend_date,
                format_cents(result.updated_balance),
                result.spend_log.id
            );
        }

        SpendCommands::Delete { id } => {
            let spend_log_id = parse_id(&id, "spend log")?;
            let result = service.delete_spend(caller, spend_log_id).await?;
            println!(
                "Deleted spend: refunded {} (balance {})",
                format_cents(result.refunded_amount),
                format_cents(result.updated_balance)
            );
        }

        SpendCommands::Edit {
            id,
            customer,
            ad,
            amount,
            platform,
            date,
        } => {
            let spend_log_id = parse_id(&id, "spend log")?;
            let spend = build_spend(service, caller, &customer, &ad, &amount, platform, date).await?;
            let result = service.amend_spend(caller, spend_log_id, spend).await?;
            println!(
                "Replaced spend {} ({}) with {} ({})",
                result.deleted.spend_log.id,
                format_cents(result.deleted.refunded_amount),
                result.recorded.spend_log.id,
                format_cents(result.recorded.spend_log.amount_cents)
            );
            println!("Balance: {}", format_cents(result.recorded.updated_balance));
        }

        SpendCommands::List {
            customer,
            ad,
            format,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let ad_id = parse_id(&ad, "ad")?;
            let logs = service.list_spend_logs(caller, customer.id, ad_id).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&logs)?),
                "csv" => {
                    let mut writer = csv::Writer::from_writer(stdout());
                    writer.write_record(["id", "spend_date", "platform", "amount_cents"])?;
                    for log in &logs {
                        writer.write_record([
                            log.id.to_string(),
                            log.spend_date.to_string(),
                            log.platform.clone(),
                            log.amount_cents.to_string(),
                        ])?;
                    }
                    writer.flush()?;
                }
                _ => {
                    if logs.is_empty() {
                        println!("No spend logs found.");
                    } else {
                        println!("{:<36} {:<12} {:<12} {:>12}", "ID", "DATE", "PLATFORM", "AMOUNT");
                        println!("{}", "-".repeat(75));
                        for log in &logs {
                            println!(
                                "{:<36} {:<12} {:<12} {:>12}",
                                log.id,
                                log.spend_date,
                                truncate(&log.platform, 12),
                                format_cents(log.amount_cents)
                            );
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn build_spend(
    service: &LedgerService,
    caller: &Caller,
    customer: &str,
    ad: &str,
    amount: &str,
    platform: String,
    date: Option<String>,
) -> Result<NewSpend> {
    let customer = service.get_customer_by_username(caller, customer).await?;
    let spend_date = match date {
        Some(date) => parse_date(&date)?,
        None => reference_today(Utc::now(), service.reference_offset()),
    };

    Ok(NewSpend {
        ad_id: parse_id(ad, "ad")?,
        customer_id: customer.id,
        amount_cents: parse_amount(amount)?,
        platform,
        spend_date,
    })
}

async fn run_stats_command(
    service: &LedgerService,
    caller: &Caller,
    cmd: StatsCommands,
) -> Result<()> {
    match cmd {
        StatsCommands::Summary { customer, format } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let summary = service.spend_summary(caller, customer.id).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                "csv" => {
                    let mut writer = csv::Writer::from_writer(stdout());
                    writer.serialize(&summary)?;
                    writer.flush()?;
                }
                _ => {
                    println!("Spend summary for {} as of {}", customer.username, summary.as_of);
                    println!();
                    println!("Balance:       {:>15}", format_cents(summary.balance_cents));
                    println!("Today:         {:>15}", format_cents(summary.today_cents));
                    println!("This week:     {:>15}", format_cents(summary.this_week_cents));
                    println!("Last 7 days:   {:>15}", format_cents(summary.last_7_days_cents));
                }
            }
        }

        StatsCommands::Details {
            customer,
            from,
            to,
            platform,
            ad,
            format,
        } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let filter = DetailFilter {
                from: from.as_deref().map(parse_date).transpose()?,
                to: to.as_deref().map(parse_date).transpose()?,
                platform,
                ad_id: ad.as_deref().map(|id| parse_id(id, "ad")).transpose()?,
            };
            let series = service.detail_series(caller, customer.id, filter).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&series)?),
                "csv" => {
                    let mut writer = csv::Writer::from_writer(stdout());
                    for day in &series {
                        writer.serialize(day)?;
                    }
                    writer.flush()?;
                }
                _ => {
                    if series.is_empty() {
                        println!("No spend in this period.");
                    } else {
                        println!("{:<12} {:>12}", "DATE", "SPEND");
                        println!("{}", "-".repeat(25));
                        let mut total = 0;
                        for day in &series {
                            total += day.amount_cents;
                            println!("{:<12} {:>12}", day.date, format_cents(day.amount_cents));
                        }
                        println!("{}", "-".repeat(25));
                        println!("{:<12} {:>12}", "TOTAL", format_cents(total));
                    }
                }
            }
        }

        StatsCommands::Ads { customer, format } => {
            let customer = service.get_customer_by_username(caller, &customer).await?;
            let overview = service.ad_spend_overview(caller, customer.id).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&overview)?),
                "csv" => {
                    let mut writer = csv::Writer::from_writer(stdout());
                    writer.write_record(["ad_id", "name", "status", "total_cents", "today_cents"])?;
                    for entry in &overview {
                        writer.write_record([
                            entry.ad.id.to_string(),
                            entry.ad.name.clone(),
                            entry.ad.status.to_string(),
                            entry.total_spend_cents.to_string(),
                            entry.today_spend_cents.to_string(),
                        ])?;
                    }
                    writer.flush()?;
                }
                _ => {
                    if overview.is_empty() {
                        println!("No ads found.");
                    } else {
                        println!("{:<24} {:<8} {:>12} {:>12}", "AD", "STATUS", "TOTAL", "TODAY");
                        println!("{}", "-".repeat(59));
                        for entry in &overview {
                            println!(
                                "{:<24} {:<8} {:>12} {:>12}",
                                truncate(&entry.ad.name, 24),
                                entry.ad.status,
                                format_cents(entry.total_spend_cents),
                                format_cents(entry.today_spend_cents)
                            );
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, caller: &Caller, format: &str) -> Result<()> {
    let report = service.reconcile(caller).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Reconciling customer balances...\n");
        println!("Customers: {}", report.customer_count);
        println!();
        println!(
            "{:<20} {:>12} {:>12} {:>12}",
            "CUSTOMER", "BALANCE", "EXPECTED", "DIFF"
        );
        println!("{}", "-".repeat(59));
        for entry in &report.customers {
            println!(
                "{:<20} {:>12} {:>12} {:>12}",
                truncate(&entry.username, 20),
                format_cents(entry.balance_cents),
                format_cents(entry.expected_cents),
                format_cents(entry.discrepancy_cents)
            );
        }
        println!();
    }

    if report.is_healthy() {
        if format != "json" {
            println!("Ledger is consistent.");
        }
    } else {
        if format != "json" {
            println!("Issues found:");
            for issue in &report.issues {
                println!("  - {}", issue);
            }
        }
        anyhow::bail!("Ledger reconciliation found {} issue(s)", report.issues.len());
    }

    Ok(())
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).with_context(|| format!("Invalid {} ID '{}' (expected UUID)", what, id))
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    let trimmed = date_str.trim();
    // `%Y` alone accepts signed and five-digit years
    if trimmed.len() != 10 || !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        anyhow::bail!("Invalid date '{}'. Use YYYY-MM-DD", date_str);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("广告投放广告投放", 6), "广告投...");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-05-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(parse_date("05/01/2024").is_err());
    }

    #[test]
    fn test_parse_date_requires_four_digit_year() {
        assert!(parse_date("+2024-05-01").is_err());
        assert!(parse_date("12024-05-01").is_err());
        assert!(parse_date("-001-05-01").is_err());
        assert!(parse_date("0999-05-01").is_ok());
    }

    #[test]
    fn test_cli_parses_spend_record() {
        let cli = Cli::try_parse_from([
            "adledger",
            "--as",
            "ops",
            "--utc-offset",
            "-5",
            "spend",
            "record",
            "acme",
            "6f1c7f4e-3b7e-4a53-8d5e-0c5a3d8b7a11",
            "30.00",
            "--platform",
            "tiktok",
        ])
        .unwrap();

        assert_eq!(cli.user, "ops");
        assert_eq!(cli.utc_offset, -5);
        assert!(matches!(
            cli.command,
            Commands::Spend(SpendCommands::Record { ref platform, .. }) if platform == "tiktok"
        ));
    }

    #[test]
    fn test_cli_parses_customer_update() {
        let cli = Cli::try_parse_from([
            "adledger",
            "customer",
            "update",
            "acme",
            "--phone",
            "13812345678",
            "--website",
            "",
        ])
        .unwrap();

        match cli.command {
            Commands::Customer(CustomerCommands::Update {
                phone,
                website,
                company,
                ..
            }) => {
                assert_eq!(phone.as_deref(), Some("13812345678"));
                assert_eq!(website.as_deref(), Some(""));
                assert_eq!(company, None);
            }
            _ => panic!("expected customer update"),
        }
    }
}
