use serde::{Deserialize, Serialize};

use super::{Cents, UserId};

/// Ledger totals for one customer, as read from the store.
#[derive(Debug, Clone)]
pub struct LedgerTotals {
    pub customer_id: UserId,
    pub username: String,
    pub balance_cents: Cents,
    pub transactions_total: Cents,
    pub live_spend_total: Cents,
}

/// One customer's stored balance checked against its evidence trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerReconciliation {
    pub customer_id: UserId,
    pub username: String,
    pub balance_cents: Cents,
    pub transactions_total: Cents,
    pub live_spend_total: Cents,
    /// Balance implied by the history: Σ transactions − Σ live spend
    pub expected_cents: Cents,
    /// `balance_cents - expected_cents`; zero when consistent
    pub discrepancy_cents: Cents,
    /// The totals do not fit in cents; the figures above are saturated
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_range: bool,
}

impl CustomerReconciliation {
    pub fn is_consistent(&self) -> bool {
        !self.out_of_range && self.discrepancy_cents == 0
    }
}

impl From<LedgerTotals> for CustomerReconciliation {
    fn from(totals: LedgerTotals) -> Self {
        // Customers open at zero, so history alone determines the balance.
        let expected = totals
            .transactions_total
            .checked_sub(totals.live_spend_total);
        let discrepancy = expected.and_then(|expected| totals.balance_cents.checked_sub(expected));
        let expected_cents = totals
            .transactions_total
            .saturating_sub(totals.live_spend_total);
        Self {
            customer_id: totals.customer_id,
            username: totals.username,
            balance_cents: totals.balance_cents,
            transactions_total: totals.transactions_total,
            live_spend_total: totals.live_spend_total,
            expected_cents,
            discrepancy_cents: discrepancy
                .unwrap_or_else(|| totals.balance_cents.saturating_sub(expected_cents)),
            out_of_range: discrepancy.is_none(),
        }
    }
}

/// Read-only audit of every customer's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub customer_count: usize,
    pub customers: Vec<CustomerReconciliation>,
    pub issues: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &CustomerReconciliation> {
        self.customers.iter().filter(|c| !c.is_consistent())
    }
}

/// Build the report from per-customer totals.
pub fn build_reconciliation_report(totals: Vec<LedgerTotals>) -> ReconciliationReport {
    let customers: Vec<CustomerReconciliation> =
        totals.into_iter().map(CustomerReconciliation::from).collect();

    let issues = customers
        .iter()
        .filter(|c| !c.is_consistent())
        .map(|c| {
            if c.out_of_range {
                return format!(
                    "Customer '{}' balance {} cannot be checked: history totals exceed the cents range",
                    c.username,
                    super::format_cents(c.balance_cents)
                );
            }
            format!(
                "Customer '{}' balance {} differs from history {} by {}",
                c.username,
                super::format_cents(c.balance_cents),
                super::format_cents(c.expected_cents),
                super::format_cents(c.discrepancy_cents)
            )
        })
        .collect();

    ReconciliationReport {
        customer_count: customers.len(),
        customers,
        issues,
    }
}
