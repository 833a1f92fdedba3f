use tracing::{info, warn};

use crate::domain::{build_reconciliation_report, Caller, ReconciliationReport};

use super::service::require_admin;
use super::{AppError, LedgerService};

impl LedgerService {
    /// Compare every customer's balance with the balance implied by its
    /// transactions and live spend logs. Read-only: drift is reported, never
    /// repaired.
    pub async fn reconcile(&self, caller: &Caller) -> Result<ReconciliationReport, AppError> {
        require_admin(caller, "reconcile")?;

        let totals = self.repo.ledger_totals().await?;
        let report = build_reconciliation_report(totals);

        if report.is_healthy() {
            info!(customers = report.customer_count, "Ledger reconciled");
        } else {
            for mismatch in report.mismatches() {
                warn!(
                    customer_id = %mismatch.customer_id,
                    balance_cents = mismatch.balance_cents,
                    expected_cents = mismatch.expected_cents,
                    discrepancy_cents = mismatch.discrepancy_cents,
                    out_of_range = mismatch.out_of_range,
                    "Balance does not match ledger history"
                );
            }
        }

        Ok(report)
    }
}
