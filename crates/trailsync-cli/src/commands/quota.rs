use trailsync_core::models::{QuotaCounter, QuotaKind};
use trailsync_core::services::reconcile_quotas;
use trailsync_core::{Database, QuotaLedger};

use crate::commands::common::normalize_owner_arg;
use crate::error::CliError;

pub async fn run_quota_show(db: &Database, owner: &str, as_json: bool) -> Result<String, CliError> {
    let owner = normalize_owner_arg(owner)?;
    let counters = QuotaLedger::new(db.connection()).list(&owner).await?;
    if counters.is_empty() {
        return Err(CliError::UnknownAccount(owner));
    }

    if as_json {
        Ok(serde_json::to_string_pretty(&counters)?)
    } else {
        Ok(format_quota_lines(&counters).join("\n"))
    }
}

pub async fn run_quota_set_max(
    db: &Database,
    owner: &str,
    kind: QuotaKind,
    max: i64,
) -> Result<String, CliError> {
    let owner = normalize_owner_arg(owner)?;
    let ledger = QuotaLedger::new(db.connection());
    ledger.set_max(&owner, kind, max).await?;
    tracing::info!(kind = %kind, max, "Quota ceiling changed");
    Ok(format!("{owner}\t{kind}\tmax={max}"))
}

pub async fn run_quota_reconcile(db: &Database) -> Result<String, CliError> {
    let rewritten = reconcile_quotas(db.connection()).await?;
    Ok(format!("Reconciled {rewritten} counters"))
}

/// One aligned `kind used/max` row per counter, flagging exhausted ones.
pub fn format_quota_lines(counters: &[QuotaCounter]) -> Vec<String> {
    let width = counters
        .iter()
        .map(|counter| counter.kind.as_str().len())
        .max()
        .unwrap_or(0);
    counters
        .iter()
        .map(|counter| {
            let marker = if counter.headroom() == 0 { "  (full)" } else { "" };
            format!(
                "{:<width$}  {}/{}{marker}",
                counter.kind.as_str(),
                counter.used,
                counter.max,
            )
        })
        .collect()
}
