//! Periodic repair of quota usage drift

use std::sync::Arc;
use std::time::Duration;

use libsql::Connection;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{Database, QuotaLedger};
use crate::error::Result;

/// Rewrite every counter's usage from the resource tables.
pub async fn reconcile_quotas(conn: &Connection) -> Result<u64> {
    QuotaLedger::new(conn).reconcile_all().await
}

/// Run [`reconcile_quotas`] every `every`, starting one period from now.
///
/// Failures are logged and the next run proceeds on schedule.
pub fn spawn_quota_reconciliation(db: Arc<Database>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reconcile_quotas(db.connection()).await {
                Ok(counters) => tracing::debug!(counters, "Scheduled quota reconciliation done"),
                Err(error) => tracing::warn!(error = %error, "Scheduled quota reconciliation failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuotaKind, QuotaPlan};
    use crate::services::provision_account;

    async fn drift(db: &Database) {
        QuotaLedger::new(db.connection())
            .update("ann@example.com", QuotaKind::Collections, 5)
            .await
            .unwrap();
    }

    async fn collections_used(db: &Database) -> i64 {
        QuotaLedger::new(db.connection())
            .get("ann@example.com", QuotaKind::Collections)
            .await
            .unwrap()
            .unwrap()
            .used
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_restores_ground_truth() {
        let db = Database::open_in_memory().await.unwrap();
        provision_account(db.connection(), "ann@example.com", &QuotaPlan::default())
            .await
            .unwrap();
        drift(&db).await;
        assert_eq!(collections_used(&db).await, 6);

        let rewritten = reconcile_quotas(db.connection()).await.unwrap();

        assert_eq!(rewritten, QuotaKind::ALL.len() as u64);
        assert_eq!(collections_used(&db).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_job_repairs_drift() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        provision_account(db.connection(), "ann@example.com", &QuotaPlan::default())
            .await
            .unwrap();
        drift(&db).await;

        let job = spawn_quota_reconciliation(Arc::clone(&db), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        job.abort();

        assert_eq!(collections_used(&db).await, 1);
    }
}
