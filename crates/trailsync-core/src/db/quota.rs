//! Per-owner quota ledger
//!
//! Every gate is a single conditional statement on the `quotas` row, so
//! concurrent requests for the same owner never need a lock: the database
//! serializes the updates and the `WHERE used + ? <= max` guard keeps the
//! ceiling.

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{QuotaCounter, QuotaKind, QuotaPlan};

/// How often a partial grant is retried when headroom shrinks underneath it.
const PARTIAL_GRANT_ATTEMPTS: usize = 3;

/// Ground-truth usage per kind, evaluated for the owner of the quotas row.
const fn usage_query(kind: QuotaKind) -> &'static str {
    match kind {
        QuotaKind::Collections => "SELECT COUNT(*) FROM collections t WHERE t.owner = quotas.owner",
        QuotaKind::Trails => "SELECT COUNT(*) FROM trails t WHERE t.owner = quotas.owner",
        QuotaKind::Tracks => "SELECT COUNT(*) FROM tracks t WHERE t.owner = quotas.owner",
        QuotaKind::Tags => "SELECT COUNT(*) FROM tags t WHERE t.owner = quotas.owner",
        QuotaKind::Shares => "SELECT COUNT(*) FROM shares t WHERE t.owner = quotas.owner",
        QuotaKind::TrackBytes => {
            "SELECT COALESCE(SUM(length(t.data)), 0) FROM tracks t WHERE t.owner = quotas.owner"
        }
        QuotaKind::PhotoBytes => {
            "SELECT COALESCE(SUM(t.size), 0) FROM photos t WHERE t.owner = quotas.owner"
        }
    }
}

pub struct QuotaLedger<'a> {
    conn: &'a Connection,
}

impl<'a> QuotaLedger<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create missing counters for `owner` from `plan`. Existing rows are kept.
    pub async fn provision(&self, owner: &str, plan: &QuotaPlan) -> Result<()> {
        for kind in QuotaKind::ALL {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO quotas (owner, kind, used, max) VALUES (?1, ?2, 0, ?3)",
                    params![owner, kind.as_str(), plan.max_for(kind)],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, owner: &str, kind: QuotaKind) -> Result<Option<QuotaCounter>> {
        let mut rows = self
            .conn
            .query(
                "SELECT used, max FROM quotas WHERE owner = ?1 AND kind = ?2",
                params![owner, kind.as_str()],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(QuotaCounter {
            owner: owner.to_string(),
            kind,
            used: row.get::<i64>(0)?,
            max: row.get::<i64>(1)?,
        }))
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<QuotaCounter>> {
        let mut counters = Vec::new();
        for kind in QuotaKind::ALL {
            if let Some(counter) = self.get(owner, kind).await? {
                counters.push(counter);
            }
        }
        Ok(counters)
    }

    /// Consume `amount` of `kind`, returning how much was granted.
    ///
    /// Count kinds grant all or fail. Size kinds may grant the remaining
    /// headroom when it is positive but below the request. An owner without
    /// a counter row has no allowance.
    pub async fn increment(&self, owner: &str, kind: QuotaKind, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Ok(0);
        }
        if self.try_add(owner, kind, amount).await? {
            return Ok(amount);
        }
        if !kind.allows_less() {
            return Err(Error::QuotaExceeded(kind));
        }
        self.partial_grant(owner, kind, amount).await
    }

    /// Grant exactly the remaining headroom when it is strictly between zero
    /// and `amount`. Headroom at or above `amount` fails: the full request
    /// already lost its attempt.
    async fn partial_grant(&self, owner: &str, kind: QuotaKind, amount: i64) -> Result<i64> {
        for _ in 0..PARTIAL_GRANT_ATTEMPTS {
            let headroom = self
                .get(owner, kind)
                .await?
                .map_or(0, |counter| counter.headroom());
            if headroom <= 0 || headroom >= amount {
                break;
            }
            if self.try_add(owner, kind, headroom).await? {
                tracing::debug!(kind = %kind, requested = amount, granted = headroom, "Partial quota grant");
                return Ok(headroom);
            }
        }
        Err(Error::QuotaExceeded(kind))
    }

    /// Release `amount` of `kind`. Usage never drops below zero.
    pub async fn decrement(&self, owner: &str, kind: QuotaKind, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Ok(());
        }
        self.conn
            .execute(
                "UPDATE quotas SET used = MAX(0, used - ?1) WHERE owner = ?2 AND kind = ?3",
                params![amount, owner, kind.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Signed adjustment: growth is gated like a count increment, shrinkage clamps at zero.
    pub async fn update(&self, owner: &str, kind: QuotaKind, delta: i64) -> Result<()> {
        match delta.signum() {
            1 => {
                if self.try_add(owner, kind, delta).await? {
                    Ok(())
                } else {
                    Err(Error::QuotaExceeded(kind))
                }
            }
            -1 => self.decrement(owner, kind, -delta).await,
            _ => Ok(()),
        }
    }

    /// Set the limit for one kind, creating the counter when missing.
    pub async fn set_max(&self, owner: &str, kind: QuotaKind, max: i64) -> Result<()> {
        if max < 0 {
            return Err(Error::Invalid("max"));
        }
        self.conn
            .execute(
                "INSERT INTO quotas (owner, kind, used, max) VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT (owner, kind) DO UPDATE SET max = excluded.max",
                params![owner, kind.as_str(), max],
            )
            .await?;
        Ok(())
    }

    /// Overwrite every counter's `used` with what the resource tables hold.
    ///
    /// Corrects drift left by interrupted requests. Returns the number of
    /// counter rows rewritten.
    pub async fn reconcile_all(&self) -> Result<u64> {
        let mut rewritten = 0;
        for kind in QuotaKind::ALL {
            let sql = format!(
                "UPDATE quotas SET used = ({}) WHERE kind = ?1",
                usage_query(kind)
            );
            rewritten += self.conn.execute(&sql, params![kind.as_str()]).await?;
        }
        tracing::info!(counters = rewritten, "Reconciled quota usage");
        Ok(rewritten)
    }

    async fn try_add(&self, owner: &str, kind: QuotaKind, amount: i64) -> Result<bool> {
        let applied = self
            .conn
            .execute(
                "UPDATE quotas SET used = used + ?1
                 WHERE owner = ?2 AND kind = ?3 AND used + ?1 <= max",
                params![amount, owner, kind.as_str()],
            )
            .await?;
        Ok(applied == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const OWNER: &str = "ann@example.com";

    async fn ledger_with(db: &Database, kind: QuotaKind, used: i64, max: i64) -> QuotaLedger<'_> {
        let ledger = QuotaLedger::new(db.connection());
        ledger.set_max(OWNER, kind, max).await.unwrap();
        if used > 0 {
            ledger.increment(OWNER, kind, used).await.unwrap();
        }
        ledger
    }

    async fn used(ledger: &QuotaLedger<'_>, kind: QuotaKind) -> i64 {
        ledger.get(OWNER, kind).await.unwrap().unwrap().used
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn count_kind_is_all_or_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::Trails, 4, 5).await;

        let result = ledger.increment(OWNER, QuotaKind::Trails, 3).await;
        assert!(matches!(result, Err(Error::QuotaExceeded(QuotaKind::Trails))));
        assert_eq!(used(&ledger, QuotaKind::Trails).await, 4);

        assert_eq!(ledger.increment(OWNER, QuotaKind::Trails, 1).await.unwrap(), 1);
        assert_eq!(used(&ledger, QuotaKind::Trails).await, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn size_kind_grants_remaining_headroom() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::TrackBytes, 900, 1000).await;

        let granted = ledger
            .increment(OWNER, QuotaKind::TrackBytes, 250)
            .await
            .unwrap();
        assert_eq!(granted, 100);
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 1000);

        let exhausted = ledger.increment(OWNER, QuotaKind::TrackBytes, 1).await;
        assert!(matches!(
            exhausted,
            Err(Error::QuotaExceeded(QuotaKind::TrackBytes))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partial_grant_only_below_the_request() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::TrackBytes, 40, 100).await;

        // Space freed after the full request failed is not granted here.
        let result = ledger.partial_grant(OWNER, QuotaKind::TrackBytes, 50).await;
        assert!(matches!(
            result,
            Err(Error::QuotaExceeded(QuotaKind::TrackBytes))
        ));
        let result = ledger.partial_grant(OWNER, QuotaKind::TrackBytes, 60).await;
        assert!(matches!(
            result,
            Err(Error::QuotaExceeded(QuotaKind::TrackBytes))
        ));
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 40);

        let granted = ledger
            .partial_grant(OWNER, QuotaKind::TrackBytes, 80)
            .await
            .unwrap();
        assert_eq!(granted, 60);
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 100);

        let result = ledger.partial_grant(OWNER, QuotaKind::TrackBytes, 10).await;
        assert!(matches!(
            result,
            Err(Error::QuotaExceeded(QuotaKind::TrackBytes))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_counter_has_no_allowance() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = QuotaLedger::new(db.connection());
        let result = ledger.increment(OWNER, QuotaKind::PhotoBytes, 10).await;
        assert!(matches!(
            result,
            Err(Error::QuotaExceeded(QuotaKind::PhotoBytes))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decrement_floors_at_zero() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::Tags, 2, 10).await;

        ledger.decrement(OWNER, QuotaKind::Tags, 5).await.unwrap();
        assert_eq!(used(&ledger, QuotaKind::Tags).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn signed_update() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::TrackBytes, 50, 100).await;

        ledger.update(OWNER, QuotaKind::TrackBytes, 30).await.unwrap();
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 80);

        let grow = ledger.update(OWNER, QuotaKind::TrackBytes, 30).await;
        assert!(matches!(grow, Err(Error::QuotaExceeded(_))));
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 80);

        ledger.update(OWNER, QuotaKind::TrackBytes, -200).await.unwrap();
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn provision_keeps_existing_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::Shares, 1, 2).await;

        ledger.provision(OWNER, &QuotaPlan::default()).await.unwrap();

        let counters = ledger.list(OWNER).await.unwrap();
        assert_eq!(counters.len(), QuotaKind::ALL.len());
        let shares = ledger.get(OWNER, QuotaKind::Shares).await.unwrap().unwrap();
        assert_eq!((shares.used, shares.max), (1, 2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_respect_ceiling() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = ledger_with(&db, QuotaKind::Tags, 0, 5).await;

        let attempts = (0..20).map(|_| ledger.increment(OWNER, QuotaKind::Tags, 1));
        let results = futures::future::join_all(attempts).await;

        let granted = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(granted, 5);
        assert_eq!(used(&ledger, QuotaKind::Tags).await, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_overwrites_drift() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let ledger = ledger_with(&db, QuotaKind::Tracks, 7, 10).await;
        ledger.set_max(OWNER, QuotaKind::TrackBytes, 1000).await.unwrap();

        conn.execute(
            "INSERT INTO tracks (id, owner, version, created_at, updated_at, data)
             VALUES ('t1', ?1, 1, 0, 0, x'01020304')",
            params![OWNER],
        )
        .await
        .unwrap();

        let rewritten = ledger.reconcile_all().await.unwrap();
        assert_eq!(rewritten, 2);
        assert_eq!(used(&ledger, QuotaKind::Tracks).await, 1);
        assert_eq!(used(&ledger, QuotaKind::TrackBytes).await, 4);
    }
}
