//! The seam between the generic bulk engine and one resource kind

use std::future::Future;

use libsql::Connection;

use crate::db::record::{self, TableRecord};
use crate::db::QuotaLedger;
use crate::error::Result;
use crate::models::{Draft, QuotaCost, Submission};

/// Kind-specific behavior plugged into [`super::BulkEngine`].
///
/// Methods receive the connection explicitly so helpers never call back into
/// the engine. Futures are `Send` so request handlers can run them on any
/// worker thread.
pub trait ResourceStore: Send + Sync {
    type Record: TableRecord;
    type Dto: Submission<Draft = Self::Draft>;
    type Draft: Draft;

    /// Build a version-1 record, checking the records it references.
    fn prepare_create(
        &self,
        conn: &Connection,
        owner: &str,
        draft: Self::Draft,
        now: i64,
    ) -> impl Future<Output = Result<Self::Record>> + Send;

    /// Apply a draft on top of the stored record, checking any references it moves to.
    fn prepare_update(
        &self,
        conn: &Connection,
        stored: &Self::Record,
        draft: Self::Draft,
    ) -> impl Future<Output = Result<Self::Record>> + Send;

    /// Side effects of an update that has been committed.
    fn after_update(
        &self,
        _conn: &Connection,
        _before: &Self::Record,
        _after: &Self::Record,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Quota consumed by `record`.
    fn quota_costs(&self, _record: &Self::Record) -> Vec<QuotaCost> {
        Vec::new()
    }

    /// Whether clients may delete `record`.
    fn deletable(&self, _record: &Self::Record) -> bool {
        true
    }

    /// Remove rows that depend on `records`, releasing their quota.
    fn cascade_delete(
        &self,
        _conn: &Connection,
        _ledger: &QuotaLedger<'_>,
        _owner: &str,
        _records: &[Self::Record],
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Records `owner` can currently see. May repeat a record.
    fn visible(
        &self,
        conn: &Connection,
        owner: &str,
    ) -> impl Future<Output = Result<Vec<Self::Record>>> + Send {
        record::find_by_owner::<Self::Record>(conn, owner)
    }
}
