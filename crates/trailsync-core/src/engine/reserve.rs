//! Quota reservation for a batch of new records

use std::collections::BTreeMap;

use crate::db::QuotaLedger;
use crate::error::{Error, Result};
use crate::models::QuotaKind;

use super::store::ResourceStore;

/// Outcome of reserving quota for a batch, in submission order.
pub struct Reservation<R> {
    pub admitted: Vec<R>,
    pub rejected: Vec<(R, QuotaKind)>,
}

fn cost_of<S: ResourceStore>(store: &S, record: &S::Record, kind: QuotaKind) -> i64 {
    store
        .quota_costs(record)
        .iter()
        .filter(|cost| cost.kind == kind)
        .map(|cost| cost.amount)
        .sum()
}

/// Total quota `records` consume, per kind.
pub fn total_costs<'r, S: ResourceStore>(
    store: &S,
    records: impl IntoIterator<Item = &'r S::Record>,
) -> BTreeMap<QuotaKind, i64> {
    let mut totals = BTreeMap::new();
    for record in records {
        for cost in store.quota_costs(record) {
            *totals.entry(cost.kind).or_insert(0) += cost.amount;
        }
    }
    totals
}

/// Give quota back, logging rather than failing: reconciliation repairs any drift.
pub async fn release(ledger: &QuotaLedger<'_>, owner: &str, amounts: &BTreeMap<QuotaKind, i64>) {
    for (kind, amount) in amounts {
        if let Err(error) = ledger.decrement(owner, *kind, *amount).await {
            tracing::warn!(kind = %kind, amount, error = %error, "Failed to release quota");
        }
    }
}

/// Reserve quota for `candidates`, trimming the batch to what the ledger grants.
///
/// Kinds are reserved in ascending order. For each kind the whole batch is
/// requested first. When that fails, count kinds fall back to one reservation
/// per record in order until one fails, and size kinds keep the longest
/// prefix covered by the partial grant. Records past the cut are rejected
/// with that kind, and quota reserved for them is released before returning.
pub async fn reserve<S: ResourceStore>(
    ledger: &QuotaLedger<'_>,
    owner: &str,
    store: &S,
    candidates: Vec<S::Record>,
) -> Result<Reservation<S::Record>> {
    let mut admitted = candidates;
    let mut rejected = Vec::new();
    let mut reserved: BTreeMap<QuotaKind, i64> = BTreeMap::new();

    let kinds: Vec<QuotaKind> = total_costs(store, &admitted).into_keys().collect();
    for kind in kinds {
        let costs: Vec<i64> = admitted
            .iter()
            .map(|record| cost_of(store, record, kind))
            .collect();
        let total: i64 = costs.iter().sum();
        if total == 0 {
            continue;
        }

        let keep = match reserve_kind(ledger, owner, kind, total, &costs).await {
            Ok((granted, keep)) => {
                *reserved.entry(kind).or_insert(0) += granted;
                keep
            }
            Err(error) => {
                release(ledger, owner, &reserved).await;
                return Err(error);
            }
        };

        if keep < admitted.len() {
            tracing::debug!(kind = %kind, kept = keep, trimmed = admitted.len() - keep, "Quota trimmed batch");
            rejected.extend(admitted.split_off(keep).into_iter().map(|record| (record, kind)));
        }
    }

    let needed = total_costs(store, &admitted);
    let excess: BTreeMap<QuotaKind, i64> = reserved
        .into_iter()
        .map(|(kind, amount)| (kind, amount - needed.get(&kind).copied().unwrap_or(0)))
        .filter(|(_, amount)| *amount > 0)
        .collect();
    release(ledger, owner, &excess).await;

    Ok(Reservation { admitted, rejected })
}

/// Returns `(granted, records kept)` for one kind.
async fn reserve_kind(
    ledger: &QuotaLedger<'_>,
    owner: &str,
    kind: QuotaKind,
    total: i64,
    costs: &[i64],
) -> Result<(i64, usize)> {
    match ledger.increment(owner, kind, total).await {
        Ok(granted) if granted == total => Ok((granted, costs.len())),
        Ok(granted) => Ok((granted, prefix_within(costs, granted))),
        Err(Error::QuotaExceeded(_)) if kind.allows_less() => Ok((0, 0)),
        Err(Error::QuotaExceeded(_)) => {
            let mut granted = 0;
            let mut keep = 0;
            for cost in costs {
                match ledger.increment(owner, kind, *cost).await {
                    Ok(amount) => {
                        granted += amount;
                        keep += 1;
                    }
                    Err(Error::QuotaExceeded(_)) => break,
                    Err(error) => {
                        release(ledger, owner, &BTreeMap::from([(kind, granted)])).await;
                        return Err(error);
                    }
                }
            }
            Ok((granted, keep))
        }
        Err(error) => Err(error),
    }
}

/// Length of the longest prefix of `costs` whose sum fits in `budget`.
fn prefix_within(costs: &[i64], budget: i64) -> usize {
    let mut spent = 0;
    costs
        .iter()
        .take_while(|cost| {
            spent += **cost;
            spent <= budget
        })
        .count()
}
