//! Incremental merge of fresh provider data into a known history
//!
//! The merge is left-biased: operations already in the history keep their
//! `Arc` (so consumers can detect "unchanged" with [`Arc::ptr_eq`]) unless the
//! fresh copy carries different confirmation data. Operations the provider
//! did not return this time stay in the history. The result is sorted
//! newest-first by date with a stable sort, which makes repeated merges of
//! the same batch idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HwLedgerError;
use crate::operation::Operation;

/// Merge `fresh` into `previous`.
///
/// `build` converts one raw record into a canonical operation; `Ok(None)`
/// skips the record, an error aborts the whole merge.
pub fn reconcile_operations<R, F>(
    previous: &[Arc<Operation>],
    fresh: &[R],
    mut build: F,
) -> Result<Vec<Arc<Operation>>, HwLedgerError>
where
    F: FnMut(&R) -> Result<Option<Operation>, HwLedgerError>,
{
    let mut built = Vec::with_capacity(fresh.len());
    for raw in fresh {
        if let Some(op) = build(raw)? {
            built.push(Arc::new(op));
        }
    }
    Ok(merge_operations(previous, &built))
}

/// Merge an already canonical batch into `previous` under the same rules.
///
/// Used when both sides are stored histories, e.g. a scanned account folded
/// into its ledger record.
pub fn merge_operations(
    previous: &[Arc<Operation>],
    fresh: &[Arc<Operation>],
) -> Vec<Arc<Operation>> {
    let mut merged: Vec<Arc<Operation>> = previous.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(pos, op)| (op.id.clone(), pos))
        .collect();

    let mut replaced = 0usize;
    let mut added = 0usize;

    for op in fresh {
        match positions.get(&op.id) {
            Some(&pos) => {
                if merged[pos].block_data_differs(op) {
                    merged[pos] = op.clone();
                    replaced += 1;
                }
            }
            None => {
                positions.insert(op.id.clone(), merged.len());
                merged.push(op.clone());
                added += 1;
            }
        }
    }

    if added > 0 || replaced > 0 {
        log::debug!(
            "Reconciled {} fresh records: {} added, {} updated, {} total",
            fresh.len(),
            added,
            replaced,
            merged.len()
        );
    }

    // stable: equal dates keep their relative order
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}
