use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::diff::Diff;
use crate::error::Result;
use crate::journal::Journal;
use crate::model::StoreRow;
use crate::store::{RowRange, RowStore, FIRST_DATA_ROW};

/// Which diff set a range write carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSet {
    Updated,
    Removed,
}

/// One store call, in the order it will be issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    UpdateRange {
        set: RowSet,
        range: RowRange,
        rows: Vec<StoreRow>,
    },
    InsertRows {
        at: usize,
        rows: Vec<StoreRow>,
    },
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::UpdateRange { set, range, rows } => {
                let label = match set {
                    RowSet::Updated => "Updated",
                    RowSet::Removed => "Removed",
                };
                write!(f, "{} rows range: {} ({} rows)", label, range.a1(), rows.len())
            }
            WriteOp::InsertRows { at, rows } => {
                write!(f, "Insert {} rows at row {}", rows.len(), at)
            }
        }
    }
}

/// Lay the diff out on the sheet.
///
/// The current batch is rewritten in place (updated rows first, removed rows
/// right after), then new rows are inserted on top so they form the next
/// batch together with the updated ones.
pub fn plan(diff: &Diff) -> Vec<WriteOp> {
    let mut ops = Vec::new();

    if !diff.update.is_empty() {
        ops.push(WriteOp::UpdateRange {
            set: RowSet::Updated,
            range: RowRange::starting_at(FIRST_DATA_ROW, diff.update.len()),
            rows: diff.update.clone(),
        });
    }
    if !diff.removed.is_empty() {
        ops.push(WriteOp::UpdateRange {
            set: RowSet::Removed,
            range: RowRange::starting_at(FIRST_DATA_ROW + diff.update.len(), diff.removed.len()),
            rows: diff.removed.clone(),
        });
    }
    if !diff.insert.is_empty() {
        ops.push(WriteOp::InsertRows {
            at: FIRST_DATA_ROW,
            rows: diff.insert.clone(),
        });
    }

    ops
}

/// Issue the planned writes in order, journaling each one first.
///
/// Stops at the first failed store write; earlier writes stay applied and
/// the journal shows which ones. Journal I/O problems only warn, and a fully
/// applied plan clears the journal.
pub async fn apply<S: RowStore>(store: &S, ops: &[WriteOp], journal: &mut Journal) -> Result<()> {
    for op in ops {
        let seq = match journal.begin(op) {
            Ok(seq) => seq,
            Err(e) => {
                warn!("Could not journal write ({}), issuing it anyway: {}", op, e);
                0
            }
        };
        debug!("{}", op);
        let result = match op {
            WriteOp::UpdateRange { range, rows, .. } => store.update_rows(*range, rows).await,
            WriteOp::InsertRows { at, rows } => store.insert_rows(*at, rows).await,
        };
        if let Err(e) = journal.finish(seq, result.as_ref().err()) {
            warn!("Could not record outcome of write #{} ({}): {}", seq, op, e);
        }
        if let Err(e) = result {
            error!("Store write failed ({}): {}", op, e);
            return Err(e);
        }
    }
    if !ops.is_empty() {
        info!("Store updated ({} writes)", ops.len());
        if let Err(e) = journal.clear() {
            warn!("Could not clear write journal: {}", e);
        }
    }
    Ok(())
}
