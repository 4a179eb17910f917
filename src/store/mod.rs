pub mod sheets;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::StoreRow;

/// Sheet row holding the column headers.
pub const HEADER_ROW: usize = 1;
/// First data row; new batches are inserted here.
pub const FIRST_DATA_ROW: usize = HEADER_ROW + 1;

/// Inclusive, 1-based span of sheet rows covering columns A..E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    /// `len` rows starting at `start`. `len` must be non-zero.
    pub fn starting_at(start: usize, len: usize) -> Self {
        Self {
            start,
            end: start + len - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    /// A1 notation, e.g. `A2:E4`.
    pub fn a1(&self) -> String {
        format!("A{}:E{}", self.start, self.end)
    }
}

/// Row-oriented table with a header row, addressed like a spreadsheet.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    /// All data rows below the header, top to bottom.
    async fn read_rows(&self) -> Result<Vec<StoreRow>>;

    /// Overwrite the rows in `range` with `rows` (same length).
    async fn update_rows(&self, range: RowRange, rows: &[StoreRow]) -> Result<()>;

    /// Insert `rows` so the first one lands on sheet row `at`, pushing existing rows down.
    async fn insert_rows(&self, at: usize, rows: &[StoreRow]) -> Result<()>;
}
