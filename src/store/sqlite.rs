use std::path::Path;
use std::str::FromStr;

use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::debug;

use super::{RowRange, RowStore, FIRST_DATA_ROW};
use crate::error::{ReconError, Result};
use crate::model::StoreRow;

/// Local stand-in for the spreadsheet: one table, rows keyed by worksheet and
/// sheet row number so range updates and insertions behave the same way.
pub struct SqliteStore {
    conn: Connection,
    worksheet: i64,
}

impl SqliteStore {
    pub fn open(path: &Path, worksheet: usize) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| ReconError::Store(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, worksheet)
    }

    pub fn in_memory(worksheet: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, worksheet)
    }

    fn with_connection(conn: Connection, worksheet: usize) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn,
            worksheet: worksheet as i64,
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sheet_rows (
            worksheet      INTEGER NOT NULL,
            row_num        INTEGER NOT NULL,
            first_seen     TEXT NOT NULL,
            last_seen      TEXT NOT NULL,
            name           TEXT NOT NULL,
            original_price TEXT NOT NULL,
            sale_price     TEXT NOT NULL,
            PRIMARY KEY (worksheet, row_num)
        );
        ",
    )?;
    Ok(())
}

fn write_rows(
    tx: &rusqlite::Transaction,
    worksheet: i64,
    start: usize,
    rows: &[StoreRow],
) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO sheet_rows
         (worksheet, row_num, first_seen, last_seen, name, original_price, sale_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (i, r) in rows.iter().enumerate() {
        stmt.execute(rusqlite::params![
            worksheet,
            (start + i) as i64,
            r.first_seen,
            r.last_seen,
            r.name,
            r.original_price.to_string(),
            r.sale_price.to_string(),
        ])?;
    }
    Ok(())
}

fn decimal_column(text: String, row_num: i64) -> Result<Decimal> {
    Decimal::from_str(&text)
        .map_err(|_| ReconError::Store(format!("row {}: bad price {:?}", row_num, text)))
}

impl RowStore for SqliteStore {
    async fn read_rows(&self) -> Result<Vec<StoreRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT row_num, first_seen, last_seen, name, original_price, sale_price
             FROM sheet_rows
             WHERE worksheet = ?1 AND row_num >= ?2
             ORDER BY row_num",
        )?;
        let raw = stmt
            .query_map(rusqlite::params![self.worksheet, FIRST_DATA_ROW as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(row_num, first_seen, last_seen, name, original, sale)| {
                Ok(StoreRow {
                    first_seen,
                    last_seen,
                    name,
                    original_price: decimal_column(original, row_num)?,
                    sale_price: decimal_column(sale, row_num)?,
                })
            })
            .collect()
    }

    async fn update_rows(&self, range: RowRange, rows: &[StoreRow]) -> Result<()> {
        if rows.len() != range.len() {
            return Err(ReconError::Store(format!(
                "range {} holds {} rows, got {}",
                range.a1(),
                range.len(),
                rows.len()
            )));
        }
        let tx = self.conn.unchecked_transaction()?;
        write_rows(&tx, self.worksheet, range.start, rows)?;
        tx.commit()?;
        debug!("sqlite: updated {}", range.a1());
        Ok(())
    }

    async fn insert_rows(&self, at: usize, rows: &[StoreRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let shift = rows.len() as i64;
        let tx = self.conn.unchecked_transaction()?;
        // Shift through negative numbers so the primary key never collides mid-update.
        tx.execute(
            "UPDATE sheet_rows SET row_num = -(row_num + ?3) WHERE worksheet = ?1 AND row_num >= ?2",
            rusqlite::params![self.worksheet, at as i64, shift],
        )?;
        tx.execute(
            "UPDATE sheet_rows SET row_num = -row_num WHERE worksheet = ?1 AND row_num < 0",
            rusqlite::params![self.worksheet],
        )?;
        write_rows(&tx, self.worksheet, at, rows)?;
        tx.commit()?;
        debug!("sqlite: inserted {} rows at row {}", rows.len(), at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, last_seen: &str) -> StoreRow {
        StoreRow {
            first_seen: "2024-01-01 10:00:00".into(),
            last_seen: last_seen.into(),
            name: name.into(),
            original_price: Decimal::from_str("129.99").unwrap(),
            sale_price: Decimal::from_str("99.99").unwrap(),
        }
    }

    fn names(rows: &[StoreRow]) -> Vec<String> {
        rows.iter().map(|r| r.name.clone()).collect()
    }

    #[tokio::test]
    async fn insert_pushes_rows_down() {
        let store = SqliteStore::in_memory(0).unwrap();
        store
            .insert_rows(FIRST_DATA_ROW, &[row("B", "t1"), row("C", "t1")])
            .await
            .unwrap();
        store.insert_rows(FIRST_DATA_ROW, &[row("A", "t2")]).await.unwrap();

        let rows = store.read_rows().await.unwrap();
        assert_eq!(names(&rows), ["A", "B", "C"]);
        assert_eq!(rows[0].sale_price, Decimal::from_str("99.99").unwrap());
    }

    #[tokio::test]
    async fn update_overwrites_range_only() {
        let store = SqliteStore::in_memory(0).unwrap();
        store
            .insert_rows(FIRST_DATA_ROW, &[row("A", "t1"), row("B", "t1"), row("C", "t0")])
            .await
            .unwrap();
        store
            .update_rows(RowRange::starting_at(3, 1), &[row("B", "t2")])
            .await
            .unwrap();

        let rows = store.read_rows().await.unwrap();
        assert_eq!(names(&rows), ["A", "B", "C"]);
        assert_eq!(rows[1].last_seen, "t2");
        assert_eq!(rows[2].last_seen, "t0");
    }

    #[tokio::test]
    async fn update_rejects_length_mismatch() {
        let store = SqliteStore::in_memory(0).unwrap();
        let err = store
            .update_rows(RowRange::starting_at(2, 2), &[row("A", "t1")])
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::Store(_)));
    }

    #[tokio::test]
    async fn worksheets_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("recon.sqlite");

        let primary = SqliteStore::open(&path, 0).unwrap();
        primary.insert_rows(FIRST_DATA_ROW, &[row("A", "t1")]).await.unwrap();

        let devel = SqliteStore::open(&path, 1).unwrap();
        assert!(devel.read_rows().await.unwrap().is_empty());
        assert_eq!(primary.read_rows().await.unwrap().len(), 1);
    }
}
