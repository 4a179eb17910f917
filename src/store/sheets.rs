use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use reqwest::{Method, Url};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{RowRange, RowStore, FIRST_DATA_ROW};
use crate::error::{ReconError, Result};
use crate::model::{format_timestamp, StoreRow, ROW_WIDTH};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Google Sheets v4 backend authenticated with a static bearer token.
pub struct SheetsStore {
    client: reqwest::Client,
    spreadsheet_id: String,
    token: String,
    sheet: SheetProperties,
}

impl SheetsStore {
    /// Resolve the worksheet at `index` (0 = first tab) of the spreadsheet.
    pub async fn open(spreadsheet_id: &str, token: &str, index: usize) -> Result<Self> {
        let mut store = Self {
            client: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
            sheet: SheetProperties {
                sheet_id: 0,
                title: String::new(),
            },
        };

        let url = store.url("", None, &[("fields", "sheets.properties(sheetId,title)")])?;
        let meta: Spreadsheet = store.call(Method::GET, url, None).await?;
        store.sheet = meta
            .sheets
            .into_iter()
            .nth(index)
            .map(|s| s.properties)
            .ok_or_else(|| {
                ReconError::Store(format!("spreadsheet has no worksheet at index {}", index))
            })?;

        info!("Using worksheet '{}' (#{})", store.sheet.title, index);
        Ok(store)
    }

    fn a1(&self, range: &str) -> String {
        format!("'{}'!{}", self.sheet.title.replace('\'', "''"), range)
    }

    /// `{API}/{id}{suffix}` plus an optional trailing path segment.
    fn url(&self, suffix: &str, tail: Option<&[&str]>, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| ReconError::Store(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ReconError::Store("sheets API url cannot be a base".into()))?;
            path.push(&format!("{}{}", self.spreadsheet_id, suffix));
            if let Some(segments) = tail {
                path.extend(segments);
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T> {
        debug!("sheets: {} {}", method, url);
        let mut req = self.client.request(method, url).bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ReconError::Store(format!("sheets request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReconError::Store(format!("sheets API {}: {}", status, text.trim())));
        }
        response
            .json()
            .await
            .map_err(|e| ReconError::Store(format!("sheets response: {}", e)))
    }

    async fn put_values(&self, range: RowRange, rows: &[StoreRow]) -> Result<()> {
        let a1 = self.a1(&range.a1());
        let url = self.url("", Some(&["values", a1.as_str()]), &[("valueInputOption", "RAW")])?;
        let body = json!({
            "range": a1,
            "majorDimension": "ROWS",
            "values": rows.iter().map(row_to_cells).collect::<Vec<_>>(),
        });
        let _: Value = self.call(Method::PUT, url, Some(body)).await?;
        Ok(())
    }
}

impl RowStore for SheetsStore {
    async fn read_rows(&self) -> Result<Vec<StoreRow>> {
        let a1 = self.a1(&format!("A{}:E", FIRST_DATA_ROW));
        let url = self.url(
            "",
            Some(&["values", a1.as_str()]),
            &[("valueRenderOption", "UNFORMATTED_VALUE")],
        )?;
        let range: ValueRange = self.call(Method::GET, url, None).await?;

        range
            .values
            .iter()
            .take_while(|cells| cells.iter().any(|c| !is_blank(c)))
            .enumerate()
            .map(|(i, cells)| row_from_cells(cells, FIRST_DATA_ROW + i))
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
        self.put_values(range, rows).await
    }

    async fn insert_rows(&self, at: usize, rows: &[StoreRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.url(":batchUpdate", None, &[])?;
        let body = insert_dimension(self.sheet.sheet_id, at, rows.len());
        let _: Value = self.call(Method::POST, url, Some(body)).await?;
        self.put_values(RowRange::starting_at(at, rows.len()), rows).await
    }
}

/// batchUpdate body opening `count` blank rows so the first lands on sheet row `at`.
/// The API's row indexes are 0-based and the end is exclusive.
fn insert_dimension(sheet_id: i64, at: usize, count: usize) -> Value {
    json!({
        "requests": [{
            "insertDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": at - 1,
                    "endIndex": at - 1 + count,
                },
                "inheritFromBefore": false,
            }
        }]
    })
}

fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn row_to_cells(row: &StoreRow) -> Vec<Value> {
    vec![
        Value::String(row.first_seen.clone()),
        Value::String(row.last_seen.clone()),
        Value::String(row.name.clone()),
        decimal_cell(row.original_price),
        decimal_cell(row.sale_price),
    ]
}

fn decimal_cell(d: Decimal) -> Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

fn row_from_cells(cells: &[Value], row_num: usize) -> Result<StoreRow> {
    let bad = |what: &str| ReconError::Store(format!("row {}: bad {} in {:?}", row_num, what, cells));
    if cells.len() < ROW_WIDTH {
        return Err(bad("width"));
    }
    Ok(StoreRow {
        first_seen: timestamp_cell(&cells[0]).ok_or_else(|| bad("first_seen"))?,
        last_seen: timestamp_cell(&cells[1]).ok_or_else(|| bad("last_seen"))?,
        name: match &cells[2] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        original_price: price_cell(&cells[3]).ok_or_else(|| bad("original_price"))?,
        sale_price: price_cell(&cells[4]).ok_or_else(|| bad("sale_price"))?,
    })
}

/// Timestamps are written as text, but a sheet edited by hand may hold
/// date serials (days since 1899-12-30).
fn timestamp_cell(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            let seconds = (n.as_f64()? * 86_400.0).round();
            if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
                return None;
            }
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
            let at = epoch.checked_add_signed(Duration::try_seconds(seconds as i64)?)?;
            Some(format_timestamp(at))
        }
        _ => None,
    }
}

fn price_cell(cell: &Value) -> Option<Decimal> {
    match cell {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
