//! Publication to a Google Sheets tab (values + formatting).
//!
//! The tab is a projection of the registry and is rewritten wholesale on
//! every publish, except for the link column, which people maintain by
//! hand in the sheet itself. That column is read back first and merged
//! into the registry by tax id before the tab is cleared.

use std::collections::HashMap;

use iprtrack_io::{ProjectionRow, PROJECTION_HEADERS};
use iprtrack_recon::{CancelToken, RetryPolicy};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::CliError;

use super::common::{extract_message, FetchClient};

/// Zero-based column of the tax id in the published tab.
const TAX_ID_COLUMN: usize = 2;

/// Light red for rows whose company is not active.
const INACTIVE_FILL: (f64, f64, f64) = (1.0, 0.8, 0.8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub sheet_title: String,
    /// Numeric tab id, used by formatting requests.
    pub sheet_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub rows: usize,
    pub highlighted: usize,
}

pub struct SheetsClient {
    client: FetchClient,
    token: String,
    base_url: String,
    target: SheetTarget,
}

impl SheetsClient {
    pub fn new(
        token: String,
        base_url: String,
        target: SheetTarget,
        retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("Google Sheets", extract_message, retry, cancel)?,
            token,
            base_url,
            target,
        })
    }

    /// `<base>/<segments…>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CliError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CliError::config(format!("invalid [publish] base_url {:?}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| CliError::config(format!("[publish] base_url {:?} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn tab_range(&self, cell: Option<&str>) -> String {
        let title = quote_title(&self.target.sheet_title);
        match cell {
            Some(cell) => format!("{title}!{cell}"),
            None => title,
        }
    }

    /// Every value currently in the tab, as displayed strings.
    pub fn read_values(&self) -> Result<Vec<Vec<String>>, CliError> {
        let url = self.endpoint(&[self.target.spreadsheet_id.as_str(), "values", self.tab_range(None).as_str()])?;
        let body = self.client.request_json(|http| http.get(url.clone()).bearer_auth(&self.token))?;
        Ok(parse_values(&body))
    }

    pub fn clear(&self) -> Result<(), CliError> {
        let range = format!("{}:clear", self.tab_range(None));
        let url = self.endpoint(&[self.target.spreadsheet_id.as_str(), "values", range.as_str()])?;
        self.client
            .request_json(|http| http.post(url.clone()).bearer_auth(&self.token).json(&json!({})))?;
        Ok(())
    }

    pub fn write_values(&self, values: &[Vec<Value>]) -> Result<(), CliError> {
        let range = self.tab_range(Some("A1"));
        let url = self.endpoint(&[self.target.spreadsheet_id.as_str(), "values", range.as_str()])?;
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        self.client.request_json(|http| {
            http.put(url.clone())
                .bearer_auth(&self.token)
                .query(&[("valueInputOption", "RAW")])
                .json(&body)
        })?;
        Ok(())
    }

    pub fn batch_update(&self, requests: Vec<Value>) -> Result<(), CliError> {
        let url = self.endpoint(&[format!("{}:batchUpdate", self.target.spreadsheet_id).as_str()])?;
        let body = json!({ "requests": requests });
        self.client
            .request_json(|http| http.post(url.clone()).bearer_auth(&self.token).json(&body))?;
        Ok(())
    }

    /// Hand-maintained links keyed by tax id.
    pub fn fetch_links(&self, url_column: usize) -> Result<HashMap<String, String>, CliError> {
        let values = self.read_values()?;
        let links = links_by_tax_id(&values, url_column);
        debug!("read {} link(s) from the published sheet", links.len());
        Ok(links)
    }

    /// Replace the tab's contents with the projection and format it.
    pub fn publish(&self, rows: &[ProjectionRow]) -> Result<PublishReport, CliError> {
        self.clear()?;
        self.write_values(&table_values(rows))?;
        self.batch_update(format_requests(self.target.sheet_id, rows))?;

        let report = PublishReport {
            rows: rows.len(),
            highlighted: rows.iter().filter(|r| r.inactive).count(),
        };
        info!("Данные успешно перенесены в Google sheets!");
        Ok(report)
    }
}

/// Titles that are not plain words must be single-quoted in A1 notation.
fn quote_title(title: &str) -> String {
    if !title.is_empty() && title.chars().all(|c| c.is_alphanumeric() || c == '_') {
        title.to_string()
    } else {
        format!("'{}'", title.replace('\'', "''"))
    }
}

fn parse_values(body: &Value) -> Vec<Vec<String>> {
    body["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_string).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map tax id -> link from the tab's values. Row 1 is the header; rows
/// without a tax id or with an empty link are left out. `url_column` is
/// 1-based.
pub fn links_by_tax_id(values: &[Vec<String>], url_column: usize) -> HashMap<String, String> {
    let url_idx = url_column.saturating_sub(1);
    values
        .iter()
        .skip(1)
        .filter_map(|row| {
            let tax_id = row.get(TAX_ID_COLUMN)?.trim();
            let link = row.get(url_idx)?.trim();
            if tax_id.is_empty() || link.is_empty() {
                return None;
            }
            Some((tax_id.to_string(), link.to_string()))
        })
        .collect()
}

/// Header plus one row per record. The sequence number goes out as a number,
/// everything else as text so tax ids keep their leading zeros.
pub fn table_values(rows: &[ProjectionRow]) -> Vec<Vec<Value>> {
    let mut values: Vec<Vec<Value>> = Vec::with_capacity(rows.len() + 1);
    values.push(PROJECTION_HEADERS.iter().map(|h| json!(h)).collect());
    for row in rows {
        let [_, folder, tax_id, status, latest, link] = row.cells();
        values.push(vec![
            json!(row.sequence_number),
            json!(folder),
            json!(tax_id),
            json!(status),
            json!(latest),
            json!(link),
        ]);
    }
    values
}

fn grid_range(sheet_id: u32, start_row: usize, end_row: usize) -> Value {
    json!({
        "sheetId": sheet_id,
        "startRowIndex": start_row,
        "endRowIndex": end_row,
        "startColumnIndex": 0,
        "endColumnIndex": PROJECTION_HEADERS.len(),
    })
}

fn background(sheet_id: u32, start_row: usize, end_row: usize, (red, green, blue): (f64, f64, f64)) -> Value {
    json!({
        "repeatCell": {
            "range": grid_range(sheet_id, start_row, end_row),
            "cell": {
                "userEnteredFormat": {
                    "backgroundColor": { "red": red, "green": green, "blue": blue }
                }
            },
            "fields": "userEnteredFormat.backgroundColor",
        }
    })
}

/// Bold header, solid borders around every cell, data rows reset to white
/// and inactive rows filled light red. Clearing values keeps old fills,
/// hence the reset.
pub fn format_requests(sheet_id: u32, rows: &[ProjectionRow]) -> Vec<Value> {
    let last_row = rows.len() + 1;
    let solid = json!({ "style": "SOLID" });
    let mut requests = vec![
        json!({
            "repeatCell": {
                "range": grid_range(sheet_id, 0, 1),
                "cell": { "userEnteredFormat": { "textFormat": { "bold": true } } },
                "fields": "userEnteredFormat.textFormat.bold",
            }
        }),
        json!({
            "updateBorders": {
                "range": grid_range(sheet_id, 0, last_row),
                "top": solid,
                "bottom": solid,
                "left": solid,
                "right": solid,
                "innerHorizontal": solid,
                "innerVertical": solid,
            }
        }),
    ];
    if !rows.is_empty() {
        requests.push(background(sheet_id, 1, last_row, (1.0, 1.0, 1.0)));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.inactive {
            requests.push(background(sheet_id, i + 1, i + 2, INACTIVE_FILL));
        }
    }
    requests
}
