use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::report::ReportMatrix;
use crate::traits::ReportSink;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET_NAME: &str = "Sheet1";
const SHEET_RANGE: &str = "Sheet1!A1";

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Writes the matrix as CSV. Formulas are written as their text.
pub struct CsvFileSink;

#[async_trait]
impl ReportSink for CsvFileSink {
    async fn write(&self, target: &str, matrix: &ReportMatrix) -> Result<()> {
        tokio::fs::write(target, to_csv(matrix))
            .await
            .with_context(|| format!("Failed to write CSV report to {target}"))?;
        info!(path = target, rows = matrix.rows().len(), "CSV report written");
        Ok(())
    }

    fn name(&self) -> &str {
        "csv"
    }
}

pub fn to_csv(matrix: &ReportMatrix) -> String {
    let mut out = String::new();
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|cell| csv_field(&cell.as_raw())).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Writes the matrix as a JSON array of rows. `-` means stdout.
pub struct JsonSink;

#[async_trait]
impl ReportSink for JsonSink {
    async fn write(&self, target: &str, matrix: &ReportMatrix) -> Result<()> {
        let mut body = serde_json::to_vec_pretty(matrix)?;
        body.push(b'\n');
        if target == "-" {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&body).await?;
            stdout.flush().await?;
        } else {
            tokio::fs::write(target, &body)
                .await
                .with_context(|| format!("Failed to write JSON report to {target}"))?;
            info!(path = target, rows = matrix.rows().len(), "JSON report written");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}

// ---------------------------------------------------------------------------
// Google Sheets
// ---------------------------------------------------------------------------

/// Replaces the contents of the first sheet of a spreadsheet: the sheet is
/// cleared, then the matrix is written from A1. Values are sent with
/// `USER_ENTERED` so formulas are evaluated.
pub struct SheetsSink {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl SheetsSink {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_base: SHEETS_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn values_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/{}/values/{}?valueInputOption=USER_ENTERED",
            self.api_base.trim_end_matches('/'),
            spreadsheet_id,
            SHEET_RANGE
        )
    }

    fn clear_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/{}/values/{}:clear",
            self.api_base.trim_end_matches('/'),
            spreadsheet_id,
            SHEET_NAME
        )
    }
}

async fn ensure_success(resp: reqwest::Response, action: &str) -> Result<()> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Sheets API {action} error ({status}): {body}");
    }
    Ok(())
}

pub fn sheets_payload(matrix: &ReportMatrix) -> serde_json::Value {
    json!({
        "range": SHEET_RANGE,
        "majorDimension": "ROWS",
        "values": matrix,
    })
}

#[async_trait]
impl ReportSink for SheetsSink {
    async fn write(&self, target: &str, matrix: &ReportMatrix) -> Result<()> {
        // rows from a longer previous report would otherwise survive below ours
        let cleared = self
            .client
            .post(self.clear_url(target))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .context("Sheets clear request failed")?;
        ensure_success(cleared, "clear").await?;

        let updated = self
            .client
            .put(self.values_url(target))
            .bearer_auth(&self.token)
            .json(&sheets_payload(matrix))
            .send()
            .await
            .context("Sheets update request failed")?;
        ensure_success(updated, "update").await?;

        info!(
            spreadsheet = target,
            rows = matrix.rows().len(),
            "Spreadsheet updated"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "sheets"
    }
}
