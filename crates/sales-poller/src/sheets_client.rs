//! Google Sheets backing store for the ledger.

use anyhow::{Context, Result};
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, GridProperties, Request, Scope,
    SheetProperties, ValueRange,
};
use google_sheets4::hyper_rustls::HttpsConnector;
use google_sheets4::Sheets;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rust_decimal::prelude::ToPrimitive;
use sales_ledger::sheet::{page_range, row_range, Cell, ROW_WIDTH};
use sales_ledger::{PageSnapshot, SheetStore, StoreError};
use serde_json::Value;
use std::path::Path;

const SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Grid size of pages created by a rollover
const NEW_PAGE_ROWS: i32 = 100;
const NEW_PAGE_COLUMNS: i32 = 10;

/// Ledger store backed by one Google spreadsheet
pub struct SheetsStore {
    hub: Sheets<HttpsConnector<HttpConnector>>,
    spreadsheet_id: String,
}

impl SheetsStore {
    pub async fn new(
        credentials_path: &Path,
        token_cache: &Path,
        spreadsheet_id: impl Into<String>,
    ) -> Result<Self> {
        let secret = google_sheets4::yup_oauth2::read_application_secret(credentials_path)
            .await
            .context("Failed to read OAuth credentials")?;

        let auth = google_sheets4::yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            google_sheets4::yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache)
        .build()
        .await
        .context("Failed to build authenticator")?;

        auth.token(&[SPREADSHEETS])
            .await
            .context("Failed to obtain Sheets access token")?;

        let connector = google_sheets4::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Sheets::new(client, auth);

        Ok(Self {
            hub,
            spreadsheet_id: spreadsheet_id.into(),
        })
    }
}

fn map_error(err: google_sheets4::Error) -> StoreError {
    match err {
        google_sheets4::Error::MissingToken(e) => StoreError::Auth(e.to_string()),
        google_sheets4::Error::BadRequest(body) => StoreError::Rejected(body.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Displayed text of a cell returned by `values.get`
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Payload of one cell for a USER_ENTERED `values.update`.
///
/// Text gets a leading apostrophe so Sheets keeps it as literal text, and
/// numbers go out as JSON numbers so the sheet's locale plays no part.
fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Text(text) => Value::String(format!("'{}", text)),
        Cell::Number(n) => n
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            // Out of f64 range; Sheets could not hold it as a number anyway
            .unwrap_or_else(|| Value::String(n.to_string())),
        Cell::Formula(formula) => Value::String(formula.clone()),
    }
}

/// Row payload for `values.update`; empty cells are left untouched
fn row_values(cells: &[Cell; ROW_WIDTH]) -> Vec<Value> {
    cells.iter().map(cell_value).collect()
}

fn add_sheet_request(name: &str) -> BatchUpdateSpreadsheetRequest {
    BatchUpdateSpreadsheetRequest {
        requests: Some(vec![Request {
            add_sheet: Some(AddSheetRequest {
                properties: Some(SheetProperties {
                    title: Some(name.to_string()),
                    grid_properties: Some(GridProperties {
                        row_count: Some(NEW_PAGE_ROWS),
                        column_count: Some(NEW_PAGE_COLUMNS),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

impl SheetStore for SheetsStore {
    async fn list_pages(&self) -> Result<Vec<String>, StoreError> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .param("fields", "sheets.properties.title")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(map_error)?;

        Ok(spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sheet| sheet.properties.and_then(|p| p.title))
            .collect())
    }

    async fn create_page(&self, name: &str) -> Result<(), StoreError> {
        self.hub
            .spreadsheets()
            .batch_update(add_sheet_request(name), &self.spreadsheet_id)
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(map_error)?;

        tracing::debug!("Created sheet '{}' in {}", name, self.spreadsheet_id);
        Ok(())
    }

    async fn read_page(&self, page: &str) -> Result<PageSnapshot, StoreError> {
        let (_, range) = self
            .hub
            .spreadsheets()
            .values_get(&self.spreadsheet_id, &page_range(page))
            .value_render_option("FORMATTED_VALUE")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(map_error)?;

        let rows = range
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        Ok(PageSnapshot::new(rows))
    }

    async fn write_row(
        &self,
        page: &str,
        row: usize,
        cells: &[Cell; ROW_WIDTH],
    ) -> Result<(), StoreError> {
        let range = row_range(page, row);
        let body = ValueRange {
            range: Some(range.clone()),
            major_dimension: Some("ROWS".to_string()),
            values: Some(vec![row_values(cells)]),
        };

        self.hub
            .spreadsheets()
            .values_update(body, &self.spreadsheet_id, &range)
            .value_input_option("USER_ENTERED")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(map_error)?;

        Ok(())
    }
}
