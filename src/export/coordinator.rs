//! Export coordinator for orchestrating export generation
//!
//! This module brings together the page driver, the field resolver and a
//! format writer: fetch a page, resolve each record into a row, hand the
//! row to the writer, repeat until a short page.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::store::{Record, Value};

use super::query::PageDriver;
use super::resolver::{Column, ExpansionIndex, resolve_row};
use super::writers::FormatWriter;

/// Result of an export generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Number of data rows written
    pub rows_exported: u64,
    /// Number of page fetches issued
    pub pages_fetched: usize,
    /// Time taken for generation
    pub elapsed_ms: u64,
}

/// Coordinator for one export generation
///
/// Pages are processed strictly in order; only one page of records and
/// its expansions are held at a time.
pub struct ExportCoordinator<'a> {
    /// Page source for the export's records
    driver: PageDriver<'a>,
    /// Compiled headers
    columns: Vec<Column>,
    /// Format writer for output
    writer: Box<dyn FormatWriter + 'a>,
}

impl<'a> ExportCoordinator<'a> {
    /// Create a new export coordinator
    pub fn new(driver: PageDriver<'a>, columns: Vec<Column>, writer: Box<dyn FormatWriter + 'a>) -> Self {
        Self {
            driver,
            columns,
            writer,
        }
    }

    /// Execute the export
    ///
    /// 1. Write the header row
    /// 2. Fetch, resolve and write pages until one comes back short
    /// 3. Finalize the writer
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Export statistics or error
    pub async fn execute(&mut self) -> Result<ExportResult> {
        let start_time = Instant::now();
        info!("Starting export generation");

        let labels: Vec<&str> = self.columns.iter().map(|c| c.label.as_str()).collect();
        self.writer.write_header(&labels)?;

        let page_size = self.driver.page_size();
        let mut records: Vec<Record> = Vec::with_capacity(page_size);
        let mut index = ExpansionIndex::new();
        let mut row: Vec<Value> = Vec::with_capacity(self.columns.len());
        let mut page = 1;

        loop {
            debug!("Fetching page #{}", page);
            self.driver.fetch_page(page, &mut records, &mut index).await?;

            for record in &records {
                resolve_row(record, &self.columns, &index, &mut row);
                self.writer.write_row(&row)?;
            }

            if records.len() < page_size {
                debug!("Page #{} is short ({} records), done", page, records.len());
                break;
            }
            page += 1;
        }

        debug!("Finalizing output");
        self.writer.finalize()?;

        let result = ExportResult {
            rows_exported: self.writer.rows_written(),
            pages_fetched: self.driver.pages_fetched(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Export completed: {} rows, {} pages, {} ms",
            result.rows_exported, result.pages_fetched, result.elapsed_ms
        );
        Ok(result)
    }
}
