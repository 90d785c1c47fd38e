//! Format writers for export output
//!
//! This module provides a unified interface for writing resolved rows to
//! the supported output formats (CSV, XLSX). Writers receive the header
//! labels once, then one row of formatted cells at a time, and emit their
//! bytes to the destination no later than [`FormatWriter::finalize`].

use std::io::Write;

use crate::error::Result;
use crate::store::Value;

use super::spec::OutputFormat;

pub mod csv;
pub mod xlsx;

pub use csv::CsvWriter;
pub use xlsx::XlsxWriter;

/// Trait for writing rows to different file formats
pub trait FormatWriter: Send {
    /// Write the header row
    ///
    /// # Arguments
    /// * `labels` - Column labels in declared order
    fn write_header(&mut self, labels: &[&str]) -> Result<()>;

    /// Write one data row
    ///
    /// # Arguments
    /// * `cells` - Formatted cell values, one per column
    fn write_row(&mut self, cells: &[Value]) -> Result<()>;

    /// Finalize the output (flush buffers, emit the container, etc.)
    ///
    /// Writing after finalize fails with `OutputError::Finalized`.
    fn finalize(&mut self) -> Result<()>;

    /// Number of data rows written so far
    fn rows_written(&self) -> u64;
}

/// Create the writer for `format` over `dst`
pub fn create_writer<'a, W>(format: OutputFormat, dst: W) -> Result<Box<dyn FormatWriter + 'a>>
where
    W: Write + Send + 'a,
{
    let writer: Box<dyn FormatWriter + 'a> = match format {
        OutputFormat::Csv => Box::new(CsvWriter::new(dst)),
        OutputFormat::Xlsx => Box::new(XlsxWriter::new(dst)?),
    };
    Ok(writer)
}
