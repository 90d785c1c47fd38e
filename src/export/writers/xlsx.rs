//! XLSX writer for export output
//!
//! Rows go into a single `Sheet1` worksheet as they arrive. The worksheet
//! runs in constant memory mode: each finished row is flushed to a
//! temporary file, so only the current row is held in memory. The workbook
//! container can only be produced once every row is known, so the bytes
//! are emitted to the destination on [`FormatWriter::finalize`].

use std::io::Write;

use rust_xlsxwriter::{ColNum, DocProperties, ExcelDateTime, RowNum, Workbook, Worksheet};
use tracing::debug;

use crate::error::{OutputError, Result};
use crate::store::Value;

use super::FormatWriter;

const SHEET_NAME: &str = "Sheet1";

/// Writer for XLSX format
///
/// Numbers and booleans keep their cell type; everything else is written
/// as text in its display form. Null cells are left blank.
pub struct XlsxWriter<W: Write> {
    dst: Option<W>,
    workbook: Workbook,
    /// Next row index; row 0 holds the header
    row: RowNum,
    written: u64,
}

impl<W: Write> XlsxWriter<W> {
    /// Create a new XLSX writer over `dst`
    ///
    /// Workbook metadata is fixed so identical rows give identical bytes.
    pub fn new(dst: W) -> Result<Self> {
        let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
        let properties = DocProperties::new().set_creation_datetime(&created);

        let mut workbook = Workbook::new();
        workbook.set_properties(&properties);
        workbook.add_worksheet_with_constant_memory().set_name(SHEET_NAME)?;

        Ok(Self {
            dst: Some(dst),
            workbook,
            row: 0,
            written: 0,
        })
    }

    fn worksheet(&mut self) -> Result<&mut Worksheet> {
        Ok(self.workbook.worksheet_from_index(0)?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.dst.is_none() {
            return Err(OutputError::Finalized.into());
        }
        Ok(())
    }

    fn column(index: usize) -> Result<ColNum> {
        ColNum::try_from(index)
            .map_err(|_| OutputError::Xlsx(format!("too many columns: {}", index + 1)).into())
    }

    fn write_cell(worksheet: &mut Worksheet, row: RowNum, col: ColNum, value: &Value) -> Result<()> {
        match value {
            Value::Null => {}
            Value::Bool(b) => {
                worksheet.write_boolean(row, col, *b)?;
            }
            Value::Int(n) => {
                worksheet.write_number(row, col, *n as f64)?;
            }
            Value::Float(n) => {
                worksheet.write_number(row, col, *n)?;
            }
            Value::Text(s) => {
                worksheet.write_string(row, col, s)?;
            }
            other => {
                worksheet.write_string(row, col, other.to_string())?;
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> FormatWriter for XlsxWriter<W> {
    fn write_header(&mut self, labels: &[&str]) -> Result<()> {
        self.ensure_open()?;
        let row = self.row;
        let worksheet = self.worksheet()?;
        for (i, label) in labels.iter().enumerate() {
            worksheet.write_string(row, Self::column(i)?, *label)?;
        }
        self.row += 1;
        debug!("Wrote XLSX header: {} columns", labels.len());
        Ok(())
    }

    fn write_row(&mut self, cells: &[Value]) -> Result<()> {
        self.ensure_open()?;
        let row = self.row;
        let worksheet = self.worksheet()?;
        for (i, cell) in cells.iter().enumerate() {
            Self::write_cell(worksheet, row, Self::column(i)?, cell)?;
        }
        self.row += 1;
        self.written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.ensure_open()?;
        let bytes = self.workbook.save_to_buffer()?;
        let mut dst = self.dst.take().ok_or(OutputError::Finalized)?;
        dst.write_all(&bytes)?;
        dst.flush()?;

        debug!(
            "Finalized XLSX output ({} rows, {} bytes)",
            self.written,
            bytes.len()
        );
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(rows: &[Vec<Value>]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = XlsxWriter::new(&mut out).unwrap();
        writer.write_header(&["name", "age", "active"]).unwrap();
        for row in rows {
            writer.write_row(row).unwrap();
        }
        writer.finalize().unwrap();
        assert_eq!(writer.rows_written(), rows.len() as u64);
        out
    }

    fn rows() -> Vec<Vec<Value>> {
        vec![
            vec!["Alice".into(), Value::Int(30), Value::Bool(true)],
            vec!["Bob".into(), Value::Float(25.5), Value::Null],
        ]
    }

    #[test]
    fn test_xlsx_is_zip_container() {
        let bytes = write(&rows());
        assert!(bytes.len() > 100);
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_xlsx_output_is_deterministic() {
        assert_eq!(write(&rows()), write(&rows()));
    }

    #[test]
    fn test_many_rows_stream_through_one_sheet() {
        let many: Vec<Vec<Value>> = (0..5000)
            .map(|i| vec![format!("user{i}").into(), Value::Int(i), Value::Bool(i % 2 == 0)])
            .collect();
        let bytes = write(&many);
        assert_eq!(&bytes[..2], b"PK");
        assert_eq!(bytes, write(&many));
    }

    #[test]
    fn test_nothing_emitted_before_finalize() {
        let mut out = Vec::new();
        {
            let mut writer = XlsxWriter::new(&mut out).unwrap();
            writer.write_header(&["a"]).unwrap();
            writer.write_row(&["x".into()]).unwrap();
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_after_finalize_fails() {
        let mut out = Vec::new();
        let mut writer = XlsxWriter::new(&mut out).unwrap();
        writer.finalize().unwrap();
        assert!(writer.write_row(&["x".into()]).is_err());
    }
}
