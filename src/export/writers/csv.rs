//! CSV writer for export output
//!
//! Cells are written in their display form. Quoting and escaping of
//! delimiters, quotes and newlines is left to the `csv` crate.

use std::io::Write;

use tracing::debug;

use crate::error::{OutputError, Result};
use crate::store::Value;

use super::FormatWriter;

/// Writer for CSV format
///
/// One header line, then one line per row, `\n` terminated.
pub struct CsvWriter<W: Write> {
    writer: Option<csv::Writer<W>>,
    /// Reused cell buffer
    fields: Vec<String>,
    written: u64,
}

impl<W: Write> CsvWriter<W> {
    /// Create a new CSV writer over `dst`
    pub fn new(dst: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(dst);

        Self {
            writer: Some(writer),
            fields: Vec::new(),
            written: 0,
        }
    }

    fn inner(&mut self) -> Result<&mut csv::Writer<W>> {
        self.writer.as_mut().ok_or_else(|| OutputError::Finalized.into())
    }
}

impl<W: Write + Send> FormatWriter for CsvWriter<W> {
    fn write_header(&mut self, labels: &[&str]) -> Result<()> {
        self.inner()?.write_record(labels)?;
        debug!("Wrote CSV header: {} columns", labels.len());
        Ok(())
    }

    fn write_row(&mut self, cells: &[Value]) -> Result<()> {
        let mut fields = std::mem::take(&mut self.fields);
        fields.clear();
        fields.extend(cells.iter().map(Value::to_string));

        let result = self.inner().and_then(|w| Ok(w.write_record(&fields)?));
        self.fields = fields;
        result?;

        self.written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or(OutputError::Finalized)?;
        writer.flush()?;
        debug!("Finalized CSV output ({} rows)", self.written);
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(rows: &[Vec<Value>]) -> String {
        let mut out = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut out);
            writer.write_header(&["name", "note"]).unwrap();
            for row in rows {
                writer.write_row(row).unwrap();
            }
            writer.finalize().unwrap();
            assert_eq!(writer.rows_written(), rows.len() as u64);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_writer_basic() {
        let content = write(&[
            vec!["Alice".into(), Value::Int(30)],
            vec!["Bob".into(), Value::Null],
        ]);
        assert_eq!(content, "name,note\nAlice,30\nBob,\n");
    }

    #[test]
    fn test_csv_writer_with_special_characters() {
        let content = write(&[
            vec!["Hello, world!".into(), "Quote: \"test\"".into()],
            vec!["Newline\ntest".into(), "plain".into()],
        ]);
        assert!(content.contains("\"Hello, world!\""));
        assert!(content.contains("\"Quote: \"\"test\"\"\""));
        assert!(content.contains("\"Newline\ntest\""));
    }

    #[test]
    fn test_csv_round_trip() {
        let rows = vec![
            vec!["a,b".into(), "x\"y".into()],
            vec!["line\nbreak".into(), "tiếng Việt".into()],
            vec![Value::Float(2.5), Value::Bool(false)],
        ];
        let content = write(&rows);

        let mut reader = ::csv::Reader::from_reader(content.as_bytes());
        assert_eq!(reader.headers().unwrap(), vec!["name", "note"]);

        let parsed: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        let expected: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(Value::to_string).collect())
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_write_after_finalize_fails() {
        let mut out = Vec::new();
        let mut writer = CsvWriter::new(&mut out);
        writer.write_header(&["a"]).unwrap();
        writer.finalize().unwrap();

        assert!(writer.write_row(&["x".into()]).is_err());
        assert!(writer.finalize().is_err());
    }
}
