//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Each row is serialized straight into a buffered writer.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_rows(&history.to_rows())?;
//! sink.write_row(&SummaryRow::new("fee_summary", &history.summary))?;
//! sink.finish()?;
//! ```

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonStreamSink<File> {
    /// Appends to `path`, creating it if needed.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonStreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    pub fn write_row<T: Serialize>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_rows<T: Serialize>(&mut self, rows: &[T]) -> io::Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FeeRow, SummaryRow};

    #[test]
    fn one_object_per_line() {
        let mut buf = Vec::new();
        let mut sink = JsonStreamSink::new(&mut buf);

        let rows = vec![
            FeeRow {
                height: 100,
                has_data: true,
                tx_count: 3,
                skipped: 0,
                min: Some(1.0),
                max: Some(12.5),
                mean: Some(5.0),
                median: Some(2.0),
                reason: None,
            },
            FeeRow {
                height: 101,
                has_data: false,
                tx_count: 0,
                skipped: 0,
                min: None,
                max: None,
                mean: None,
                median: None,
                reason: Some("no eligible transactions".into()),
            },
        ];
        sink.write_rows(&rows).unwrap();
        sink.write_row(&SummaryRow::new("fee_summary", serde_json::json!({ "data_points": 1 })))
            .unwrap();
        assert_eq!(sink.finish().unwrap(), 3);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["height"], 100);
        assert!(lines[0].get("reason").is_none());
        assert_eq!(lines[1]["has_data"], false);
        assert_eq!(lines[2]["kind"], "fee_summary");
    }

    #[test]
    fn append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.ndjson");
        for _ in 0..2 {
            let mut sink = JsonStreamSink::append_to(&path).unwrap();
            sink.write_row(&serde_json::json!({ "n": 1 })).unwrap();
            sink.finish().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
