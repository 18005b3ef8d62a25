//! Reads the rows of the datatable from a JSON lines export.
//!
//! Each line holds one row, as an object mapping the column names to their
//! storage type (`JET_coltyp`) and hex-encoded raw value:
//!
//! ```text
//! {"ATTr589970": {"type": 11, "data": "0105000000000005..."}, "ATTm3": {"type": 12, "data": "..."}}
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use anyhow::{Context, Result};
use ditdump_core::{DitError, DitResult, Record, RecordSource};
use serde::Deserialize;

#[derive(Deserialize)]
struct ExportedColumn {
    #[serde(rename = "type")]
    column_type: u32,
    #[serde(default)]
    data: String,
}

/// A record source reading a JSON lines export of the datatable.
pub struct ExportSource<R> {
    reader: R,
    line: u64,
}

impl ExportSource<BufReader<File>> {
    /// Opens the export at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).context("Unable to open the datatable export")?;

        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Seek> ExportSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: 0 }
    }
}

/// Parses a line of the export.
fn parse_record(line: &str) -> std::result::Result<Record, String> {
    let columns: BTreeMap<String, ExportedColumn> =
        serde_json::from_str(line).map_err(|e| e.to_string())?;

    let mut record = Record::new();
    for (name, column) in columns {
        let data = hex::decode(&column.data)
            .map_err(|e| format!("the column {name} is not hexadecimal: {e}"))?;
        record.insert(name, column.column_type, data);
    }

    Ok(record)
}

impl<R: BufRead + Seek> RecordSource for ExportSource<R> {
    fn next_record(&mut self) -> DitResult<Option<Record>> {
        let mut line = String::new();

        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            if line.trim().is_empty() {
                continue;
            }

            return parse_record(&line)
                .map(Some)
                .map_err(|e| DitError::Source(format!("line {}: {e}", self.line)));
        }
    }

    fn rewind(&mut self) -> DitResult<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.line = 0;

        Ok(())
    }
}
