use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    column::{decode_tagged, ColumnType, TypedValue},
    error::{DitError, DitResult},
};

/// A column as handed out by the database engine: its storage-type tag and raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawColumn {
    pub tag: u32,
    pub data: Vec<u8>,
}

/// A row of the directory table, keyed by internal column name (`ATTr589970`, ...).
///
/// Values are decoded on demand, and accessors fail if the stored type does not
/// match the requested one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    columns: BTreeMap<String, RawColumn>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column to the record, replacing any previous column of the same name.
    pub fn insert(&mut self, column: impl Into<String>, tag: u32, data: impl Into<Vec<u8>>) {
        self.columns.insert(
            column.into(),
            RawColumn {
                tag,
                data: data.into(),
            },
        );
    }

    /// Adds a column to the record.
    pub fn with_column(
        mut self,
        column: impl Into<String>,
        column_type: ColumnType,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(column, column_type.into(), data);

        self
    }

    /// Returns the raw column with the given name.
    pub fn raw(&self, column: &str) -> Option<&RawColumn> {
        self.columns.get(column)
    }

    /// Decodes the column with the given name.
    /// Returns `None` if the record has no such column.
    pub fn value(&self, column: &str) -> DitResult<Option<TypedValue>> {
        self.columns
            .get(column)
            .map(|raw| decode_tagged(raw.tag, &raw.data))
            .transpose()
    }

    /// Returns the bytes of a binary column.
    pub fn get_bytes(&self, column: &str) -> DitResult<Option<Vec<u8>>> {
        match self.value(column)? {
            None | Some(TypedValue::Absent) => Ok(None),
            Some(TypedValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(mismatch(column, "bytes", &other)),
        }
    }

    /// Returns the content of a text column.
    pub fn get_text(&self, column: &str) -> DitResult<Option<String>> {
        match self.value(column)? {
            None | Some(TypedValue::Absent) => Ok(None),
            Some(TypedValue::Text(text)) => Ok(Some(text)),
            Some(other) => Err(mismatch(column, "text", &other)),
        }
    }

    /// Returns the value of an integer column, widened to 64 bits.
    pub fn get_integer(&self, column: &str) -> DitResult<Option<i64>> {
        let value = match self.value(column)? {
            None | Some(TypedValue::Absent) => return Ok(None),
            Some(TypedValue::I16(v)) => v.into(),
            Some(TypedValue::U16(v)) => v.into(),
            Some(TypedValue::I32(v)) => v.into(),
            Some(TypedValue::U32(v)) => v.into(),
            Some(TypedValue::I64(v)) => v,
            Some(TypedValue::U64(v)) => {
                i64::try_from(v).map_err(|_| mismatch(column, "integer", &TypedValue::U64(v)))?
            }
            Some(other) => return Err(mismatch(column, "integer", &other)),
        };

        Ok(Some(value))
    }

    /// Decodes every column of the record.
    /// Columns that can't be decoded are left out.
    pub fn decode_all(&self) -> BTreeMap<String, TypedValue> {
        self.columns
            .iter()
            .filter_map(|(name, raw)| match decode_tagged(raw.tag, &raw.data) {
                Ok(TypedValue::Absent) => None,
                Ok(value) => Some((name.clone(), value)),
                Err(e) => {
                    debug!("ignoring column {name}: {e}");
                    None
                }
            })
            .collect()
    }
}

fn mismatch(column: &str, expected: &'static str, found: &TypedValue) -> DitError {
    DitError::ColumnTypeMismatch {
        column: column.to_owned(),
        expected,
        found: found.kind(),
    }
}
