//! Typed decoding of raw ESE column values.
//!
//! The database engine hands out every column as a storage-type tag (`JET_coltyp`)
//! and the raw bytes found in the record. Decoding only depends on that tag, never
//! on what the column means to the directory.

use std::fmt::{self, Display};

use crate::error::{DitError, DitResult};

/// The storage types an ESE column can be declared with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Nil,
    Bit,
    UnsignedByte,
    Short,
    Long,
    Currency,
    IeeeSingle,
    IeeeDouble,
    DateTime,
    Binary,
    Text,
    LongBinary,
    LongText,
    Slv,
    UnsignedLong,
    LongLong,
    Guid,
    UnsignedShort,
    Max,
}

impl TryFrom<u32> for ColumnType {
    type Error = DitError;

    fn try_from(tag: u32) -> DitResult<Self> {
        Ok(match tag {
            0 => Self::Nil,
            1 => Self::Bit,
            2 => Self::UnsignedByte,
            3 => Self::Short,
            4 => Self::Long,
            5 => Self::Currency,
            6 => Self::IeeeSingle,
            7 => Self::IeeeDouble,
            8 => Self::DateTime,
            9 => Self::Binary,
            10 => Self::Text,
            11 => Self::LongBinary,
            12 => Self::LongText,
            13 => Self::Slv,
            14 => Self::UnsignedLong,
            15 => Self::LongLong,
            16 => Self::Guid,
            17 => Self::UnsignedShort,
            18 => Self::Max,
            _ => return Err(DitError::UnrecognizedColumnType(tag)),
        })
    }
}

impl From<ColumnType> for u32 {
    fn from(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Nil => 0,
            ColumnType::Bit => 1,
            ColumnType::UnsignedByte => 2,
            ColumnType::Short => 3,
            ColumnType::Long => 4,
            ColumnType::Currency => 5,
            ColumnType::IeeeSingle => 6,
            ColumnType::IeeeDouble => 7,
            ColumnType::DateTime => 8,
            ColumnType::Binary => 9,
            ColumnType::Text => 10,
            ColumnType::LongBinary => 11,
            ColumnType::LongText => 12,
            ColumnType::Slv => 13,
            ColumnType::UnsignedLong => 14,
            ColumnType::LongLong => 15,
            ColumnType::Guid => 16,
            ColumnType::UnsignedShort => 17,
            ColumnType::Max => 18,
        }
    }
}

impl ColumnType {
    /// Returns the size of the values of this type, if it is a fixed-size type.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bit => Some(1),
            Self::Short | Self::UnsignedShort => Some(2),
            Self::Long | Self::UnsignedLong | Self::IeeeSingle => Some(4),
            Self::Currency | Self::IeeeDouble | Self::DateTime | Self::LongLong => Some(8),
            _ => None,
        }
    }
}

/// A decoded column value.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Absent,
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    Text(String),
}

impl TypedValue {
    /// A short name of the kind of value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Bool(_) => "boolean",
            Self::I16(_) | Self::U16(_) | Self::I32(_) | Self::U32(_) => "integer",
            Self::I64(_) | Self::U64(_) => "integer",
            Self::F32(_) | Self::F64(_) => "float",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
        }
    }
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Bytes(bytes) => bytes.iter().try_for_each(|b| write!(f, "{b:02x}")),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Reads a fixed-size little-endian buffer.
fn fixed<const N: usize>(data: &[u8]) -> DitResult<[u8; N]> {
    data.try_into().map_err(|_| DitError::InvalidColumnWidth {
        expected: N,
        found: data.len(),
    })
}

/// Decodes a text column.
/// The directory stores its text columns in UTF-16LE, unpaired surrogates are replaced.
fn decode_text(data: &[u8]) -> DitResult<String> {
    if data.len() % 2 != 0 {
        return Err(DitError::InvalidText(data.len()));
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .collect();

    Ok(String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_owned())
}

/// Decodes the raw bytes of a column according to its storage type.
///
/// An empty buffer in a fixed-size column is a null value and decodes to [`TypedValue::Absent`],
/// while an empty binary column stays an empty byte string.
pub fn decode(column_type: ColumnType, data: &[u8]) -> DitResult<TypedValue> {
    if data.is_empty() && column_type.fixed_width().is_some() {
        return Ok(TypedValue::Absent);
    }

    let value = match column_type {
        ColumnType::Nil => TypedValue::Absent,
        ColumnType::Bit => TypedValue::Bool(fixed::<1>(data)?[0] != 0),
        ColumnType::Short => TypedValue::I16(i16::from_le_bytes(fixed(data)?)),
        ColumnType::UnsignedShort => TypedValue::U16(u16::from_le_bytes(fixed(data)?)),
        ColumnType::Long => TypedValue::I32(i32::from_le_bytes(fixed(data)?)),
        ColumnType::UnsignedLong => TypedValue::U32(u32::from_le_bytes(fixed(data)?)),
        ColumnType::Currency | ColumnType::LongLong => {
            TypedValue::I64(i64::from_le_bytes(fixed(data)?))
        }
        ColumnType::DateTime => TypedValue::U64(u64::from_le_bytes(fixed(data)?)),
        ColumnType::IeeeSingle => TypedValue::F32(f32::from_le_bytes(fixed(data)?)),
        ColumnType::IeeeDouble => TypedValue::F64(f64::from_le_bytes(fixed(data)?)),
        ColumnType::UnsignedByte
        | ColumnType::Binary
        | ColumnType::LongBinary
        | ColumnType::Slv
        | ColumnType::Guid
        | ColumnType::Max => TypedValue::Bytes(data.to_vec()),
        ColumnType::Text | ColumnType::LongText => TypedValue::Text(decode_text(data)?),
    };

    Ok(value)
}

/// Decodes the raw bytes of a column from its raw storage-type tag.
pub fn decode_tagged(tag: u32, data: &[u8]) -> DitResult<TypedValue> {
    decode(ColumnType::try_from(tag)?, data)
}
