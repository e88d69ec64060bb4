//! Caller-side column data for a bulk copy, validated once at construction.
use crate::{buffer::ColumnBuffer, cursor::StorageCursor, sys, Error, Result};

/// Longest value, in bytes, a non-`max` variable-length column accepts.
pub const MAX_INLINE_BYTES: usize = 8000;

/// Server column types the bulk copy path knows how to bind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    NVarChar,
}

impl SqlType {
    /// Native BCP type code passed to `bcp_bind`.
    pub fn native_code(self) -> sys::INT {
        match self {
            SqlType::Bit => sys::SQLBIT,
            SqlType::TinyInt => sys::SQLINT1,
            SqlType::SmallInt => sys::SQLINT2,
            SqlType::Int => sys::SQLINT4,
            SqlType::BigInt => sys::SQLINT8,
            SqlType::Real => sys::SQLFLT4,
            SqlType::Float => sys::SQLFLT8,
            SqlType::UniqueIdentifier => sys::SQLUNIQUEID,
            SqlType::VarBinary => sys::SQLBIGVARBINARY,
            SqlType::VarChar => sys::SQLBIGVARCHAR,
            SqlType::NVarChar => sys::SQLNVARCHAR,
        }
    }

    /// Byte width of one value, `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            SqlType::Bit | SqlType::TinyInt => Some(1),
            SqlType::SmallInt => Some(2),
            SqlType::Int | SqlType::Real => Some(4),
            SqlType::BigInt | SqlType::Float => Some(8),
            SqlType::UniqueIdentifier => Some(16),
            SqlType::VarBinary | SqlType::VarChar | SqlType::NVarChar => None,
        }
    }
}

/// Raw column bytes in one of the two layouts the cursors understand.
#[derive(Debug, Clone)]
pub enum ColumnStorage {
    /// `rows * width` contiguous bytes.
    Fixed { width: usize, bytes: Vec<u8> },
    /// Values packed back to back; row `i` is `bytes[offsets[i]..offsets[i + 1]]`.
    Variable { offsets: Vec<usize>, bytes: Vec<u8> },
}

impl ColumnStorage {
    pub fn rows(&self) -> usize {
        match self {
            ColumnStorage::Fixed { width, bytes } => bytes.len().checked_div(*width).unwrap_or(0),
            ColumnStorage::Variable { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    /// Largest single value in bytes.
    pub fn max_value_len(&self) -> usize {
        match self {
            ColumnStorage::Fixed { width, .. } => *width,
            ColumnStorage::Variable { offsets, .. } => offsets
                .windows(2)
                .map(|w| w[1] - w[0])
                .max()
                .unwrap_or(0),
        }
    }

    fn range(&self, row: usize) -> Option<(usize, usize)> {
        if row >= self.rows() {
            return None;
        }
        match self {
            ColumnStorage::Fixed { width, .. } => Some((row * width, *width)),
            ColumnStorage::Variable { offsets, .. } => {
                Some((offsets[row], offsets[row + 1] - offsets[row]))
            }
        }
    }

    /// Copy row `row` out into an independently owned buffer.
    pub fn materialize_row(&self, row: usize) -> Result<ColumnBuffer> {
        let bytes = match self {
            ColumnStorage::Fixed { bytes, .. } | ColumnStorage::Variable { bytes, .. } => bytes,
        };
        let (offset, length) = self.range(row).ok_or(Error::CursorExhausted {
            index: row,
            size: self.rows(),
        })?;
        ColumnBuffer::materialize(bytes, offset, length)
    }
}

/// One column of a [`ParameterSet`].
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    name: String,
    sql_type: SqlType,
    storage: ColumnStorage,
    nulls: Option<Vec<bool>>,
}

impl ColumnBinding {
    /// Fixed-width values already laid out in native byte order.
    pub fn fixed(name: impl Into<String>, sql_type: SqlType, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let Some(width) = sql_type.fixed_width() else {
            return Err(Error::InvalidColumn {
                name,
                message: format!("{sql_type:?} is not a fixed-width type"),
            });
        };
        if bytes.len() % width != 0 {
            return Err(Error::InvalidColumn {
                name,
                message: format!("{} bytes is not a multiple of width {width}", bytes.len()),
            });
        }
        Ok(Self {
            name,
            sql_type,
            storage: ColumnStorage::Fixed { width, bytes },
            nulls: None,
        })
    }

    /// Variable-length values, each at most [`MAX_INLINE_BYTES`].
    pub fn variable<I, B>(name: impl Into<String>, sql_type: SqlType, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let name = name.into();
        if sql_type.fixed_width().is_some() {
            return Err(Error::InvalidColumn {
                name,
                message: format!("{sql_type:?} is not a variable-length type"),
            });
        }
        let mut offsets = vec![0];
        let mut bytes = Vec::new();
        for (row, v) in values.into_iter().enumerate() {
            let v = v.as_ref();
            if v.len() > MAX_INLINE_BYTES {
                return Err(Error::InvalidColumn {
                    name,
                    message: format!(
                        "row {row} is {} bytes, limit is {MAX_INLINE_BYTES}",
                        v.len()
                    ),
                });
            }
            bytes.extend_from_slice(v);
            offsets.push(bytes.len());
        }
        Ok(Self {
            name,
            sql_type,
            storage: ColumnStorage::Variable { offsets, bytes },
            nulls: None,
        })
    }

    /// Mark rows as NULL; `nulls[i] == true` means row `i` is NULL.
    pub fn with_nulls(mut self, nulls: Vec<bool>) -> Result<Self> {
        if nulls.len() != self.storage.rows() {
            return Err(Error::InvalidColumn {
                name: self.name,
                message: format!(
                    "null bitmap has {} entries for {} rows",
                    nulls.len(),
                    self.storage.rows()
                ),
            });
        }
        self.nulls = Some(nulls);
        Ok(self)
    }

    /// `int` column from native-endian `i32` values.
    pub fn int32(name: impl Into<String>, values: &[i32]) -> Result<Self> {
        Self::fixed(
            name,
            SqlType::Int,
            values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        )
    }

    /// `bigint` column.
    pub fn int64(name: impl Into<String>, values: &[i64]) -> Result<Self> {
        Self::fixed(
            name,
            SqlType::BigInt,
            values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        )
    }

    /// `float` column.
    pub fn float64(name: impl Into<String>, values: &[f64]) -> Result<Self> {
        Self::fixed(
            name,
            SqlType::Float,
            values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        )
    }

    /// `bit` column, one byte per value.
    pub fn bit(name: impl Into<String>, values: &[bool]) -> Result<Self> {
        Self::fixed(name, SqlType::Bit, values.iter().map(|&b| b as u8).collect())
    }

    /// `varbinary` column; each value at most [`MAX_INLINE_BYTES`].
    pub fn varbinary<I, B>(name: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::variable(name, SqlType::VarBinary, values)
    }

    /// `varchar` column sent as the UTF-8 bytes of each string.
    pub fn varchar<I, S>(name: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::variable(
            name,
            SqlType::VarChar,
            values.into_iter().map(|s| s.as_ref().as_bytes().to_vec()),
        )
    }

    /// UTF-16LE encoded text.
    pub fn nvarchar<I, S>(name: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::variable(
            name,
            SqlType::NVarChar,
            values.into_iter().map(|s| {
                s.as_ref()
                    .encode_utf16()
                    .flat_map(u16::to_le_bytes)
                    .collect::<Vec<u8>>()
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn storage(&self) -> &ColumnStorage {
        &self.storage
    }

    pub fn rows(&self) -> usize {
        self.storage.rows()
    }

    pub fn is_nullable(&self) -> bool {
        self.nulls.is_some()
    }

    /// Whether values travel with a length indicator instead of a fixed width.
    pub fn uses_indicator(&self) -> bool {
        self.is_nullable() || matches!(self.storage, ColumnStorage::Variable { .. })
    }

    /// A fresh cursor positioned at row 0.
    pub fn cursor(&self) -> StorageCursor<'_> {
        let base = match &self.storage {
            ColumnStorage::Fixed { width, bytes } => StorageCursor::fixed(bytes, *width),
            ColumnStorage::Variable { offsets, bytes } => StorageCursor::variable(bytes, offsets),
        };
        match &self.nulls {
            Some(nulls) => StorageCursor::nullable(base, nulls),
            None => base,
        }
    }

    /// Copy row `row` out, `None` when the row is NULL.
    pub fn materialize_row(&self, row: usize) -> Result<Option<ColumnBuffer>> {
        if self
            .nulls
            .as_ref()
            .is_some_and(|n| n.get(row).copied().unwrap_or(false))
        {
            return Ok(None);
        }
        self.storage.materialize_row(row).map(Some)
    }
}

/// Target table plus the columns to copy into it, in server column order.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    table: String,
    columns: Vec<ColumnBinding>,
}

impl ParameterSet {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnBinding) -> Self {
        self.columns.push(column);
        self
    }

    pub fn push(&mut self, column: ColumnBinding) {
        self.columns.push(column);
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
