use crate::{Error, Result};

/// Value of one column at the cursor's current row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RowValue<'a> {
    Null,
    Bytes(&'a [u8]),
}

/// Iterator over one column's storage, advanced in lockstep with `bcp_sendrow`.
///
/// Cursors only borrow the storage they walk; building one never copies.
#[derive(Debug, Clone)]
pub enum StorageCursor<'a> {
    Fixed {
        bytes: &'a [u8],
        width: usize,
        index: usize,
    },
    Variable {
        bytes: &'a [u8],
        offsets: &'a [usize],
        index: usize,
    },
    Nullable {
        inner: Box<StorageCursor<'a>>,
        nulls: &'a [bool],
    },
}

impl<'a> StorageCursor<'a> {
    /// `bytes` holds `bytes.len() / width` values of `width` bytes each.
    pub(crate) fn fixed(bytes: &'a [u8], width: usize) -> Self {
        StorageCursor::Fixed {
            bytes,
            width,
            index: 0,
        }
    }

    /// Row `i` is `bytes[offsets[i]..offsets[i + 1]]`.
    pub(crate) fn variable(bytes: &'a [u8], offsets: &'a [usize]) -> Self {
        StorageCursor::Variable {
            bytes,
            offsets,
            index: 0,
        }
    }

    /// Wrap `inner` so rows flagged in `nulls` read as [`RowValue::Null`].
    pub(crate) fn nullable(inner: StorageCursor<'a>, nulls: &'a [bool]) -> Self {
        StorageCursor::Nullable {
            inner: Box::new(inner),
            nulls,
        }
    }

    /// Number of rows. A zero width holds none; a nullable cursor ends where its flags end.
    pub fn size(&self) -> usize {
        match self {
            StorageCursor::Fixed { bytes, width, .. } => {
                bytes.len().checked_div(*width).unwrap_or(0)
            }
            StorageCursor::Variable { offsets, .. } => offsets.len().saturating_sub(1),
            StorageCursor::Nullable { inner, nulls } => inner.size().min(nulls.len()),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            StorageCursor::Fixed { index, .. } | StorageCursor::Variable { index, .. } => *index,
            StorageCursor::Nullable { inner, .. } => inner.index(),
        }
    }

    /// The value at the current row.
    pub fn current(&self) -> Result<RowValue<'a>> {
        let (index, size) = (self.index(), self.size());
        if index >= size {
            return Err(Error::CursorExhausted { index, size });
        }
        Ok(match self {
            &StorageCursor::Fixed {
                bytes,
                width,
                index,
            } => RowValue::Bytes(&bytes[index * width..(index + 1) * width]),
            &StorageCursor::Variable {
                bytes,
                offsets,
                index,
            } => RowValue::Bytes(&bytes[offsets[index]..offsets[index + 1]]),
            StorageCursor::Nullable { inner, nulls } => {
                if nulls[index] {
                    RowValue::Null
                } else {
                    inner.current()?
                }
            }
        })
    }

    /// Advance one row. Fails once the cursor already sits past the last row.
    pub fn next(&mut self) -> Result<()> {
        let size = self.size();
        match self {
            StorageCursor::Fixed { index, .. } | StorageCursor::Variable { index, .. } => {
                if *index >= size {
                    return Err(Error::CursorExhausted {
                        index: *index,
                        size,
                    });
                }
                *index += 1;
                Ok(())
            }
            StorageCursor::Nullable { inner, .. } => {
                let index = inner.index();
                if index >= size {
                    return Err(Error::CursorExhausted { index, size });
                }
                inner.next()
            }
        }
    }
}
