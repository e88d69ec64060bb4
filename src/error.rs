use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("failed to load bulk copy library '{}': {detail}", path.display())]
    LibraryLoad { path: PathBuf, detail: String },

    #[error("bulk copy library '{}' does not export `{symbol}`: {detail}", path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        detail: String,
    },

    #[error("bcp_initW failed for table '{table}' (status {status})")]
    ProtocolInit { table: String, status: i16 },

    #[error("bcp_bind failed for column {column} '{name}' (status {status})")]
    ColumnBind {
        column: usize,
        name: String,
        status: i16,
    },

    #[error("bcp_sendrow failed at row {row} (status {status})")]
    RowSend { row: usize, status: i16 },

    #[error("bcp_done failed (status {status})")]
    Finalize { status: i32 },

    #[error("cursor exhausted at index {index} of {size}")]
    CursorExhausted { index: usize, size: usize },

    #[error("{operation}() is not allowed in state {state}")]
    StateOrdering {
        operation: &'static str,
        state: SessionState,
    },

    #[error("column {column} '{name}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        column: usize,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter set for table '{0}' has no columns")]
    EmptyParameterSet(String),

    #[error("invalid column '{name}': {message}")]
    InvalidColumn { name: String, message: String },

    #[error("invalid table name '{0}': contains NUL")]
    InvalidTableName(String),

    #[error("range {offset}..{offset}+{length} is outside storage of {available} bytes")]
    BufferRange {
        offset: usize,
        length: usize,
        available: usize,
    },
}

impl Error {
    /// True for both flavours of library resolution failure.
    pub fn is_library_load(&self) -> bool {
        matches!(self, Error::LibraryLoad { .. } | Error::MissingSymbol { .. })
    }
}

/// Append-only collector for failures raised while resolving a library or
/// driving a session.
///
/// The sink is passed by `&mut` into every operation that can fail natively, so
/// the single writer is always explicit. Read it once the session is finished.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: Vec<Error>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        tracing::warn!(%error, "bulk copy error recorded");
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}
