//! The bulk copy protocol state machine.
//!
//! ```text
//! Created --init()--> Initialized --bind()--> Bound --insert()--> Sending --done()--> Finished
//! ```
//!
//! Each phase is guarded. A call in the wrong state returns [`Error::StateOrdering`] without
//! touching the native layer. Native failures are appended to the caller's [`ErrorSink`] and move
//! the session to `Finished(Failed)`, except in `insert`, where a failed row ends the loop and
//! leaves the session in `Sending` so `done` can still finalize the accepted rows.
use std::{fmt, marker::PhantomData, os::raw::c_void, rc::Rc, sync::Arc};

use crate::{
    cursor::{RowValue, StorageCursor},
    error::ErrorSink,
    params::{ColumnBinding, ParameterSet},
    runtime::{BcpFunctions, NativeFunctionTable},
    sys, Error, Result,
};

/// Raw ODBC connection handle owned by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionHandle(sys::HDBC);

impl ConnectionHandle {
    /// # Safety
    ///
    /// `hdbc` must be a connected ODBC handle with bulk copy enabled (`SQL_COPT_SS_BCP`), and
    /// must outlive every session built on it.
    pub unsafe fn from_raw(hdbc: *mut c_void) -> Self {
        Self(hdbc)
    }

    pub fn as_raw(&self) -> sys::HDBC {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initialized,
    Bound,
    /// Rows were sent; `aborted` is set when a row failed and the loop stopped early.
    Sending { aborted: bool },
    Finished(Completion),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => f.write_str("Created"),
            SessionState::Initialized => f.write_str("Initialized"),
            SessionState::Bound => f.write_str("Bound"),
            SessionState::Sending { aborted: false } => f.write_str("Sending"),
            SessionState::Sending { aborted: true } => f.write_str("Sending(aborted)"),
            SessionState::Finished(Completion::Succeeded) => f.write_str("Finished(ok)"),
            SessionState::Finished(Completion::Failed) => f.write_str("Finished(failed)"),
        }
    }
}

/// Outcome of a whole bulk copy.
#[derive(Debug)]
pub struct BulkCopyReport {
    /// Rows the server reported as accepted by `bcp_done`; 0 when finalization never succeeded.
    pub accepted_rows: u64,
    pub errors: Vec<Error>,
}

impl BulkCopyReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// -------------------------- RowSlot --------------------------

/// The storage location registered with `bcp_bind` for one column.
///
/// The native side reads from this fixed address on every `bcp_sendrow`, so each row is staged
/// here first: an optional 8-byte length indicator followed by the value bytes. The slot is
/// backed by `u64` words so the indicator is read from an 8-byte aligned address.
struct RowSlot {
    words: Box<[u64]>,
    len: usize,
    indicator: bool,
}

impl RowSlot {
    fn for_column(column: &ColumnBinding) -> Self {
        let indicator = column.uses_indicator();
        let prefix = if indicator { sys::INDICATOR_LEN } else { 0 };
        let len = prefix + column.storage().max_value_len();
        Self {
            words: vec![0u64; len.div_ceil(8)].into_boxed_slice(),
            len,
            indicator,
        }
    }

    fn as_ptr(&self) -> sys::LPCBYTE {
        self.words.as_ptr().cast()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // in bounds: `words` holds at least `len` bytes, and u8 has no alignment or validity
        // requirement
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    fn indicator_len(&self) -> sys::INT {
        if self.indicator {
            sys::INDICATOR_LEN as sys::INT
        } else {
            0
        }
    }

    fn data_len(&self) -> sys::DBINT {
        if self.indicator {
            sys::SQL_VARLEN_DATA
        } else {
            self.len as sys::DBINT
        }
    }

    fn stage(&mut self, value: RowValue<'_>) {
        let indicator = self.indicator;
        let buf = self.bytes_mut();
        if !indicator {
            if let RowValue::Bytes(b) = value {
                buf[..b.len()].copy_from_slice(b);
            }
            return;
        }
        let (indicator, bytes): (i64, &[u8]) = match value {
            RowValue::Null => (sys::SQL_NULL_DATA, &[]),
            RowValue::Bytes(b) => (b.len() as i64, b),
        };
        let (head, tail) = buf.split_at_mut(sys::INDICATOR_LEN);
        head.copy_from_slice(&indicator.to_ne_bytes());
        tail[..bytes.len()].copy_from_slice(bytes);
    }
}

// -------------------------- BulkCopySession --------------------------

pub struct BulkCopySession<'p, F: BcpFunctions = NativeFunctionTable> {
    conn: ConnectionHandle,
    params: &'p ParameterSet,
    table_name: Vec<u16>,
    cursors: Vec<StorageCursor<'p>>,
    slots: Vec<RowSlot>,
    functions: Arc<F>,
    state: SessionState,
    rows: usize,
    /// `bcp_initW` succeeded and `bcp_done` has not run yet.
    native_open: bool,
    // single caller thread, like the connection handle itself
    _nosend: PhantomData<Rc<()>>,
}

impl<'p, F: BcpFunctions> BulkCopySession<'p, F> {
    /// Build cursors for every column and check they agree on the row count.
    ///
    /// No native call is made here; a rejected parameter set never reaches the driver.
    pub fn new(conn: ConnectionHandle, params: &'p ParameterSet, functions: Arc<F>) -> Result<Self> {
        let columns = params.columns();
        let Some(first) = columns.first() else {
            return Err(Error::EmptyParameterSet(params.table_name().to_string()));
        };
        let rows = first.rows();

        let cursors: Vec<StorageCursor<'p>> = columns.iter().map(ColumnBinding::cursor).collect();
        for (column, (binding, cursor)) in columns.iter().zip(&cursors).enumerate() {
            if cursor.size() != rows {
                return Err(Error::RowCountMismatch {
                    column,
                    name: binding.name().to_string(),
                    expected: rows,
                    actual: cursor.size(),
                });
            }
        }

        let table = params.table_name();
        if table.contains('\0') {
            return Err(Error::InvalidTableName(table.to_string()));
        }
        let table_name: Vec<u16> = table.encode_utf16().chain(std::iter::once(0)).collect();

        Ok(Self {
            conn,
            params,
            table_name,
            cursors,
            slots: columns.iter().map(RowSlot::for_column).collect(),
            functions,
            state: SessionState::Created,
            rows,
            native_open: false,
            _nosend: PhantomData,
        })
    }

    /// Current phase of the protocol.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Rows every column holds, as validated by [`BulkCopySession::new`].
    pub fn row_count(&self) -> usize {
        self.rows
    }

    fn ordering(&self, operation: &'static str) -> Error {
        Error::StateOrdering {
            operation,
            state: self.state,
        }
    }

    /// `bcp_initW` for the target table, direction in.
    pub fn init(&mut self, errors: &mut ErrorSink) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(self.ordering("init"));
        }
        let status = unsafe {
            self.functions
                .init(self.conn.as_raw(), self.table_name.as_ptr(), sys::DB_IN)
        };
        if status != sys::SUCCEED {
            errors.push(Error::ProtocolInit {
                table: self.params.table_name().to_string(),
                status,
            });
            self.state = SessionState::Finished(Completion::Failed);
            return Ok(());
        }
        self.native_open = true;
        self.state = SessionState::Initialized;
        tracing::debug!(table = self.params.table_name(), rows = self.rows, "bulk copy initialized");
        Ok(())
    }

    /// Register each column's row slot with `bcp_bind`, 1-based, in order.
    pub fn bind(&mut self, errors: &mut ErrorSink) -> Result<()> {
        if self.state != SessionState::Initialized {
            return Err(self.ordering("bind"));
        }
        for (column, (binding, slot)) in self.params.columns().iter().zip(&self.slots).enumerate() {
            let status = unsafe {
                self.functions.bind(
                    self.conn.as_raw(),
                    slot.as_ptr(),
                    slot.indicator_len(),
                    slot.data_len(),
                    std::ptr::null(),
                    0,
                    binding.sql_type().native_code(),
                    (column + 1) as sys::INT,
                )
            };
            if status != sys::SUCCEED {
                errors.push(Error::ColumnBind {
                    column,
                    name: binding.name().to_string(),
                    status,
                });
                self.state = SessionState::Finished(Completion::Failed);
                return Ok(());
            }
        }
        self.state = SessionState::Bound;
        Ok(())
    }

    /// Send every row, stopping at the first failure. Returns the number of rows sent.
    pub fn insert(&mut self, errors: &mut ErrorSink) -> Result<usize> {
        if self.state != SessionState::Bound {
            return Err(self.ordering("insert"));
        }
        self.state = SessionState::Sending { aborted: false };

        let mut sent = 0;
        for row in 0..self.rows {
            if let Err(e) = self.stage_current() {
                errors.push(e);
                self.state = SessionState::Sending { aborted: true };
                break;
            }
            let status = unsafe { self.functions.send_row(self.conn.as_raw()) };
            if status != sys::SUCCEED {
                errors.push(Error::RowSend { row, status });
                self.state = SessionState::Sending { aborted: true };
                break;
            }
            sent += 1;
            tracing::trace!(row, "row sent");
            if let Err(e) = self.cursors.iter_mut().try_for_each(StorageCursor::next) {
                errors.push(e);
                self.state = SessionState::Sending { aborted: true };
                break;
            }
        }
        tracing::debug!(sent, of = self.rows, "bulk copy send loop finished");
        Ok(sent)
    }

    fn stage_current(&mut self) -> Result<()> {
        for (cursor, slot) in self.cursors.iter().zip(self.slots.iter_mut()) {
            slot.stage(cursor.current()?);
        }
        Ok(())
    }

    /// `bcp_done`: finalize whatever the server accepted. Exactly once, after `insert`.
    ///
    /// Returns the accepted row count, or `None` when the driver reported failure.
    pub fn done(&mut self, errors: &mut ErrorSink) -> Result<Option<u64>> {
        let SessionState::Sending { aborted } = self.state else {
            return Err(self.ordering("done"));
        };
        let rows = unsafe { self.functions.done(self.conn.as_raw()) };
        self.native_open = false;

        if rows < 0 {
            errors.push(Error::Finalize { status: rows });
            self.state = SessionState::Finished(Completion::Failed);
            return Ok(None);
        }
        self.state = SessionState::Finished(if aborted {
            Completion::Failed
        } else {
            Completion::Succeeded
        });
        tracing::debug!(accepted = rows, state = %self.state, "bulk copy finished");
        Ok(Some(rows as u64))
    }

    /// Drive every phase and collect the outcome.
    pub fn execute(mut self) -> BulkCopyReport {
        let mut errors = ErrorSink::new();
        let accepted_rows = match self.run(&mut errors) {
            Ok(rows) => rows,
            Err(e) => {
                errors.push(e);
                0
            }
        };
        // finalizes from Drop when a phase failed after init
        drop(self);
        BulkCopyReport {
            accepted_rows,
            errors: errors.into_errors(),
        }
    }

    fn run(&mut self, errors: &mut ErrorSink) -> Result<u64> {
        self.init(errors)?;
        if self.state != SessionState::Initialized {
            return Ok(0);
        }
        self.bind(errors)?;
        if self.state != SessionState::Bound {
            return Ok(0);
        }
        self.insert(errors)?;
        Ok(self.done(errors)?.unwrap_or(0))
    }
}

impl<F: BcpFunctions> Drop for BulkCopySession<'_, F> {
    fn drop(&mut self) {
        if self.native_open {
            let rows = unsafe { self.functions.done(self.conn.as_raw()) };
            tracing::warn!(
                table = self.params.table_name(),
                state = %self.state,
                rows,
                "bulk copy session dropped before done(); finalized"
            );
        }
    }
}

/// Validate `params` and run a complete bulk copy against an already resolved table.
pub fn bulk_copy<F: BcpFunctions>(
    conn: ConnectionHandle,
    params: &ParameterSet,
    functions: Arc<F>,
) -> BulkCopyReport {
    match BulkCopySession::new(conn, params, functions) {
        Ok(session) => session.execute(),
        Err(e) => BulkCopyReport {
            accepted_rows: 0,
            errors: vec![e],
        },
    }
}
