//! # mssql-bcp
//!
//! Bulk copy (BCP) into SQL Server through the native client library, plus the buffer ownership
//! rules for handing binary column values to a host runtime.
//!
//! The BCP entry points are not part of the ODBC driver manager, so they are resolved at runtime
//! from `msodbcsql` by symbol name ([`NativeFunctionTable`]). A [`BulkCopySession`] then drives
//! `bcp_initW` → `bcp_bind` → `bcp_sendrow`* → `bcp_done` over a validated [`ParameterSet`].
//!
//! ```no_run
//! use mssql_bcp::{BcpConfig, BulkCopySession, ColumnBinding, ConnectionHandle, ErrorSink, ParameterSet};
//!
//! # fn run(hdbc: *mut std::os::raw::c_void) -> mssql_bcp::Result<()> {
//! let mut errors = ErrorSink::new();
//! let Some(table) = BcpConfig::from_env().resolve(&mut errors) else {
//!     for e in errors.into_errors() {
//!         eprintln!("{e}");
//!     }
//!     return Ok(());
//! };
//!
//! let params = ParameterSet::new("dbo.readings")
//!     .column(ColumnBinding::int32("id", &[1, 2, 3])?)
//!     .column(ColumnBinding::varchar("label", ["a", "b", "c"])?);
//!
//! let conn = unsafe { ConnectionHandle::from_raw(hdbc) };
//! let report = BulkCopySession::new(conn, &params, table)?.execute();
//! println!("{} rows, {} errors", report.accepted_rows, report.errors.len());
//! # Ok(())
//! # }
//! ```
#![allow(unsafe_code)]

pub mod api;
pub mod buffer;
pub mod config;
pub mod cursor;
mod error;
pub mod params;
pub mod runtime;
pub mod session;
pub mod sys;

pub use buffer::{BinaryColumn, BufferHost, ColumnBuffer, RawBuffer};
pub use config::{BcpConfig, LibrarySelection};
pub use cursor::{RowValue, StorageCursor};
pub use error::{Error, ErrorSink, Result};
pub use params::{ColumnBinding, ColumnStorage, ParameterSet, SqlType};
pub use runtime::{
    resolve, BcpFunctions, FixedPathProvider, NativeBulkCopyProvider, NativeFunctionTable,
    ProbingProvider,
};
pub use session::{
    bulk_copy, BulkCopyReport, BulkCopySession, Completion, ConnectionHandle, SessionState,
};
