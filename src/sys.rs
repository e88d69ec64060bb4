#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
//! Raw types and constants of the SQL Server bulk copy ABI (`sqlncli.h` / `msodbcsql.h`).
use std::os::raw::{c_int, c_short, c_void};

/// ODBC connection handle.
pub type HDBC = *mut c_void;
pub type RETCODE = c_short;
pub type DBINT = i32;
pub type INT = c_int;
pub type LPCBYTE = *const u8;
/// NUL-terminated UTF-16 string (`SQLWCHAR` is 16 bits wide on every msodbcsql platform).
pub type LPCWSTR = *const u16;

pub const SUCCEED: RETCODE = 1;
pub const FAIL: RETCODE = 0;

/// Bulk copy direction: client to server.
pub const DB_IN: INT = 1;
pub const DB_OUT: INT = 2;

/// `cbData` value telling BCP to take the length from the indicator.
pub const SQL_VARLEN_DATA: DBINT = -10;
/// Indicator value for a NULL column.
pub const SQL_NULL_DATA: i64 = -1;

/// Width of the length indicator that precedes variable or nullable data.
pub const INDICATOR_LEN: usize = std::mem::size_of::<i64>();

// Native bulk copy data types.
pub const SQLUNIQUEID: INT = 0x24;
pub const SQLINT1: INT = 0x30;
pub const SQLBIT: INT = 0x32;
pub const SQLINT2: INT = 0x34;
pub const SQLINT4: INT = 0x38;
pub const SQLFLT4: INT = 0x3B;
pub const SQLFLT8: INT = 0x3E;
pub const SQLINT8: INT = 0x7F;
pub const SQLBIGVARBINARY: INT = 0xA5;
pub const SQLBIGVARCHAR: INT = 0xA7;
pub const SQLNVARCHAR: INT = 0xE7;

pub type bcp_initW_fn = unsafe extern "C" fn(HDBC, LPCWSTR, LPCWSTR, LPCWSTR, INT) -> RETCODE;
pub type bcp_bind_fn =
    unsafe extern "C" fn(HDBC, LPCBYTE, INT, DBINT, LPCBYTE, INT, INT, INT) -> RETCODE;
pub type bcp_sendrow_fn = unsafe extern "C" fn(HDBC) -> RETCODE;
pub type bcp_done_fn = unsafe extern "C" fn(HDBC) -> DBINT;
