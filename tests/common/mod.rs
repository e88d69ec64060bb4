#![allow(dead_code)]
use std::cell::{Cell, RefCell};

use mssql_bcp::{
    sys::{self, DBINT, HDBC, INT, LPCBYTE, LPCWSTR, RETCODE},
    BcpFunctions, ConnectionHandle,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn conn() -> ConnectionHandle {
    // never dereferenced by the scripted table
    unsafe { ConnectionHandle::from_raw(0x1000 as *mut _) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init(String),
    Bind {
        column: INT,
        data_type: INT,
        indicator_len: INT,
        data_len: DBINT,
    },
    SendRow,
    Done,
}

#[derive(Clone, Copy)]
pub struct Bound {
    data: LPCBYTE,
    indicator_len: INT,
    data_len: DBINT,
}

/// Bulk copy functions that follow a script and record what the session asked for.
///
/// `send_row` reads every bound location the way the driver would, so `rows` holds exactly the
/// values that reached the "server"; `None` is a NULL.
#[derive(Default)]
pub struct ScriptedBcp {
    pub fail_init: bool,
    pub fail_bind_at: Option<usize>,
    pub fail_send_at: Option<usize>,
    pub done_status: Option<DBINT>,
    pub calls: RefCell<Vec<Call>>,
    pub rows: RefCell<Vec<Vec<Option<Vec<u8>>>>>,
    pub bound: RefCell<Vec<Bound>>,
    pub sends: Cell<usize>,
}

impl ScriptedBcp {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn sends(&self) -> usize {
        self.count(|c| *c == Call::SendRow)
    }

    pub fn dones(&self) -> usize {
        self.count(|c| *c == Call::Done)
    }
}

impl BcpFunctions for ScriptedBcp {
    unsafe fn init(&self, _conn: HDBC, table: LPCWSTR, direction: INT) -> RETCODE {
        assert_eq!(direction, sys::DB_IN);
        let mut len = 0;
        while *table.add(len) != 0 {
            len += 1;
        }
        let name = String::from_utf16_lossy(std::slice::from_raw_parts(table, len));
        self.calls.borrow_mut().push(Call::Init(name));
        if self.fail_init {
            sys::FAIL
        } else {
            sys::SUCCEED
        }
    }

    unsafe fn bind(
        &self,
        _conn: HDBC,
        data: LPCBYTE,
        indicator_len: INT,
        data_len: DBINT,
        terminator: LPCBYTE,
        terminator_len: INT,
        data_type: INT,
        server_column: INT,
    ) -> RETCODE {
        assert!(terminator.is_null());
        if indicator_len > 0 {
            assert_eq!(data as usize % std::mem::align_of::<i64>(), 0, "indicator misaligned");
        }
        assert_eq!(terminator_len, 0);
        let index = self.count(|c| matches!(c, Call::Bind { .. }));
        self.calls.borrow_mut().push(Call::Bind {
            column: server_column,
            data_type,
            indicator_len,
            data_len,
        });
        if self.fail_bind_at == Some(index) {
            return sys::FAIL;
        }
        self.bound.borrow_mut().push(Bound {
            data,
            indicator_len,
            data_len,
        });
        sys::SUCCEED
    }

    unsafe fn send_row(&self, _conn: HDBC) -> RETCODE {
        self.calls.borrow_mut().push(Call::SendRow);
        let row = self.sends.get();
        if self.fail_send_at == Some(row) {
            return sys::FAIL;
        }
        let mut values = Vec::new();
        for b in self.bound.borrow().iter() {
            let value = if b.indicator_len > 0 {
                let ind = std::ptr::read_unaligned(b.data as *const i64);
                if ind == sys::SQL_NULL_DATA {
                    None
                } else {
                    let start = b.data.add(b.indicator_len as usize);
                    Some(std::slice::from_raw_parts(start, ind as usize).to_vec())
                }
            } else {
                Some(std::slice::from_raw_parts(b.data, b.data_len as usize).to_vec())
            };
            values.push(value);
        }
        self.rows.borrow_mut().push(values);
        self.sends.set(row + 1);
        sys::SUCCEED
    }

    unsafe fn done(&self, _conn: HDBC) -> DBINT {
        self.calls.borrow_mut().push(Call::Done);
        self.done_status.unwrap_or(self.sends.get() as DBINT)
    }
}
