mod common;

use std::sync::Arc;

use common::{conn, init_tracing, Call, ScriptedBcp};
use mssql_bcp::{
    bulk_copy, sys, BulkCopySession, ColumnBinding, Completion, Error, ErrorSink, ParameterSet,
    SessionState, SqlType,
};

fn three_by_two() -> ParameterSet {
    ParameterSet::new("dbo.people")
        .column(ColumnBinding::int32("id", &[1, 2, 3]).unwrap())
        .column(ColumnBinding::varchar("name", ["ann", "bo", "cyd"]).unwrap())
}

fn ints(n: i32) -> ParameterSet {
    ParameterSet::new("t").column(ColumnBinding::int32("v", &(0..n).collect::<Vec<_>>()).unwrap())
}

#[test]
fn three_rows_two_columns_all_accepted() {
    init_tracing();
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = three_by_two();

    let report = bulk_copy(conn(), &params, bcp.clone());

    assert_eq!(report.accepted_rows, 3);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.is_success());

    let calls = bcp.calls.borrow();
    assert_eq!(calls[0], Call::Init("dbo.people".into()));
    assert_eq!(
        calls[1],
        Call::Bind {
            column: 1,
            data_type: sys::SQLINT4,
            indicator_len: 0,
            data_len: 4,
        }
    );
    assert_eq!(
        calls[2],
        Call::Bind {
            column: 2,
            data_type: sys::SQLBIGVARCHAR,
            indicator_len: 8,
            data_len: sys::SQL_VARLEN_DATA,
        }
    );
    assert_eq!(&calls[3..], &[Call::SendRow, Call::SendRow, Call::SendRow, Call::Done]);

    let rows = bcp.rows.borrow();
    let expected = [(1i32, "ann"), (2, "bo"), (3, "cyd")];
    assert_eq!(rows.len(), expected.len());
    for (got, (id, name)) in rows.iter().zip(expected) {
        assert_eq!(got[0].as_deref(), Some(&id.to_ne_bytes()[..]));
        assert_eq!(got[1].as_deref(), Some(name.as_bytes()));
    }
}

#[test]
fn failing_row_stops_the_loop_and_still_finalizes() {
    init_tracing();
    let bcp = Arc::new(ScriptedBcp {
        fail_send_at: Some(2),
        ..ScriptedBcp::ok()
    });
    let params = ints(5);
    let mut session = BulkCopySession::new(conn(), &params, bcp.clone()).unwrap();
    let mut errors = ErrorSink::new();

    session.init(&mut errors).unwrap();
    session.bind(&mut errors).unwrap();
    let sent = session.insert(&mut errors).unwrap();
    assert_eq!(sent, 2);
    assert_eq!(session.state(), SessionState::Sending { aborted: true });

    let accepted = session.done(&mut errors).unwrap();
    assert_eq!(accepted, Some(2));
    assert_eq!(session.state(), SessionState::Finished(Completion::Failed));
    drop(session);

    // rows 0, 1 succeeded, row 2 failed, rows 3 and 4 never attempted
    assert_eq!(bcp.sends(), 3);
    assert_eq!(bcp.dones(), 1);
    assert_eq!(bcp.rows.borrow().len(), 2);

    let errors = errors.into_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        Error::RowSend {
            row: 2,
            status: sys::FAIL
        }
    ));
}

#[test]
fn out_of_order_calls_never_reach_native_layer() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ints(2);
    let mut session = BulkCopySession::new(conn(), &params, bcp.clone()).unwrap();
    let mut errors = ErrorSink::new();

    assert!(matches!(
        session.bind(&mut errors),
        Err(Error::StateOrdering {
            operation: "bind",
            state: SessionState::Created
        })
    ));
    assert!(matches!(
        session.insert(&mut errors),
        Err(Error::StateOrdering { operation: "insert", .. })
    ));
    assert!(matches!(
        session.done(&mut errors),
        Err(Error::StateOrdering { operation: "done", .. })
    ));
    assert!(bcp.calls.borrow().is_empty());
    assert_eq!(session.state(), SessionState::Created);

    session.init(&mut errors).unwrap();
    assert!(matches!(
        session.insert(&mut errors),
        Err(Error::StateOrdering {
            operation: "insert",
            state: SessionState::Initialized
        })
    ));
    assert!(matches!(
        session.init(&mut errors),
        Err(Error::StateOrdering { operation: "init", .. })
    ));
    assert_eq!(bcp.calls.borrow().len(), 1);
    assert!(errors.is_empty());
}

#[test]
fn done_is_accepted_exactly_once() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ints(2);
    let mut session = BulkCopySession::new(conn(), &params, bcp.clone()).unwrap();
    let mut errors = ErrorSink::new();

    session.init(&mut errors).unwrap();
    session.bind(&mut errors).unwrap();
    session.insert(&mut errors).unwrap();
    assert_eq!(session.done(&mut errors).unwrap(), Some(2));
    assert_eq!(session.state(), SessionState::Finished(Completion::Succeeded));

    assert!(matches!(
        session.done(&mut errors),
        Err(Error::StateOrdering { operation: "done", .. })
    ));
    drop(session);
    assert_eq!(bcp.dones(), 1);
}

#[test]
fn mismatched_row_counts_are_rejected_before_native_calls() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("t")
        .column(ColumnBinding::int32("a", &[1, 2, 3]).unwrap())
        .column(ColumnBinding::varbinary("b", [b"x".as_slice(), b"y"]).unwrap());

    let err = BulkCopySession::new(conn(), &params, bcp.clone()).err().unwrap();
    assert!(matches!(
        err,
        Error::RowCountMismatch {
            column: 1,
            expected: 3,
            actual: 2,
            ..
        }
    ));

    let report = bulk_copy(conn(), &params, bcp.clone());
    assert_eq!(report.accepted_rows, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(bcp.calls.borrow().is_empty());
}

#[test]
fn empty_parameter_set_is_rejected() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("t");
    assert!(matches!(
        BulkCopySession::new(conn(), &params, bcp.clone()).err(),
        Some(Error::EmptyParameterSet(_))
    ));
    assert!(bcp.calls.borrow().is_empty());
}

#[test]
fn init_failure_finishes_without_bind_or_done() {
    let bcp = Arc::new(ScriptedBcp {
        fail_init: true,
        ..ScriptedBcp::ok()
    });
    let params = three_by_two();

    let report = bulk_copy(conn(), &params, bcp.clone());

    assert_eq!(report.accepted_rows, 0);
    assert!(matches!(
        report.errors.as_slice(),
        [Error::ProtocolInit { status: sys::FAIL, .. }]
    ));
    assert_eq!(bcp.calls.borrow().len(), 1);
    assert_eq!(bcp.dones(), 0);
}

#[test]
fn bind_failure_stops_binding_and_releases_bcp_state_once() {
    let bcp = Arc::new(ScriptedBcp {
        fail_bind_at: Some(0),
        ..ScriptedBcp::ok()
    });
    let params = three_by_two();
    let mut session = BulkCopySession::new(conn(), &params, bcp.clone()).unwrap();
    let mut errors = ErrorSink::new();

    session.init(&mut errors).unwrap();
    session.bind(&mut errors).unwrap();
    assert_eq!(session.state(), SessionState::Finished(Completion::Failed));
    assert!(matches!(
        session.insert(&mut errors),
        Err(Error::StateOrdering { .. })
    ));
    assert_eq!(bcp.count(|c| matches!(c, Call::Bind { .. })), 1);
    assert_eq!(bcp.dones(), 0);

    drop(session);
    assert_eq!(bcp.dones(), 1);
    assert_eq!(bcp.sends(), 0);

    let errors = errors.into_errors();
    assert!(matches!(
        &errors[..],
        [Error::ColumnBind { column: 0, name, .. }] if name == "id"
    ));
}

#[test]
fn finalize_failure_is_reported() {
    let bcp = Arc::new(ScriptedBcp {
        done_status: Some(-1),
        ..ScriptedBcp::ok()
    });
    let params = ints(3);

    let report = bulk_copy(conn(), &params, bcp.clone());

    assert_eq!(report.accepted_rows, 0);
    assert!(matches!(
        report.errors.as_slice(),
        [Error::Finalize { status: -1 }]
    ));
    assert_eq!(bcp.sends(), 3);
    assert_eq!(bcp.dones(), 1);
}

#[test]
fn nulls_and_variable_values_are_staged_with_indicators() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("t")
        .column(
            ColumnBinding::int64("n", &[10, 20, 30])
                .unwrap()
                .with_nulls(vec![false, true, false])
                .unwrap(),
        )
        .column(ColumnBinding::varbinary("blob", [&b"\x01\x02\x03"[..], b"", b"\xff"]).unwrap())
        .column(ColumnBinding::bit("flag", &[true, false, true]).unwrap());

    let report = bulk_copy(conn(), &params, bcp.clone());
    assert_eq!(report.accepted_rows, 3);

    let binds: Vec<Call> = bcp
        .calls
        .borrow()
        .iter()
        .filter(|c| matches!(c, Call::Bind { .. }))
        .cloned()
        .collect();
    assert_eq!(
        binds[0],
        Call::Bind {
            column: 1,
            data_type: sys::SQLINT8,
            indicator_len: 8,
            data_len: sys::SQL_VARLEN_DATA,
        }
    );
    assert_eq!(
        binds[2],
        Call::Bind {
            column: 3,
            data_type: SqlType::Bit.native_code(),
            indicator_len: 0,
            data_len: 1,
        }
    );

    let rows = bcp.rows.borrow();
    assert_eq!(rows[0][0].as_deref(), Some(&10i64.to_ne_bytes()[..]));
    assert_eq!(rows[1][0], None);
    assert_eq!(rows[2][0].as_deref(), Some(&30i64.to_ne_bytes()[..]));
    // shorter value after a longer one must not leak the previous row's bytes
    assert_eq!(rows[1][1].as_deref(), Some(&b""[..]));
    assert_eq!(rows[2][1].as_deref(), Some(&b"\xff"[..]));
    assert_eq!(rows[1][2].as_deref(), Some(&[0u8][..]));
}

#[test]
fn abandoned_session_is_finalized_on_drop() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ints(4);
    {
        let mut session = BulkCopySession::new(conn(), &params, bcp.clone()).unwrap();
        let mut errors = ErrorSink::new();
        session.init(&mut errors).unwrap();
        session.bind(&mut errors).unwrap();
        session.insert(&mut errors).unwrap();
    }
    assert_eq!(bcp.sends(), 4);
    assert_eq!(bcp.dones(), 1);
}

#[test]
fn zero_rows_still_runs_the_protocol() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("t").column(ColumnBinding::int32("v", &[]).unwrap());

    let report = bulk_copy(conn(), &params, bcp.clone());

    assert_eq!(report.accepted_rows, 0);
    assert!(report.errors.is_empty());
    assert_eq!(bcp.sends(), 0);
    assert_eq!(bcp.dones(), 1);
}

#[test]
fn nvarchar_table_names_travel_as_utf16() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("dbo.Lägerbestånd")
        .column(ColumnBinding::nvarchar("n", ["ø"]).unwrap());

    let report = bulk_copy(conn(), &params, bcp.clone());

    assert!(report.is_success());
    assert_eq!(bcp.calls.borrow()[0], Call::Init("dbo.Lägerbestånd".into()));
    assert_eq!(bcp.rows.borrow()[0][0].as_deref(), Some(&[0xF8, 0x00][..]));
}

#[test]
fn interior_nul_in_table_name_is_rejected() {
    let bcp = Arc::new(ScriptedBcp::ok());
    let params = ParameterSet::new("bad\0name").column(ColumnBinding::int32("v", &[1]).unwrap());
    assert!(matches!(
        BulkCopySession::new(conn(), &params, bcp.clone()).err(),
        Some(Error::InvalidTableName(_))
    ));
}
