use std::time::Duration;

use mysql_relay::prelude::*;
use mysql_relay::test_utils::{ScriptedDriver, ScriptedResult};

fn rig() -> (ScriptedDriver, Connector<ScriptedDriver>) {
    let driver = ScriptedDriver::new();
    let executor = Executor::new(driver.clone()).expect("executor");
    let conn = Connector::new(&executor);
    (driver, conn)
}

fn establish(conn: &Connector<ScriptedDriver>) {
    conn.open().expect("open");
    conn.connect(
        ("db.internal", 3306),
        &AuthInfo::user_only("tester"),
        "fixtures",
        ClientFlags::NONE,
    )
    .expect("connect");
}

#[test]
fn phases_follow_the_lifecycle() {
    let (driver, conn) = rig();
    driver.script_select("SELECT 1", ScriptedResult::text_column("1", &["1"]));

    assert_eq!(conn.phase(), Phase::Closed);
    conn.open().expect("open");
    assert_eq!(conn.phase(), Phase::Unconnected);
    conn.connect(
        ("db.internal", 3306),
        &AuthInfo::user_only("tester"),
        "fixtures",
        ClientFlags::NONE,
    )
    .expect("connect");
    assert_eq!(conn.phase(), Phase::Connected);
    conn.query("SELECT 1").expect("query");
    assert_eq!(conn.phase(), Phase::ResultPending);
    conn.store_result().expect("store");
    assert_eq!(conn.phase(), Phase::Connected);
    conn.close();
    assert_eq!(conn.phase(), Phase::Closed);
}

#[test]
fn open_twice_is_rejected() {
    let (_driver, conn) = rig();
    conn.open().expect("open");
    let err = conn.open().expect_err("second open");
    assert!(matches!(err, Error::Open(_)));
    assert!(conn.is_open());
    assert_eq!(conn.phase(), Phase::Unconnected);
}

#[test]
fn connect_requires_an_open_unconnected_handle() {
    let (_driver, conn) = rig();
    let auth = AuthInfo::user_only("tester");

    let err = conn
        .connect(("db.internal", 3306), &auth, "fixtures", ClientFlags::NONE)
        .expect_err("connect before open");
    assert!(matches!(err, Error::Connect(_)));

    establish(&conn);
    let err = conn
        .connect(("db.internal", 3306), &auth, "fixtures", ClientFlags::NONE)
        .expect_err("second connect");
    assert!(matches!(err, Error::Connect(_)));
    // The session is untouched by the rejected call.
    assert_eq!(conn.phase(), Phase::Connected);
}

#[test]
fn query_requires_a_session() {
    let (_driver, conn) = rig();
    assert!(matches!(conn.query("SELECT 1"), Err(Error::Query(_))));
    conn.open().expect("open");
    assert!(matches!(conn.query("SELECT 1"), Err(Error::Query(_))));
    assert_eq!(conn.phase(), Phase::Unconnected);
}

#[test]
fn options_only_apply_before_connect() {
    let (driver, conn) = rig();
    let timeout = ConnectOption::ConnectTimeout(Duration::from_secs(5));

    let err = conn.set_option(&timeout).expect_err("not open yet");
    assert!(matches!(err, Error::Connect(_)));

    conn.open().expect("open");
    conn.set_option(&timeout).expect("option on opened handle");
    conn.set_option(&ConnectOption::InitCommand("SET NAMES utf8mb4".into()))
        .expect("second option");
    conn.connect(
        ("db.internal", 3306),
        &AuthInfo::user_only("tester"),
        "fixtures",
        ClientFlags::NONE,
    )
    .expect("connect");

    let err = conn.set_option(&timeout).expect_err("already connected");
    assert!(matches!(err, Error::Connect(_)));

    let applied = conn
        .with_handle(|_driver, handle| handle.options().len())
        .expect("handle access");
    assert_eq!(applied, 2);
    assert!(driver.calls().iter().any(|c| c.starts_with("set_option")));
}

#[test]
fn close_is_idempotent_and_reopening_works() {
    let (driver, conn) = rig();
    establish(&conn);

    conn.close();
    conn.close();
    assert_eq!(conn.phase(), Phase::Closed);
    let closes = driver.calls().iter().filter(|c| *c == "close").count();
    assert_eq!(closes, 1, "the handle is released exactly once");

    conn.open().expect("reopen");
    assert_eq!(conn.phase(), Phase::Unconnected);
}

#[test]
fn dropping_the_connector_closes_the_handle() {
    let (driver, conn) = rig();
    establish(&conn);
    drop(conn);
    assert!(driver.calls().iter().any(|c| c == "close"));
}

#[test]
fn with_handle_requires_an_open_connection() {
    let (_driver, conn) = rig();
    let err = conn
        .with_handle(|_driver, _handle| ())
        .expect_err("closed connection");
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn affected_rows_is_zero_when_closed() {
    let (_driver, conn) = rig();
    assert_eq!(conn.affected_rows(), 0);
    assert!(!conn.has_more_results());
}
