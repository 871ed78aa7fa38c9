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

fn part_rows() -> ScriptedResult {
    ScriptedResult::table(
        vec![
            FieldInfo::new("id", ColumnType::LongLong, 20),
            FieldInfo::new("name", ColumnType::VarString, 255),
        ],
        vec![
            vec![Some(b"1".to_vec()), Some(b"bolt".to_vec())],
            vec![Some(b"2".to_vec()), None],
            vec![Some(b"3".to_vec()), Some(b"nut".to_vec())],
        ],
    )
}

#[test]
fn snapshot_round_trips_rows_fields_and_nulls() {
    let (driver, conn) = rig();
    driver.script_select("SELECT id, name FROM part", part_rows());
    establish(&conn);

    let rs = conn.query_result("SELECT id, name FROM part").expect("select");
    assert_eq!(rs.len(), 3);
    assert_eq!(rs.field_count(), 2);
    assert_eq!(rs.fields()[0].name(), "id");
    assert_eq!(rs.fields()[1].column_type(), ColumnType::VarString);

    let rows = rs.rows().expect("rows");
    assert_eq!(rows[0].text(1), Some("bolt"));
    assert!(rows[1].is_null(1));
    assert_eq!(rows[2].get("name"), Some(b"nut".as_ref()));
    assert_eq!(rs[0].text(0), Some("1"));

    // Reading twice yields the same data; materialization happened once.
    let again = rs.rows().expect("rows again");
    assert_eq!(again.len(), 3);
    assert_eq!(again[0].text(1), Some("bolt"));
}

#[test]
fn next_statement_expires_earlier_snapshots() {
    let (driver, conn) = rig();
    driver.script_select("SELECT id, name FROM part", part_rows());
    driver.script_dml("DELETE FROM part", 3);
    establish(&conn);

    let rs = conn.query_result("SELECT id, name FROM part").expect("select");
    let clone = rs.clone();
    assert!(!rs.expired());

    conn.query("DELETE FROM part").expect("next statement");

    assert!(rs.expired());
    assert!(clone.expired(), "clones share the backing resource");
    assert_eq!(rs.rows(), Err(Error::ResultExpired));
    assert_eq!(rs.len(), 0);
    assert!(rs.is_empty());
    // Metadata and counts survive expiry.
    assert_eq!(rs.field_count(), 2);
    assert_eq!(rs.fields()[1].name(), "name");
    assert_eq!(rs.affected_rows(), 3);
}

#[test]
fn close_expires_snapshots() {
    let (driver, conn) = rig();
    driver.script_select("SELECT id, name FROM part", part_rows());
    establish(&conn);

    let rs = conn.query_result("SELECT id, name FROM part").expect("select");
    conn.close();

    assert!(rs.expired());
    assert_eq!(rs.rows(), Err(Error::ResultExpired));
}

#[test]
fn zero_row_results_have_no_metadata_and_never_expire_early() {
    let (driver, conn) = rig();
    driver.script_select(
        "SELECT id FROM part WHERE 0",
        ScriptedResult::no_rows(vec![FieldInfo::new("id", ColumnType::LongLong, 20)]),
    );
    driver.script_dml("DELETE FROM part", 0);
    establish(&conn);

    let rs = conn.query_result("SELECT id FROM part WHERE 0").expect("select");
    assert!(rs.is_empty());
    assert_eq!(rs.field_count(), 0, "zero-row materialization stops early");
    assert!(!rs.expired());
    assert_eq!(rs.rows().expect("live").len(), 0);

    // A result-less statement's snapshot has no backing at all, so it stays
    // readable even after close.
    let empty = conn.query_result("DELETE FROM part").expect("dml");
    conn.close();
    assert!(!empty.expired());
    assert_eq!(empty.rows().expect("still live").len(), 0);
}

#[test]
fn fetch_failure_rolls_the_snapshot_back() {
    let (driver, conn) = rig();
    driver.script_select(
        "SELECT id, name FROM part",
        part_rows().failing_after(1),
    );
    driver.script_select("SELECT 1", ScriptedResult::text_column("1", &["1"]));
    establish(&conn);

    let err = conn
        .query_result("SELECT id, name FROM part")
        .expect_err("fetch should fail");
    match &err {
        Error::Result(cause) => assert_eq!(cause.code(), 2013),
        other => panic!("expected result error, got {other:?}"),
    }

    // No partial snapshot escaped and the session still works.
    assert_eq!(conn.phase(), Phase::Connected);
    let rs = conn.query_result("SELECT 1").expect("follow-up");
    assert_eq!(rs.len(), 1);
}

#[test]
fn store_without_pending_result_fails() {
    let (_driver, conn) = rig();
    establish(&conn);

    let err = conn.store_result().expect_err("nothing pending");
    assert!(matches!(err, Error::Result(_)));
    assert_eq!(conn.phase(), Phase::Connected);
}
