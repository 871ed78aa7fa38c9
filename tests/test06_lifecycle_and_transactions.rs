use std::time::Duration;

use mysql_relay::prelude::*;
use mysql_relay::test_utils::{ScriptedDriver, ScriptedResult};

async fn establish(conn: &Connector<ScriptedDriver>) -> Result<(), Error> {
    conn.open()?;
    conn.connect_async(
        ("db.internal", 3306),
        &AuthInfo::user_only("tester"),
        "fixtures",
        ClientFlags::NONE,
    )
    .await
}

/// Lane threads finish asynchronously after the last sender drops, so give
/// teardown a moment before judging it.
fn wait_for_terminate(driver: &ScriptedDriver, expected: usize) -> bool {
    for _ in 0..100 {
        if driver.terminate_calls() == expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    driver.terminate_calls() == expected
}

#[test]
fn library_initializes_once_and_terminates_after_the_last_user() {
    let driver = ScriptedDriver::new();
    assert_eq!(driver.init_calls(), 0);

    let executor = Executor::new(driver.clone()).expect("executor");
    assert_eq!(driver.init_calls(), 1);
    assert_eq!(driver.terminate_calls(), 0);

    let conn = Connector::new(&executor);
    conn.open().expect("open");

    // Dropping the executor alone must not tear the library down while a
    // connection still uses its lanes.
    drop(executor);
    assert_eq!(driver.terminate_calls(), 0);
    conn.open().expect_err("still serviceable, just already open");

    drop(conn);
    assert!(
        wait_for_terminate(&driver, 1),
        "teardown should run once after the last user is gone"
    );
}

#[test]
fn each_executor_initializes_its_own_library_use() {
    let driver = ScriptedDriver::new();
    let first = Executor::new(driver.clone()).expect("first executor");
    let second = Executor::new(driver.clone()).expect("second executor");
    assert_eq!(driver.init_calls(), 2);
    drop(first);
    drop(second);
    assert!(wait_for_terminate(&driver, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transaction_helpers_reach_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new();
    let executor = Executor::new(driver.clone())?;
    let conn = Connector::new(&executor);
    driver.script_dml("INSERT INTO part (name) VALUES ('bolt')", 1);
    establish(&conn).await?;

    conn.autocommit(false)?;
    conn.query_async("INSERT INTO part (name) VALUES ('bolt')").await?;
    conn.store_result_async().await?;
    conn.commit()?;
    conn.rollback()?;

    let calls = driver.calls();
    assert!(calls.iter().any(|c| c == "autocommit false"));
    assert!(calls.iter().any(|c| c == "commit"));
    assert!(calls.iter().any(|c| c == "rollback"));
    Ok(())
}

#[test]
fn transaction_helpers_require_a_session() {
    let driver = ScriptedDriver::new();
    let executor = Executor::new(driver.clone()).expect("executor");
    let conn = Connector::new(&executor);

    assert!(matches!(conn.autocommit(false), Err(Error::Query(_))));
    conn.open().expect("open");
    assert!(matches!(conn.commit(), Err(Error::Query(_))));
    assert!(matches!(conn.rollback(), Err(Error::Query(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multiple_lanes_serve_multiple_connections() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new();
    driver.script_select("SELECT 1", ScriptedResult::text_column("1", &["1"]));
    let executor = ExecutorBuilder::new().workers(3).build(driver.clone())?;
    assert_eq!(executor.workers(), 3);

    let conns: Vec<Connector<ScriptedDriver>> =
        (0..3).map(|_| Connector::new(&executor)).collect();
    for conn in &conns {
        establish(conn).await?;
    }

    let pendings: Vec<Pending<ResultSet>> = conns
        .iter()
        .map(|conn| conn.query_result_async("SELECT 1"))
        .collect();
    for pending in pendings {
        assert_eq!(pending.await?.len(), 1);
    }
    Ok(())
}

#[test]
fn worker_count_is_clamped_to_at_least_one() {
    let driver = ScriptedDriver::new();
    let executor = ExecutorBuilder::new().workers(0).build(driver).expect("executor");
    assert_eq!(executor.workers(), 1);
}

#[test]
fn config_values_round_trip_through_serde() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::local("/run/mysqld/mysqld.sock");
    let json = serde_json::to_string(&endpoint)?;
    assert_eq!(serde_json::from_str::<Endpoint>(&json)?, endpoint);

    let auth = AuthInfo::new("app", "secret");
    let json = serde_json::to_string(&auth)?;
    assert_eq!(serde_json::from_str::<AuthInfo>(&json)?, auth);

    let flags = ClientFlags::MULTI_STATEMENTS | ClientFlags::FOUND_ROWS;
    let json = serde_json::to_string(&flags)?;
    assert_eq!(json, "65538");
    assert_eq!(serde_json::from_str::<ClientFlags>(&json)?, flags);

    let option = ConnectOption::ReadTimeout(Duration::from_secs(30));
    let json = serde_json::to_string(&option)?;
    assert_eq!(serde_json::from_str::<ConnectOption>(&json)?, option);
    Ok(())
}
