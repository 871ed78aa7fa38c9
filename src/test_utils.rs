//! Scriptable in-memory driver for tests.
//!
//! [`ScriptedDriver`] implements [`Driver`] without any server: statement
//! outcomes are scripted up front, every native call is appended to a call
//! log, and knobs exist to delay or fail individual calls. Clones share all
//! state, so a test can keep one clone for assertions while the executor owns
//! another.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::driver::{ConnectOption, Driver};
use crate::error::DriverError;
use crate::results::{ColumnType, FieldInfo};
use crate::types::{AuthInfo, ClientFlags, Endpoint};

/// One scripted result set.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResult {
    pub fields: Vec<FieldInfo>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    /// Fail the fetch after this many rows were handed out.
    pub fail_after: Option<usize>,
}

impl ScriptedResult {
    /// Result with explicit fields and rows.
    #[must_use]
    pub fn table(fields: Vec<FieldInfo>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self {
            fields,
            rows,
            fail_after: None,
        }
    }

    /// Single text column, one row per value.
    #[must_use]
    pub fn text_column(name: &str, values: &[&str]) -> Self {
        Self {
            fields: vec![FieldInfo::new(name, ColumnType::VarString, 255)],
            rows: values
                .iter()
                .map(|v| vec![Some(v.as_bytes().to_vec())])
                .collect(),
            fail_after: None,
        }
    }

    /// Result with columns but no rows.
    #[must_use]
    pub fn no_rows(fields: Vec<FieldInfo>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
            fail_after: None,
        }
    }

    #[must_use]
    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Script {
    results: Vec<ScriptedResult>,
    affected: u64,
    error: Option<DriverError>,
}

/// Native-result stand-in: field and row cursors over one scripted result.
#[derive(Debug)]
pub struct ScriptedResults {
    fields: VecDeque<FieldInfo>,
    field_count: usize,
    rows: VecDeque<Vec<Option<Vec<u8>>>>,
    row_count: u64,
    fail_after: Option<usize>,
    fetched: usize,
}

impl ScriptedResults {
    fn from_scripted(scripted: ScriptedResult) -> Self {
        Self {
            field_count: scripted.fields.len(),
            row_count: scripted.rows.len() as u64,
            fields: scripted.fields.into(),
            rows: scripted.rows.into(),
            fail_after: scripted.fail_after,
            fetched: 0,
        }
    }
}

/// Handle state for one scripted connection.
#[derive(Debug, Default)]
pub struct ScriptedHandle {
    connected: bool,
    current: Option<ScriptedResults>,
    queued: VecDeque<ScriptedResults>,
    affected: u64,
    options: Vec<ConnectOption>,
}

impl ScriptedHandle {
    /// Options applied before connect, in application order.
    #[must_use]
    pub fn options(&self) -> &[ConnectOption] {
        &self.options
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, Script>>,
    log: Mutex<Vec<String>>,
    /// `None` allows every endpoint.
    allowed: Mutex<Option<Vec<Endpoint>>>,
    connect_delay: Mutex<Option<Duration>>,
    fail_open: AtomicBool,
    init_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
    store_calls: AtomicUsize,
}

/// In-memory [`Driver`] with scripted statement outcomes.
///
/// Unscripted statements fail like a server syntax error, which doubles as
/// the bad-statement case in tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    inner: Arc<Inner>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().expect("scripted driver state lock")
    }

    fn record(&self, entry: impl Into<String>) {
        Self::lock(&self.inner.log).push(entry.into());
    }

    /// Script a statement to yield the given result sets in order.
    pub fn script_results(&self, statement: &str, results: Vec<ScriptedResult>) {
        let affected = results.last().map_or(0, |r| r.rows.len() as u64);
        Self::lock(&self.inner.scripts).insert(
            statement.to_owned(),
            Script {
                results,
                affected,
                error: None,
            },
        );
    }

    /// Script a single-result statement.
    pub fn script_select(&self, statement: &str, result: ScriptedResult) {
        self.script_results(statement, vec![result]);
    }

    /// Script a statement that produces no result set, only an affected-row
    /// count.
    pub fn script_dml(&self, statement: &str, affected: u64) {
        Self::lock(&self.inner.scripts).insert(
            statement.to_owned(),
            Script {
                results: Vec::new(),
                affected,
                error: None,
            },
        );
    }

    /// Script a statement failure.
    pub fn script_error(&self, statement: &str, code: u32, message: &str) {
        Self::lock(&self.inner.scripts).insert(
            statement.to_owned(),
            Script {
                results: Vec::new(),
                affected: 0,
                error: Some(DriverError::new(code, message)),
            },
        );
    }

    /// Restrict connects to the given endpoint; may be called repeatedly to
    /// allow several.
    pub fn allow_endpoint(&self, endpoint: Endpoint) {
        Self::lock(&self.inner.allowed)
            .get_or_insert_with(Vec::new)
            .push(endpoint);
    }

    /// Make every connect sleep first. Lets tests race a cancellation
    /// against an in-flight connect.
    pub fn delay_connects(&self, delay: Duration) {
        *Self::lock(&self.inner.connect_delay) = Some(delay);
    }

    /// Make handle allocation fail.
    pub fn fail_open(&self) {
        self.inner.fail_open.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the call log.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        Self::lock(&self.inner.log).clone()
    }

    /// Number of driver-level `store_result` calls. Eager first-result
    /// capture makes the facade's first store free; this counts the real
    /// driver calls.
    #[must_use]
    pub fn store_result_calls(&self) -> usize {
        self.inner.store_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn terminate_calls(&self) -> usize {
        self.inner.terminate_calls.load(Ordering::SeqCst)
    }
}

impl Driver for ScriptedDriver {
    type Handle = ScriptedHandle;
    type Results = ScriptedResults;

    fn initialize(&self) -> Result<(), DriverError> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        self.inner.terminate_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn open(&self) -> Result<ScriptedHandle, DriverError> {
        self.record("open");
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::new(2008, "client ran out of memory"));
        }
        Ok(ScriptedHandle::default())
    }

    fn close(&self, _handle: ScriptedHandle) {
        self.record("close");
    }

    fn set_option(
        &self,
        handle: &mut ScriptedHandle,
        option: &ConnectOption,
    ) -> Result<(), DriverError> {
        self.record(format!("set_option {option:?}"));
        handle.options.push(option.clone());
        Ok(())
    }

    fn connect(
        &self,
        handle: &mut ScriptedHandle,
        endpoint: &Endpoint,
        _auth: &AuthInfo,
        database: &str,
        _flags: ClientFlags,
    ) -> Result<(), DriverError> {
        let delay = *Self::lock(&self.inner.connect_delay);
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.record(format!("connect {endpoint}/{database}"));
        let allowed = Self::lock(&self.inner.allowed);
        if let Some(list) = allowed.as_ref() {
            if !list.contains(endpoint) {
                return Err(DriverError::new(
                    2003,
                    format!("can't connect to server on '{endpoint}'"),
                ));
            }
        }
        handle.connected = true;
        Ok(())
    }

    fn query(&self, handle: &mut ScriptedHandle, statement: &str) -> Result<(), DriverError> {
        self.record(format!("query {statement}"));
        if !handle.connected {
            return Err(DriverError::new(2006, "server has gone away"));
        }
        let script = Self::lock(&self.inner.scripts).get(statement).cloned();
        let Some(script) = script else {
            return Err(DriverError::new(
                1064,
                format!("syntax error near '{statement}'"),
            ));
        };
        if let Some(err) = script.error {
            return Err(err);
        }
        handle.affected = script.affected;
        let mut results: VecDeque<ScriptedResults> = script
            .results
            .into_iter()
            .map(ScriptedResults::from_scripted)
            .collect();
        handle.current = results.pop_front();
        handle.queued = results;
        Ok(())
    }

    fn store_result(
        &self,
        handle: &mut ScriptedHandle,
    ) -> Result<Option<ScriptedResults>, DriverError> {
        self.inner.store_calls.fetch_add(1, Ordering::SeqCst);
        self.record("store_result");
        Ok(handle.current.take())
    }

    fn has_more_results(&self, handle: &ScriptedHandle) -> bool {
        !handle.queued.is_empty()
    }

    fn next_result(&self, handle: &mut ScriptedHandle) -> Result<bool, DriverError> {
        self.record("next_result");
        handle.current = handle.queued.pop_front();
        Ok(handle.current.is_some())
    }

    fn num_rows(&self, results: &ScriptedResults) -> u64 {
        results.row_count
    }

    fn num_fields(&self, results: &ScriptedResults) -> usize {
        results.field_count
    }

    fn fetch_field(&self, results: &mut ScriptedResults) -> Option<FieldInfo> {
        results.fields.pop_front()
    }

    fn fetch_row(
        &self,
        _handle: &mut ScriptedHandle,
        results: &mut ScriptedResults,
    ) -> Result<Option<Vec<Option<Vec<u8>>>>, DriverError> {
        if let Some(limit) = results.fail_after {
            if results.fetched >= limit {
                return Err(DriverError::new(2013, "lost connection during query"));
            }
        }
        match results.rows.pop_front() {
            Some(row) => {
                results.fetched += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn affected_rows(&self, handle: &ScriptedHandle) -> u64 {
        handle.affected
    }

    fn autocommit(&self, _handle: &mut ScriptedHandle, enabled: bool) -> Result<(), DriverError> {
        self.record(format!("autocommit {enabled}"));
        Ok(())
    }

    fn commit(&self, _handle: &mut ScriptedHandle) -> Result<(), DriverError> {
        self.record("commit");
        Ok(())
    }

    fn rollback(&self, _handle: &mut ScriptedHandle) -> Result<(), DriverError> {
        self.record("rollback");
        Ok(())
    }
}
