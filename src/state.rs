use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::{ConnectOption, Driver};
use crate::error::{DriverError, Error};
use crate::results::{ResultAnchor, ResultSet, materialize};
use crate::types::{AuthInfo, ClientFlags, Endpoint};

/// Externally observable connection phase.
///
/// A blocking call's transient states are only ever entered while the
/// connection lock is held, so they never show up here: an observer sees the
/// phase before the call or the phase after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No native handle.
    Closed,
    /// Handle allocated, no session.
    Unconnected,
    /// Session established, no result pending.
    Connected,
    /// A statement ran and its results are not fully consumed.
    ResultPending,
}

/// A native result kept alive by the connection so snapshots can watch it.
struct RetainedResult<D: Driver> {
    _native: D::Results,
    _anchor: Arc<ResultAnchor>,
}

/// Mutable record behind one connection's lock.
pub(crate) struct ConnState<D: Driver> {
    pub(crate) handle: Option<D::Handle>,
    pub(crate) phase: Phase,
    flags: ClientFlags,
    /// First result grabbed eagerly at query time on multi-statement
    /// sessions. The flag stays set even when the statement produced no
    /// result, so the first store never issues a second driver call.
    first_result: Option<D::Results>,
    first_result_stored: bool,
    /// Results stored during the current statement run. Released at the next
    /// query-bearing operation or at close, which expires their snapshots.
    retained: Vec<RetainedResult<D>>,
}

impl<D: Driver> ConnState<D> {
    fn new() -> Self {
        Self {
            handle: None,
            phase: Phase::Closed,
            flags: ClientFlags::NONE,
            first_result: None,
            first_result_stored: false,
            retained: Vec::new(),
        }
    }

    fn has_session(&self) -> bool {
        matches!(self.phase, Phase::Connected | Phase::ResultPending)
    }

    /// Drop retained native results (expiring their snapshots) and any
    /// unconsumed eager first result.
    fn release_results(&mut self) {
        self.retained.clear();
        self.first_result = None;
        self.first_result_stored = false;
    }

    fn session_handle(&mut self) -> Result<&mut D::Handle, Error> {
        if !self.has_session() {
            return Err(Error::Query(DriverError::local(
                "connection is not established",
            )));
        }
        self.handle
            .as_mut()
            .ok_or_else(|| Error::Query(DriverError::local("connection is not established")))
    }

    pub(crate) fn open(&mut self, driver: &D) -> Result<(), Error> {
        if self.handle.is_some() {
            return Err(Error::Open(DriverError::local("connection is already open")));
        }
        let handle = driver.open().map_err(Error::Open)?;
        self.handle = Some(handle);
        self.phase = Phase::Unconnected;
        Ok(())
    }

    pub(crate) fn set_option(&mut self, driver: &D, option: &ConnectOption) -> Result<(), Error> {
        match (self.handle.as_mut(), self.phase) {
            (Some(handle), Phase::Unconnected) => {
                driver.set_option(handle, option).map_err(Error::Connect)
            }
            (Some(_), _) => Err(Error::Connect(DriverError::local(
                "options must be set before connect",
            ))),
            (None, _) => Err(Error::Connect(DriverError::local("connection is not open"))),
        }
    }

    pub(crate) fn connect(
        &mut self,
        driver: &D,
        endpoint: &Endpoint,
        auth: &AuthInfo,
        database: &str,
        flags: ClientFlags,
    ) -> Result<(), Error> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::Connect(DriverError::local("connection is not open")));
        };
        if self.phase != Phase::Unconnected {
            return Err(Error::Connect(DriverError::local(
                "session already established; close and reopen to reconnect",
            )));
        }
        driver
            .connect(handle, endpoint, auth, database, flags)
            .map_err(Error::Connect)?;
        self.flags = flags;
        self.phase = Phase::Connected;
        Ok(())
    }

    /// Run one statement, releasing the previous statement's results first.
    pub(crate) fn query(&mut self, driver: &D, statement: &str) -> Result<(), Error> {
        if !self.has_session() {
            return Err(Error::Query(DriverError::local(
                "connection is not established",
            )));
        }
        self.release_results();
        self.query_statement(driver, statement)
    }

    /// Statement run that keeps earlier retained results alive; statement
    /// sequences use it so every snapshot of the run stays live until the
    /// whole batch is delivered.
    fn query_statement(&mut self, driver: &D, statement: &str) -> Result<(), Error> {
        if !self.has_session() {
            return Err(Error::Query(DriverError::local(
                "connection is not established",
            )));
        }
        let multi = self.flags.contains(ClientFlags::MULTI_STATEMENTS);
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::Query(DriverError::local(
                "connection is not established",
            )));
        };
        if let Err(err) = driver.query(handle, statement) {
            self.phase = Phase::Connected;
            return Err(Error::Query(err));
        }
        if multi {
            // Grab the first result before anything else can touch the
            // handle; the first store consumes it without a driver call.
            match driver.store_result(handle) {
                Ok(first) => {
                    self.first_result = first;
                    self.first_result_stored = true;
                }
                Err(err) => {
                    self.phase = Phase::Connected;
                    return Err(Error::Query(err));
                }
            }
        }
        self.phase = Phase::ResultPending;
        Ok(())
    }

    /// Materialize the current result and advance past it.
    pub(crate) fn store_result(&mut self, driver: &D) -> Result<ResultSet, Error> {
        if self.phase != Phase::ResultPending {
            return Err(Error::Result(DriverError::local("no result is pending")));
        }
        let cached = if self.first_result_stored {
            self.first_result_stored = false;
            Some(self.first_result.take())
        } else {
            None
        };
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::Result(DriverError::local(
                "connection is not established",
            )));
        };
        let native = match cached {
            Some(native) => native,
            None => match driver.store_result(handle) {
                Ok(native) => native,
                Err(err) => {
                    self.phase = Phase::Connected;
                    return Err(Error::Result(err));
                }
            },
        };
        let snapshot = match native {
            None => ResultSet::empty_set(),
            Some(mut native) => {
                let anchor = Arc::new(ResultAnchor);
                match materialize(driver, handle, &mut native, Arc::downgrade(&anchor)) {
                    Ok(snapshot) => {
                        self.retained.push(RetainedResult {
                            _native: native,
                            _anchor: anchor,
                        });
                        snapshot
                    }
                    Err(err) => {
                        self.phase = Phase::Connected;
                        return Err(err);
                    }
                }
            }
        };
        if driver.has_more_results(handle) {
            match driver.next_result(handle) {
                Ok(true) => self.phase = Phase::ResultPending,
                Ok(false) => self.phase = Phase::Connected,
                Err(err) => {
                    self.phase = Phase::Connected;
                    return Err(Error::Result(err));
                }
            }
        } else {
            self.phase = Phase::Connected;
        }
        Ok(snapshot)
    }

    /// Statement plus store of its first result, as one unit.
    pub(crate) fn query_result(&mut self, driver: &D, statement: &str) -> Result<ResultSet, Error> {
        self.query(driver, statement)?;
        self.store_result(driver)
    }

    /// Run a statement sequence, draining every result of each statement in
    /// order. The first failure aborts the rest; snapshots produced before
    /// the failure are dropped with the batch. `canceled` is consulted before
    /// each statement so an abandoned sequence stops at the next boundary.
    pub(crate) fn run_queries(
        &mut self,
        driver: &D,
        statements: &[String],
        mut canceled: impl FnMut() -> bool,
    ) -> Result<Vec<ResultSet>, Error> {
        if !self.has_session() {
            return Err(Error::Query(DriverError::local(
                "connection is not established",
            )));
        }
        self.release_results();
        let mut snapshots = Vec::new();
        for statement in statements {
            if canceled() {
                return Err(Error::Canceled);
            }
            self.query_statement(driver, statement)?;
            loop {
                snapshots.push(self.store_result(driver)?);
                if self.phase != Phase::ResultPending {
                    break;
                }
            }
        }
        Ok(snapshots)
    }

    pub(crate) fn affected_rows(&self, driver: &D) -> u64 {
        match &self.handle {
            Some(handle) => driver.affected_rows(handle),
            None => 0,
        }
    }

    pub(crate) fn has_more_results(&self, driver: &D) -> bool {
        match &self.handle {
            Some(handle) => driver.has_more_results(handle),
            None => false,
        }
    }

    pub(crate) fn autocommit(&mut self, driver: &D, enabled: bool) -> Result<(), Error> {
        let handle = self.session_handle()?;
        driver.autocommit(handle, enabled).map_err(Error::Query)
    }

    pub(crate) fn commit(&mut self, driver: &D) -> Result<(), Error> {
        let handle = self.session_handle()?;
        driver.commit(handle).map_err(Error::Query)
    }

    pub(crate) fn rollback(&mut self, driver: &D) -> Result<(), Error> {
        let handle = self.session_handle()?;
        driver.rollback(handle).map_err(Error::Query)
    }

    /// Release retained results and the native handle. Idempotent.
    pub(crate) fn close(&mut self, driver: &D) {
        self.release_results();
        if let Some(handle) = self.handle.take() {
            driver.close(handle);
        }
        self.phase = Phase::Closed;
        self.flags = ClientFlags::NONE;
    }
}

/// State and generation shared by a connection's facade, its queued
/// operations, and the worker lane.
pub(crate) struct Shared<D: Driver> {
    state: Mutex<ConnState<D>>,
    /// Monotone cancellation epoch. Operations are stamped with the value
    /// current at submission and discarded once it moved on.
    generation: AtomicU64,
    lane: usize,
}

impl<D: Driver> Shared<D> {
    pub(crate) fn new(lane: usize) -> Self {
        Self {
            state: Mutex::new(ConnState::new()),
            generation: AtomicU64::new(0),
            lane,
        }
    }

    pub(crate) fn lane(&self) -> usize {
        self.lane
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ConnState<D>> {
        // Clear the poison and continue; the phase record stays coherent
        // because every transition happens before the lock is released.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Mint a new generation, invalidating operations stamped earlier.
    /// Lock-free, so it works while a blocking call is in flight.
    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_stale(&self, stamped: u64) -> bool {
        self.generation() != stamped
    }
}
