use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::driver::{ConnectOption, Driver};
use crate::error::{DriverError, Error};
use crate::executor::{Core, Executor};
use crate::operation::{OpKind, Operation};
use crate::results::ResultSet;
use crate::state::{Phase, Shared};
use crate::types::{AuthInfo, ClientFlags, Endpoint};

/// Outcome of an already-submitted operation.
///
/// The operation joined its connection's queue when the submitting method
/// returned; awaiting this future only waits for delivery, so several can be
/// submitted back to back and awaited in any order. Dropping it discards the
/// outcome but does not cancel the queued call.
pub struct Pending<T> {
    receiver: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The lane dropped the sender without delivering; the operation
            // can no longer complete.
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Canceled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Event-loop friendly connection over one native handle.
///
/// Synchronous methods run the blocking call on the caller's thread; the
/// `*_async` methods enqueue the call on the executor's worker lane for this
/// connection and return a [`Pending`] future. Either way at most one call
/// touches the handle at a time, and queued operations run in submission
/// order. Dropping the connector closes the handle.
pub struct Connector<D: Driver> {
    shared: Arc<Shared<D>>,
    core: Arc<Core<D>>,
}

impl<D: Driver> Connector<D> {
    /// Connection bound to one of `executor`'s worker lanes.
    #[must_use]
    pub fn new(executor: &Executor<D>) -> Self {
        let core = Arc::clone(executor.core());
        let shared = Arc::new(Shared::new(core.assign_lane()));
        Self { shared, core }
    }

    /// Allocate the native handle.
    ///
    /// # Errors
    /// [`Error::Open`] when the connection is already open or the driver
    /// cannot allocate a handle; the connection stays closed on failure.
    pub fn open(&self) -> Result<(), Error> {
        self.shared.lock().open(self.core.driver())
    }

    /// Whether the native handle exists.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.lock().handle.is_some()
    }

    /// Observable connection phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Apply a pre-connect option to the opened handle.
    ///
    /// # Errors
    /// [`Error::Connect`] when the connection is not open, is already
    /// connected, or the driver rejects the option.
    pub fn set_option(&self, option: &ConnectOption) -> Result<(), Error> {
        self.shared.lock().set_option(self.core.driver(), option)
    }

    /// Establish the session, blocking the caller.
    ///
    /// # Errors
    /// [`Error::Connect`] when the connection is not open, already has a
    /// session, or the driver cannot reach the server. The handle survives a
    /// failed attempt and may retry.
    pub fn connect(
        &self,
        endpoint: impl Into<Endpoint>,
        auth: &AuthInfo,
        database: &str,
        flags: ClientFlags,
    ) -> Result<(), Error> {
        let endpoint = endpoint.into();
        self.shared
            .lock()
            .connect(self.core.driver(), &endpoint, auth, database, flags)
    }

    /// Run one statement, blocking the caller. Results of the previous
    /// statement are released first, expiring their snapshots.
    ///
    /// # Errors
    /// [`Error::Query`] when no session exists or the statement fails; the
    /// session stays usable after a failed statement.
    pub fn query(&self, statement: &str) -> Result<(), Error> {
        self.shared.lock().query(self.core.driver(), statement)
    }

    /// Whether results remain beyond the current one.
    #[must_use]
    pub fn has_more_results(&self) -> bool {
        self.shared.lock().has_more_results(self.core.driver())
    }

    /// Materialize the current result, blocking the caller.
    ///
    /// # Errors
    /// [`Error::Result`] when no result is pending or the driver fails while
    /// handing rows over; a partial snapshot is rolled back, never returned.
    pub fn store_result(&self) -> Result<ResultSet, Error> {
        self.shared.lock().store_result(self.core.driver())
    }

    /// Run a statement and materialize its first result, blocking the caller.
    ///
    /// # Errors
    /// As [`Connector::query`] and [`Connector::store_result`].
    pub fn query_result(&self, statement: &str) -> Result<ResultSet, Error> {
        self.shared.lock().query_result(self.core.driver(), statement)
    }

    /// Rows changed or matched by the last statement; 0 when closed.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.shared.lock().affected_rows(self.core.driver())
    }

    /// Toggle session autocommit.
    ///
    /// # Errors
    /// [`Error::Query`] when no session exists or the server rejects the
    /// change.
    pub fn autocommit(&self, enabled: bool) -> Result<(), Error> {
        self.shared.lock().autocommit(self.core.driver(), enabled)
    }

    /// Commit the open transaction.
    ///
    /// # Errors
    /// [`Error::Query`] when no session exists or the commit fails.
    pub fn commit(&self) -> Result<(), Error> {
        self.shared.lock().commit(self.core.driver())
    }

    /// Roll back the open transaction.
    ///
    /// # Errors
    /// [`Error::Query`] when no session exists or the rollback fails.
    pub fn rollback(&self) -> Result<(), Error> {
        self.shared.lock().rollback(self.core.driver())
    }

    /// Run driver-level logic directly against the native handle, holding
    /// the connection lock for the duration. Escape hatch for driver
    /// capabilities the facade does not wrap.
    ///
    /// # Errors
    /// [`Error::Query`] when the connection is not open.
    pub fn with_handle<R>(&self, f: impl FnOnce(&D, &mut D::Handle) -> R) -> Result<R, Error> {
        let mut state = self.shared.lock();
        match state.handle.as_mut() {
            Some(handle) => Ok(f(self.core.driver(), handle)),
            None => Err(Error::Query(DriverError::local("connection is not open"))),
        }
    }

    /// Invalidate every outstanding asynchronous operation on this
    /// connection.
    ///
    /// Purely a generation bump: nothing blocks, an in-flight native call
    /// keeps running on its worker, and its outcome is discarded at delivery
    /// time as [`Error::Canceled`]. The connection itself stays usable.
    pub fn cancel(&self) {
        let generation = self.shared.bump_generation();
        trace!(generation, "outstanding operations canceled");
    }

    /// Close the connection: cancel outstanding operations, release retained
    /// results (expiring their snapshots), and free the handle. Idempotent.
    pub fn close(&self) {
        // Stamp first, without the lock, so an in-flight call is already
        // stale at its delivery check; then take the lock to release.
        self.shared.bump_generation();
        self.shared.lock().close(self.core.driver());
        trace!("connection closed");
    }

    fn submit<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, Error>>) -> OpKind,
    ) -> Pending<T> {
        let (tx, rx) = oneshot::channel();
        let op = Operation {
            shared: Arc::clone(&self.shared),
            generation: self.shared.generation(),
            kind: build(tx),
        };
        let lane = self.shared.lane();
        if let Err(op) = self.core.submit(lane, op) {
            // Lane thread is gone; dropping the operation drops its sender
            // and the future resolves to Canceled.
            trace!(lane, "lane unavailable, operation dropped");
            drop(op);
        }
        Pending { receiver: rx }
    }

    /// Enqueue a connect.
    ///
    /// The operation is submitted before this returns; the future resolves
    /// like [`Connector::connect`], or with [`Error::Canceled`].
    pub fn connect_async(
        &self,
        endpoint: impl Into<Endpoint>,
        auth: &AuthInfo,
        database: &str,
        flags: ClientFlags,
    ) -> Pending<()> {
        let endpoint = endpoint.into();
        let auth = auth.clone();
        let database = database.to_owned();
        self.submit(move |respond_to| OpKind::Connect {
            endpoint,
            auth,
            database,
            flags,
            respond_to,
        })
    }

    /// Enqueue one statement.
    pub fn query_async(&self, statement: impl Into<String>) -> Pending<()> {
        let statement = statement.into();
        self.submit(move |respond_to| OpKind::Query {
            statement,
            respond_to,
        })
    }

    /// Enqueue a statement sequence as one operation. Every result of each
    /// statement is drained in order and the snapshots are delivered
    /// together, all still live. The first failing statement aborts the
    /// rest.
    pub fn run_queries_async(&self, statements: Vec<String>) -> Pending<Vec<ResultSet>> {
        self.submit(move |respond_to| OpKind::RunQueries {
            statements,
            respond_to,
        })
    }

    /// Enqueue a store of the current result.
    pub fn store_result_async(&self) -> Pending<ResultSet> {
        self.submit(|respond_to| OpKind::StoreResult { respond_to })
    }

    /// Enqueue statement plus store as one operation.
    pub fn query_result_async(&self, statement: impl Into<String>) -> Pending<ResultSet> {
        let statement = statement.into();
        self.submit(move |respond_to| OpKind::QueryStoreResult {
            statement,
            respond_to,
        })
    }
}

impl<D: Driver> Drop for Connector<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Driver> fmt::Debug for Connector<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("lane", &self.shared.lane())
            .field("phase", &self.phase())
            .finish()
    }
}
