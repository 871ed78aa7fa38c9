use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::trace;

use crate::driver::Driver;
use crate::error::Error;
use crate::results::ResultSet;
use crate::state::{ConnState, Shared};
use crate::types::{AuthInfo, ClientFlags, Endpoint};

/// One queued unit of work: the tagged call with its owned arguments and the
/// oneshot continuation, stamped with the generation current at submission.
pub(crate) struct Operation<D: Driver> {
    pub(crate) shared: Arc<Shared<D>>,
    pub(crate) generation: u64,
    pub(crate) kind: OpKind,
}

/// The call a queued operation performs, with its response channel.
pub(crate) enum OpKind {
    Connect {
        endpoint: Endpoint,
        auth: AuthInfo,
        database: String,
        flags: ClientFlags,
        respond_to: oneshot::Sender<Result<(), Error>>,
    },
    Query {
        statement: String,
        respond_to: oneshot::Sender<Result<(), Error>>,
    },
    RunQueries {
        statements: Vec<String>,
        respond_to: oneshot::Sender<Result<Vec<ResultSet>, Error>>,
    },
    StoreResult {
        respond_to: oneshot::Sender<Result<ResultSet, Error>>,
    },
    QueryStoreResult {
        statement: String,
        respond_to: oneshot::Sender<Result<ResultSet, Error>>,
    },
}

impl<D: Driver> Operation<D> {
    /// Execute the blocking call on the worker and deliver exactly one
    /// outcome. Send failures are ignored; the caller may have dropped its
    /// future.
    pub(crate) fn run(self, driver: &D) {
        let Operation {
            shared,
            generation,
            kind,
        } = self;
        match kind {
            OpKind::Connect {
                endpoint,
                auth,
                database,
                flags,
                respond_to,
            } => {
                let outcome = execute(&shared, generation, |state| {
                    state.connect(driver, &endpoint, &auth, &database, flags)
                });
                let _ = respond_to.send(outcome);
            }
            OpKind::Query {
                statement,
                respond_to,
            } => {
                let outcome = execute(&shared, generation, |state| state.query(driver, &statement));
                let _ = respond_to.send(outcome);
            }
            OpKind::RunQueries {
                statements,
                respond_to,
            } => {
                let outcome = execute(&shared, generation, |state| {
                    state.run_queries(driver, &statements, || shared.is_stale(generation))
                });
                let _ = respond_to.send(outcome);
            }
            OpKind::StoreResult { respond_to } => {
                let outcome = execute(&shared, generation, |state| state.store_result(driver));
                let _ = respond_to.send(outcome);
            }
            OpKind::QueryStoreResult {
                statement,
                respond_to,
            } => {
                let outcome = execute(&shared, generation, |state| {
                    state.query_result(driver, &statement)
                });
                let _ = respond_to.send(outcome);
            }
        }
    }
}

/// Run `call` under the connection lock with the two-sided staleness check.
///
/// The pre-check skips work for operations canceled while queued. The
/// post-check runs after the lock is released and decides what is actually
/// delivered: a bump that lands during the native call turns the outcome into
/// [`Error::Canceled`] even if the call itself succeeded.
fn execute<D, T>(
    shared: &Shared<D>,
    generation: u64,
    call: impl FnOnce(&mut ConnState<D>) -> Result<T, Error>,
) -> Result<T, Error>
where
    D: Driver,
{
    if shared.is_stale(generation) {
        trace!(generation, "operation dropped before execution");
        return Err(Error::Canceled);
    }
    let outcome = {
        let mut state = shared.lock();
        call(&mut state)
    };
    if shared.is_stale(generation) {
        trace!(generation, "operation outcome discarded after cancellation");
        return Err(Error::Canceled);
    }
    outcome
}
