use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::results::FieldInfo;
use crate::types::{AuthInfo, ClientFlags, Endpoint};

/// Pre-connect knob applied through [`Driver::set_option`].
///
/// Options only make sense on an opened, not yet connected handle; the
/// connector rejects them in any other phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectOption {
    /// Overall timeout for the connect call.
    ConnectTimeout(Duration),
    /// Timeout for reads from the server.
    ReadTimeout(Duration),
    /// Timeout for writes to the server.
    WriteTimeout(Duration),
    /// Statement executed right after the session is established.
    InitCommand(String),
    /// Character set announced to the server.
    DefaultCharset(String),
}

/// Blocking contract of the native client library.
///
/// Every method may block. The connector only calls them on a worker thread,
/// or on the caller's own thread for the synchronous entry points, and always
/// under the owning connection's lock, so implementations never see two calls
/// touching the same handle at once. One driver value is shared by all
/// connections of an executor, which is why the methods take `&self` and
/// operate on handles the caller passes back in.
pub trait Driver: Send + Sync + 'static {
    /// Native connection handle, exclusively owned by one connection.
    type Handle: Send + 'static;
    /// Native result resource produced by [`Driver::store_result`].
    type Results: Send + 'static;

    /// One-time library setup; runs before any other call.
    ///
    /// # Errors
    /// Returns the driver's initialization failure; the executor refuses to
    /// start on error.
    fn initialize(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Library teardown; runs once the executor and every connection built on
    /// it are gone.
    fn terminate(&self) {}

    /// Allocate a fresh, unconnected handle.
    ///
    /// # Errors
    /// Allocation failure, typically out-of-memory in the client library.
    fn open(&self) -> Result<Self::Handle, DriverError>;

    /// Release a handle. Must accept handles that never connected.
    fn close(&self, handle: Self::Handle);

    /// Apply a pre-connect option to an opened handle.
    ///
    /// # Errors
    /// Returns the driver's rejection of the option.
    fn set_option(
        &self,
        handle: &mut Self::Handle,
        option: &ConnectOption,
    ) -> Result<(), DriverError>;

    /// Establish a session on an opened handle.
    ///
    /// # Errors
    /// Connection failure; the handle stays allocated and may retry.
    fn connect(
        &self,
        handle: &mut Self::Handle,
        endpoint: &Endpoint,
        auth: &AuthInfo,
        database: &str,
        flags: ClientFlags,
    ) -> Result<(), DriverError>;

    /// Run one statement string. With [`ClientFlags::MULTI_STATEMENTS`] the
    /// string may hold several semicolon-separated statements.
    ///
    /// # Errors
    /// Statement failure as reported by the server.
    fn query(&self, handle: &mut Self::Handle, statement: &str) -> Result<(), DriverError>;

    /// Take ownership of the current result of the last statement.
    /// `Ok(None)` when the statement produced no result set.
    ///
    /// # Errors
    /// Failure to read the result off the wire.
    fn store_result(&self, handle: &mut Self::Handle)
    -> Result<Option<Self::Results>, DriverError>;

    /// Whether results remain beyond the current one.
    fn has_more_results(&self, handle: &Self::Handle) -> bool;

    /// Advance to the next result of the current statement run. `Ok(true)`
    /// when another result is now current.
    ///
    /// # Errors
    /// Failure to advance the result stream.
    fn next_result(&self, handle: &mut Self::Handle) -> Result<bool, DriverError>;

    /// Row count of a stored result.
    fn num_rows(&self, results: &Self::Results) -> u64;

    /// Column count of a stored result.
    fn num_fields(&self, results: &Self::Results) -> usize;

    /// Yield column metadata in server order; `None` once exhausted.
    fn fetch_field(&self, results: &mut Self::Results) -> Option<FieldInfo>;

    /// Fetch the next row as owned cells, `None` cell meaning SQL NULL.
    /// `Ok(None)` once the result is exhausted.
    ///
    /// # Errors
    /// Row transfer failure, for example a connection dropped mid-fetch.
    fn fetch_row(
        &self,
        handle: &mut Self::Handle,
        results: &mut Self::Results,
    ) -> Result<Option<Vec<Option<Vec<u8>>>>, DriverError>;

    /// Rows changed or matched by the last statement.
    fn affected_rows(&self, handle: &Self::Handle) -> u64;

    /// Toggle autocommit for the session.
    ///
    /// # Errors
    /// Server rejection of the mode change.
    fn autocommit(&self, handle: &mut Self::Handle, enabled: bool) -> Result<(), DriverError>;

    /// Commit the open transaction.
    ///
    /// # Errors
    /// Commit failure as reported by the server.
    fn commit(&self, handle: &mut Self::Handle) -> Result<(), DriverError>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    /// Rollback failure as reported by the server.
    fn rollback(&self, handle: &mut Self::Handle) -> Result<(), DriverError>;
}
