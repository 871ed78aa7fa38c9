//! Event-loop friendly bridge over synchronous MySQL-style client libraries.
//!
//! A native client handle is blocking, single threaded, and not reentrant.
//! This crate wraps such a handle behind a [`Connector`] that an async
//! application can use without stalling its event loop: blocking calls run on
//! an [`Executor`]'s dedicated worker threads, operations submitted against
//! one connection execute in submission order and never concurrently, and
//! cancellation is cooperative through generation stamps rather than by
//! interrupting native calls.
//!
//! The native library is abstracted as a [`Driver`]; anything with the usual
//! connect/query/store-result surface plugs in. Results come back as owned
//! [`ResultSet`] snapshots whose rows stay readable until the connection
//! moves on to its next statement.
//!
//! ```no_run
//! use mysql_relay::prelude::*;
//!
//! # struct StubDriver;
//! # struct StubHandle;
//! # struct StubResults;
//! # impl Driver for StubDriver {
//! #     type Handle = StubHandle;
//! #     type Results = StubResults;
//! #     fn open(&self) -> Result<StubHandle, DriverError> { Ok(StubHandle) }
//! #     fn close(&self, _handle: StubHandle) {}
//! #     fn set_option(&self, _handle: &mut StubHandle, _option: &ConnectOption) -> Result<(), DriverError> { Ok(()) }
//! #     fn connect(&self, _handle: &mut StubHandle, _endpoint: &Endpoint, _auth: &AuthInfo, _database: &str, _flags: ClientFlags) -> Result<(), DriverError> { Ok(()) }
//! #     fn query(&self, _handle: &mut StubHandle, _statement: &str) -> Result<(), DriverError> { Ok(()) }
//! #     fn store_result(&self, _handle: &mut StubHandle) -> Result<Option<StubResults>, DriverError> { Ok(None) }
//! #     fn has_more_results(&self, _handle: &StubHandle) -> bool { false }
//! #     fn next_result(&self, _handle: &mut StubHandle) -> Result<bool, DriverError> { Ok(false) }
//! #     fn num_rows(&self, _results: &StubResults) -> u64 { 0 }
//! #     fn num_fields(&self, _results: &StubResults) -> usize { 0 }
//! #     fn fetch_field(&self, _results: &mut StubResults) -> Option<FieldInfo> { None }
//! #     fn fetch_row(&self, _handle: &mut StubHandle, _results: &mut StubResults) -> Result<Option<Vec<Option<Vec<u8>>>>, DriverError> { Ok(None) }
//! #     fn affected_rows(&self, _handle: &StubHandle) -> u64 { 0 }
//! #     fn autocommit(&self, _handle: &mut StubHandle, _enabled: bool) -> Result<(), DriverError> { Ok(()) }
//! #     fn commit(&self, _handle: &mut StubHandle) -> Result<(), DriverError> { Ok(()) }
//! #     fn rollback(&self, _handle: &mut StubHandle) -> Result<(), DriverError> { Ok(()) }
//! # }
//! #
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Error> {
//! let executor = Executor::new(StubDriver)?;
//! let conn = Connector::new(&executor);
//!
//! conn.open()?;
//! conn.connect_async(
//!     ("db.internal", 3306),
//!     &AuthInfo::new("app", "secret"),
//!     "inventory",
//!     ClientFlags::MULTI_STATEMENTS,
//! )
//! .await?;
//!
//! let parts = conn.query_result_async("SELECT id, name FROM part").await?;
//! for row in parts.rows()? {
//!     println!("{:?}: {:?}", row.text(0), row.text(1));
//! }
//! conn.close();
//! # Ok(())
//! # }
//! ```

mod connector;
mod driver;
mod error;
mod executor;
mod operation;
mod results;
mod state;
mod types;

pub mod prelude;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use connector::{Connector, Pending};
pub use driver::{ConnectOption, Driver};
pub use error::{DriverError, Error};
pub use executor::{Executor, ExecutorBuilder};
pub use results::{ColumnType, FieldInfo, ResultSet, Row};
pub use state::Phase;
pub use types::{AuthInfo, ClientFlags, Endpoint};
