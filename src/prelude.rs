//! Convenient imports for common functionality.
//!
//! This module re-exports the types most applications touch, so one `use`
//! line is enough to get started.

pub use crate::{
    AuthInfo, ClientFlags, ColumnType, ConnectOption, Connector, Driver, DriverError, Endpoint,
    Error, Executor, ExecutorBuilder, FieldInfo, Pending, Phase, ResultSet, Row,
};
