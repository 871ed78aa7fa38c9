use std::fmt;
use std::net::SocketAddr;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Where the driver should connect.
///
/// Either a TCP destination or a local socket path. Conversions exist for the
/// common representations so connect calls can take `impl Into<Endpoint>`:
/// ```rust
/// use mysql_relay::Endpoint;
///
/// let tcp: Endpoint = ("db.internal", 3306).into();
/// let parsed: Endpoint = "db.internal:3306".into();
/// assert_eq!(tcp, parsed);
///
/// let local = Endpoint::local("/run/mysqld/mysqld.sock");
/// assert_eq!(local.to_string(), "/run/mysqld/mysqld.sock");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    /// TCP destination.
    Tcp {
        /// Host name or address, passed to the driver as given.
        host: String,
        /// Server port.
        port: u16,
    },
    /// Local socket path (Unix domain socket or named pipe).
    Local {
        /// Filesystem path of the socket.
        path: String,
    },
}

impl Endpoint {
    /// Port assumed when a string form carries none.
    pub const DEFAULT_PORT: u16 = 3306;

    /// TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Local socket endpoint.
    #[must_use]
    pub fn local(path: impl Into<String>) -> Self {
        Endpoint::Local { path: path.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Local { path } => write!(f, "{path}"),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::tcp(addr.ip().to_string(), addr.port())
    }
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Endpoint::tcp(host, port)
    }
}

impl From<(String, u16)> for Endpoint {
    fn from((host, port): (String, u16)) -> Self {
        Endpoint::Tcp { host, port }
    }
}

impl From<&str> for Endpoint {
    /// Parses `host:port`; without a port the whole string is the host and
    /// [`Endpoint::DEFAULT_PORT`] applies.
    fn from(s: &str) -> Self {
        match s.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => Endpoint::tcp(host, port),
                Err(_) => Endpoint::tcp(s, Self::DEFAULT_PORT),
            },
            None => Endpoint::tcp(s, Self::DEFAULT_PORT),
        }
    }
}

/// Credentials forwarded verbatim to the driver's connect call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    user: String,
    password: Option<String>,
}

impl AuthInfo {
    /// Credentials with a password.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Some(password.into()),
        }
    }

    /// Credentials without a password.
    #[must_use]
    pub fn user_only(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: None,
        }
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Capability bits negotiated at connect time.
///
/// Thin bitset over the protocol's client flag constants; combine with `|`:
/// ```rust
/// use mysql_relay::ClientFlags;
///
/// let flags = ClientFlags::MULTI_STATEMENTS | ClientFlags::COMPRESS;
/// assert!(flags.contains(ClientFlags::MULTI_STATEMENTS));
/// assert!(!flags.contains(ClientFlags::FOUND_ROWS));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientFlags(u32);

impl ClientFlags {
    /// No capabilities requested.
    pub const NONE: ClientFlags = ClientFlags(0);
    /// Report matched rows instead of changed rows in affected-row counts.
    pub const FOUND_ROWS: ClientFlags = ClientFlags(1 << 1);
    /// Enable wire compression.
    pub const COMPRESS: ClientFlags = ClientFlags(1 << 5);
    /// Use interactive-client timeouts on the server side.
    pub const INTERACTIVE: ClientFlags = ClientFlags(1 << 10);
    /// Allow several semicolon-separated statements per query string.
    ///
    /// Also switches the connector to eager first-result capture: right after
    /// such a session runs a statement, the first result is grabbed before
    /// anything else can touch the handle.
    pub const MULTI_STATEMENTS: ClientFlags = ClientFlags(1 << 16);
    /// Announce that the client copes with multiple results per statement.
    pub const MULTI_RESULTS: ClientFlags = ClientFlags(1 << 17);

    /// Raw bit value passed to the driver.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Flags from a raw bit value.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        ClientFlags(bits)
    }

    /// `true` when every bit of `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: ClientFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ClientFlags {
    type Output = ClientFlags;

    fn bitor(self, rhs: ClientFlags) -> ClientFlags {
        ClientFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClientFlags {
    fn bitor_assign(&mut self, rhs: ClientFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ClientFlags {
    type Output = ClientFlags;

    fn bitand(self, rhs: ClientFlags) -> ClientFlags {
        ClientFlags(self.0 & rhs.0)
    }
}

impl fmt::Display for ClientFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
