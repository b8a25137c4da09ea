//! Client-side connector that authenticates a standard PostgreSQL client to
//! an AlloyDB instance without an out-of-process auth proxy.
//!
//! The crate produces an *authenticated, pre-established transport*: a byte
//! stream that has already completed an mTLS handshake against a
//! control-plane-issued ephemeral certificate and a framed metadata
//! exchange declaring the auth mode. The surrounding PostgreSQL
//! wire-protocol driver consumes the returned [`AuthenticatedChannel`] as if
//! it were a plain TCP socket; this crate never speaks that protocol
//! itself.
//!
//! See [`Connector::connect`] for the entry point.

pub mod channel;
pub mod connector;
pub mod control_plane;
pub mod crypto;
pub mod driver;
pub mod error;
pub mod options;
pub mod token;
pub mod uri;
pub mod wire;

pub use channel::AuthenticatedChannel;
pub use connector::Connector;
pub use error::{ConnectError, ConnectResult};
pub use options::{AuthMode, ConnectOptions, ConnectOptionsBuilder, ControlPlaneConfig};
pub use token::{Token, TokenProvider};
pub use uri::InstanceUri;

/// TCP port of the AlloyDB data-plane proxy, distinct from the PostgreSQL
/// port 5432.
pub const PROXY_PORT: u16 = 5433;
