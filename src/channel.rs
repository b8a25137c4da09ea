//! `AuthenticatedChannel` (spec §3): the byte-stream handed back by
//! [`crate::Connector::connect`], indistinguishable to the downstream
//! PostgreSQL driver from a plain connected TCP socket.
//!
//! The teacher crate's `tokio::client::ClientSocket` is a pin-projected enum
//! over plain/TLS/unix variants, because a `PgWireClient` may or may not
//! negotiate TLS. This connector's channel is always TLS — mTLS is
//! mandatory, not negotiated — so a single type alias over
//! `tokio_rustls::client::TlsStream` replaces that enum; there is no second
//! variant to dispatch on.

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// The authenticated, already-handshaked transport returned by `connect`.
///
/// No bytes are buffered or read ahead inside this crate: the first byte
/// the caller reads through this type is the first byte the AlloyDB
/// data-plane server wrote after its metadata-exchange response frame
/// (spec §3, §4.6).
pub type AuthenticatedChannel = TlsStream<TcpStream>;
