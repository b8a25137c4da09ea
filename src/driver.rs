//! Driver-adapter hook (spec §4.6, §6): the thin entry point a PostgreSQL
//! driver's connection establishment calls instead of opening a raw TCP
//! socket itself.
//!
//! Grounded on the teacher's `tokio::client::PgWireClient::connect`, which
//! plays the same role for the teacher's own client: a free function a
//! caller hands a target to and gets back a connected, ready-to-use
//! channel. There is no `PgWireClient`-equivalent struct on this side to
//! hang the method off, so it stays a free function.

use tracing::debug;

use crate::channel::AuthenticatedChannel;
use crate::connector::Connector;
use crate::error::ConnectResult;
use crate::options::ConnectOptions;

/// Dial and authenticate against AlloyDB, returning a channel a driver can
/// read and write PostgreSQL protocol bytes over as if it were a plain TCP
/// connection to the database (spec §3, §4.6).
///
/// `driver_host`/`driver_port` are whatever target the driver's own
/// connection setup would otherwise have dialed; the connector ignores
/// them beyond a diagnostic log, since the real endpoint and port come
/// from the control plane (spec §4.6), not from the driver's dial
/// arguments. This is `Connector::connect` under a name shaped like a
/// driver's dial hook, so it can be wired in directly wherever a driver's
/// connection setup expects a `Future<Output = io::Result<Socket>>`-shaped
/// call.
pub async fn dial_for_driver(
    driver_host: &str,
    driver_port: u16,
    options: &ConnectOptions,
) -> ConnectResult<AuthenticatedChannel> {
    debug!(driver_host, driver_port, "ignoring driver-supplied dial target, resolving via control plane");
    Connector::connect(options).await
}
