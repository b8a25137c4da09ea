//! Minimal end-to-end demonstration of `Connector::connect`: build
//! `ConnectOptions` for an AlloyDB instance and hand the resulting
//! `AuthenticatedChannel` off to a PostgreSQL driver as if it were a plain
//! TCP socket.
//!
//! Run with `cargo run --example connect -- <instance-uri> <iam-token>`.

use std::env;
use std::sync::Arc;

use alloydb_connector::driver::dial_for_driver;
use alloydb_connector::token::StaticTokenProvider;
use alloydb_connector::{AuthenticatedChannel, ConnectOptions, InstanceUri};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let instance_uri = args
        .next()
        .ok_or("usage: connect <instance-uri> <iam-token>")?;
    let token = args.next().ok_or("usage: connect <instance-uri> <iam-token>")?;

    let options = ConnectOptions::builder(InstanceUri::parse(&instance_uri)?)
        .token_provider(Arc::new(StaticTokenProvider::new(token)))
        .build()?;

    let _channel: AuthenticatedChannel = dial_for_driver("ignored", 5432, &options).await?;
    println!("connected; channel is ready to hand off to a PostgreSQL driver");

    Ok(())
}
