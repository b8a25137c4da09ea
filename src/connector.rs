//! Orchestrates the handshake (spec §4.5): resolve → mint → dial → mTLS →
//! metadata exchange → return channel.
//!
//! Grounded on the teacher's `tokio::client::PgWireClient::connect`: the
//! same overall shape (TCP connect, then an upgrade step, then a
//! response-driven loop) and its `ssl_handshake` helper for sequencing the
//! plain-TCP-then-TLS-upgrade dance, generalized from "optionally upgrade
//! to TLS" to "always mint fresh credentials and upgrade to mTLS".

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::channel::AuthenticatedChannel;
use crate::control_plane::ControlPlaneClient;
use crate::crypto;
use crate::error::{ConnectError, ConnectResult};
use crate::options::{AuthMode, ConnectOptions};
use crate::token::Token;
use crate::wire::{self, AuthType, ExchangeRequest, ExchangeResponse, ResponseCode};
use crate::PROXY_PORT;

/// Orchestrates one handshake. Stateless: nothing about a `Connector` is
/// shared across calls other than what the caller passes in via
/// `ConnectOptions` (spec §5 — no process-wide shared resources).
pub struct Connector;

impl Connector {
    /// Perform the full handshake and return an authenticated channel, or
    /// the first error encountered. Equivalent to calling
    /// [`Connector::connect_cancellable`] with a token that is never
    /// cancelled.
    pub async fn connect(options: &ConnectOptions) -> ConnectResult<AuthenticatedChannel> {
        Self::connect_cancellable(options, CancellationToken::new()).await
    }

    /// Perform the handshake, aborting whichever step is in flight if
    /// `cancel` fires (spec §5). Already-minted certificates and fetched
    /// tokens need no explicit cleanup beyond being dropped.
    #[instrument(skip(options, cancel), fields(instance_uri = %options.instance_uri()))]
    pub async fn connect_cancellable(
        options: &ConnectOptions,
        cancel: CancellationToken,
    ) -> ConnectResult<AuthenticatedChannel> {
        let deadline = options.io_deadline();

        debug!(state = "ResolvingEndpoint", "starting handshake");

        // step 2: fetch a token before any network call, iff IAM.
        let token = match options.auth_mode() {
            AuthMode::Iam => {
                let provider = options
                    .token_provider
                    .as_ref()
                    .expect("builder guarantees a provider when auth_mode=Iam");
                let fetched = race(&cancel, provider.fetch())
                    .await?
                    .map_err(|e| ConnectError::TokenUnavailable(e.to_string()))?;
                Some(fetched)
            }
            AuthMode::DbNative => None,
        };
        let empty_token = Token {
            token: String::new(),
            not_before: None,
            not_after: None,
        };
        let token_ref = token.as_ref().unwrap_or(&empty_token);

        let control_plane = ControlPlaneClient::new(options.control_plane().clone(), deadline)?;

        // step 3: resolve the instance's reachable endpoint.
        let endpoint = race(
            &cancel,
            control_plane.get_connection_info(options.instance_uri(), token_ref),
        )
        .await??;
        debug!(state = "MintingCert", endpoint = %endpoint.address, "resolved endpoint");

        // step 4: generate an ephemeral RSA keypair locally.
        let key_pair = crypto::generate_key_pair()?;

        // step 5: mint the ephemeral client certificate.
        let cluster_uri = options.instance_uri().cluster_uri();
        let minted = race(
            &cancel,
            control_plane.mint_certificate(&cluster_uri, &key_pair.public_key_pem, token_ref),
        )
        .await??;

        if cancel.is_cancelled() {
            // cancellation before step 7: no TLS handshake attempted.
            return Err(ConnectError::Cancelled);
        }

        // step 6: dial the data-plane proxy port.
        debug!(state = "Dialing", endpoint = %endpoint.address, port = PROXY_PORT, "dialing");
        let addr = format!("{}:{}", endpoint.address, PROXY_PORT);
        let tcp = race(&cancel, dial_with_deadline(&addr, deadline)).await??;

        // step 7: mTLS handshake. On failure the raw socket is dropped here
        // (closed) without ever becoming an `AuthenticatedChannel`.
        debug!(state = "TLSHandshaking", "starting TLS handshake");
        let tls_config = crypto::assemble_tls_material(
            &key_pair.private_key_pkcs8_der,
            &minted.cert_chain,
            &minted.ca_cert,
        )?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = rustls_pki_types::ServerName::try_from(endpoint.address.clone())
            .map_err(|e| {
                ConnectError::TLSHandshakeIo(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;

        let mut channel = match race(&cancel, connector.connect(server_name, tcp)).await? {
            Ok(stream) => stream,
            Err(e) => {
                warn!(state = "TLSHandshaking", error = %e, "TLS handshake failed");
                return Err(ConnectError::TLSHandshakeIo(e));
            }
        };

        // step 8-9: build, frame, and send the metadata-exchange request.
        debug!(state = "ExchangingMetadata", "sending metadata exchange request");
        let (auth_type, oauth2_token) = match options.auth_mode() {
            AuthMode::Iam => (AuthType::Iam, token_ref.token.clone()),
            AuthMode::DbNative => (AuthType::DbNative, String::new()),
        };
        let request = ExchangeRequest {
            user_agent: options.user_agent().to_string(),
            auth_type,
            oauth2_token,
        };
        let framed = wire::frame(&request.encode());

        match race(&cancel, channel.write_all(&framed)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = channel.shutdown().await;
                return Err(ConnectError::MetadataExchangeProtocolError(format!(
                    "failed to send request: {e}"
                )));
            }
            Err(cancelled) => {
                let _ = channel.shutdown().await;
                return Err(cancelled);
            }
        }

        // step 10: read and decode the response frame.
        let mut len_prefix = [0u8; 4];
        match race(&cancel, channel.read_exact(&mut len_prefix)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = channel.shutdown().await;
                return Err(ConnectError::MetadataExchangeProtocolError(format!(
                    "truncated response length: {e}"
                )));
            }
            Err(cancelled) => {
                let _ = channel.shutdown().await;
                return Err(cancelled);
            }
        }

        let body_len = match wire::decode_frame_len(len_prefix) {
            Ok(len) => len,
            Err(e) => {
                let _ = channel.shutdown().await;
                return Err(e);
            }
        };

        let mut body = vec![0u8; body_len as usize];
        match race(&cancel, channel.read_exact(&mut body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = channel.shutdown().await;
                return Err(ConnectError::MetadataExchangeProtocolError(format!(
                    "truncated response body: {e}"
                )));
            }
            Err(cancelled) => {
                let _ = channel.shutdown().await;
                return Err(cancelled);
            }
        }

        let mut body = BytesMut::from(&body[..]);
        let response = match ExchangeResponse::decode(&mut body) {
            Ok(r) => r,
            Err(e) => {
                let _ = channel.shutdown().await;
                return Err(e);
            }
        };

        // step 11: dispatch on response_code.
        match response.response_code {
            ResponseCode::Ok => {
                debug!(state = "Authenticated", "metadata exchange accepted");
                Ok(channel)
            }
            ResponseCode::Error => {
                let _ = channel.shutdown().await;
                Err(ConnectError::MetadataExchangeRejected(response.error))
            }
            ResponseCode::Unspecified => {
                let _ = channel.shutdown().await;
                Err(ConnectError::MetadataExchangeProtocolError(
                    "server returned an unspecified response code".into(),
                ))
            }
        }
    }
}

async fn dial_with_deadline(addr: &str, deadline: Duration) -> ConnectResult<TcpStream> {
    let resolved: SocketAddr = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| ConnectError::DialFailed(addr.to_string(), e))?
        .next()
        .ok_or_else(|| {
            ConnectError::DialFailed(
                addr.to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
            )
        })?;

    timeout(deadline, TcpStream::connect(resolved))
        .await
        .map_err(|_| ConnectError::DeadlineExceeded("dial"))?
        .map_err(|e| ConnectError::DialFailed(addr.to_string(), e))
}

/// Race a future against cancellation, returning `Cancelled` if the token
/// fires first (spec §5).
async fn race<F, T>(cancel: &CancellationToken, fut: F) -> ConnectResult<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectError::Cancelled),
        out = fut => Ok(out),
    }
}
