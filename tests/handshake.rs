//! End-to-end handshake tests against fakes: a hand-rolled HTTP control
//! plane and a `tokio-rustls` data-plane server backed by a locally
//! generated CA, exercising the scenarios spelled out for the metadata
//! exchange.
//!
//! No mocking framework is used, matching the teacher's own
//! `tests-integration/test-server` habit of hand-rolling a listener
//! instead of depending on one. The control plane actually mints a
//! certificate for whatever RSA public key the connector sends, so the
//! client's mTLS identity is a real, key-matched certificate rather than
//! a canned fixture.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloydb_connector::driver::dial_for_driver;
use alloydb_connector::options::ControlPlaneConfig;
use alloydb_connector::token::StaticTokenProvider;
use alloydb_connector::wire::{frame, ExchangeResponse, ResponseCode};
use alloydb_connector::{ConnectError, ConnectOptions, Connector, InstanceUri};
use rcgen::{CertificateParams, Certificate, KeyPair, SubjectPublicKeyInfo};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// A locally generated certificate authority used to mint both the
/// data-plane server's own certificate and, per request, a client
/// certificate for whatever public key the connector submits.
struct Ca {
    cert: Certificate,
    key: KeyPair,
}

fn generate_ca() -> Ca {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).unwrap();
    Ca { cert, key }
}

/// Mint a certificate for `public_key_pem`, signed by `ca`. This is the
/// fake's stand-in for AlloyDB's `generateClientCertificate` endpoint.
fn mint_for_public_key(ca: &Ca, public_key_pem: &str) -> String {
    let spki = SubjectPublicKeyInfo::from_pem(public_key_pem).unwrap();
    let params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let cert = params.signed_by(&spki, &ca.cert, &ca.key).unwrap();
    cert.pem()
}

/// Spawn the fake data-plane TLS server on `addr` (must include the
/// fixed proxy port). Its own server certificate is signed by `ca` but
/// is otherwise unrelated to whatever client certificate the connector
/// presents, since the fake never requests client auth.
async fn spawn_data_plane<F>(addr: SocketAddr, ca: &Ca, respond: F)
where
    F: Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
{
    let server_key = KeyPair::generate().unwrap();
    let server_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let server_cert = server_params
        .signed_by(&server_key, &ca.cert, &ca.key)
        .unwrap();

    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(server_cert.pem().as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server_key.serialize_der()));

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(stream).await.unwrap();

        let mut len_prefix = [0u8; 4];
        if tls.read_exact(&mut len_prefix).await.is_err() {
            return;
        }
        let len = u32::from_be_bytes(len_prefix) as usize;
        let mut body = vec![0u8; len];
        let _ = tls.read_exact(&mut body).await;

        let reply = respond(body);
        let _ = tls.write_all(&reply).await;
        let _ = tls.shutdown().await;
    });
}

/// Spawn the fake control-plane HTTP responder, returning its bound
/// address. `connection_info_ip` is the `ipAddress` handed back by
/// `connectionInfo`; `generateClientCertificate` mints a certificate for
/// whichever public key is actually submitted, signed by `ca`.
async fn spawn_control_plane(connection_info_ip: String, ca: Arc<Ca>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(x) => x,
                Err(_) => return,
            };
            let connection_info_ip = connection_info_ip.clone();
            let ca = ca.clone();
            tokio::spawn(async move {
                handle_control_plane_request(&mut stream, &connection_info_ip, &ca).await;
            });
        }
    });

    addr
}

async fn handle_control_plane_request(stream: &mut TcpStream, connection_info_ip: &str, ca: &Ca) {
    let mut buf = vec![0u8; 32 * 1024];
    let mut total = 0;
    let header_end = loop {
        let n = stream.read(&mut buf[total..]).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        total += n;
        if let Some(pos) = find_subslice(&buf[..total], b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = header_text
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string();
    let content_length: usize = header_text
        .lines()
        .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while total < header_end + content_length {
        let n = stream.read(&mut buf[total..]).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        total += n;
    }
    let body = &buf[header_end..header_end + content_length.min(total - header_end)];

    let response_body = if path.contains(":generateClientCertificate") {
        let request: serde_json::Value = serde_json::from_slice(body).unwrap();
        let public_key = request["publicKey"].as_str().unwrap();
        let minted_pem = mint_for_public_key(ca, public_key);
        serde_json::json!({
            "pemCertificateChain": [minted_pem],
            "caCert": ca.cert.pem(),
        })
        .to_string()
    } else {
        serde_json::json!({ "ipAddress": connection_info_ip }).to_string()
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response_body.len(),
        response_body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `connectionInfo`'s `ipAddress` is what `Connector` actually dials
/// (`{ipAddress}:5433`); `build_options` only needs the control-plane
/// address, since the data-plane fake's loopback IP is wired in through
/// `spawn_control_plane`'s `connection_info_ip` argument.
async fn build_options(control_plane_addr: SocketAddr) -> ConnectOptions {
    let instance_uri =
        InstanceUri::parse("projects/p/locations/r/clusters/c/instances/i").unwrap();
    ConnectOptions::builder(instance_uri)
        .token_provider(Arc::new(StaticTokenProvider::new("test-token")))
        .io_deadline(Duration::from_secs(5))
        .control_plane(ControlPlaneConfig {
            base_url: format!("http://{control_plane_addr}"),
            api_version: "v1".to_string(),
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn s1_happy_iam_path() {
    let ip = "127.0.0.2";
    let ca = generate_ca();

    spawn_data_plane(format!("{ip}:5433").parse().unwrap(), &ca, |_req| {
        let resp = ExchangeResponse {
            response_code: ResponseCode::Ok,
            error: String::new(),
        };
        frame(&resp.encode()).to_vec()
    })
    .await;

    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    let channel = Connector::connect(&options).await;
    assert!(channel.is_ok(), "expected success, got {:?}", channel.err());
}

#[tokio::test]
async fn driver_adapter_ignores_its_dial_target_and_forwards() {
    let ip = "127.0.0.6";
    let ca = generate_ca();

    spawn_data_plane(format!("{ip}:5433").parse().unwrap(), &ca, |_req| {
        let resp = ExchangeResponse {
            response_code: ResponseCode::Ok,
            error: String::new(),
        };
        frame(&resp.encode()).to_vec()
    })
    .await;

    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    // the driver-supplied host/port point nowhere real; the adapter must
    // still resolve and dial via the control plane, not these arguments.
    let channel = dial_for_driver("unused.invalid", 1, &options).await;
    assert!(channel.is_ok(), "expected success, got {:?}", channel.err());
}

#[tokio::test]
async fn s2_iam_rejected() {
    let ip = "127.0.0.3";
    let ca = generate_ca();

    spawn_data_plane(format!("{ip}:5433").parse().unwrap(), &ca, |_req| {
        let resp = ExchangeResponse {
            response_code: ResponseCode::Error,
            error: "permission denied".to_string(),
        };
        frame(&resp.encode()).to_vec()
    })
    .await;

    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    let err = Connector::connect(&options).await.unwrap_err();
    match err {
        ConnectError::MetadataExchangeRejected(msg) => assert_eq!(msg, "permission denied"),
        other => panic!("expected MetadataExchangeRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_before_handshake_aborts_without_dialing() {
    let ip = "127.0.0.7";
    let ca = generate_ca();

    // no data-plane server is spawned on this address at all: if the
    // connector ever tried to dial, it would fail with `DialFailed`
    // rather than `Cancelled`, proving cancellation pre-empted the dial.
    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Connector::connect_cancellable(&options, cancel)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ConnectError::Cancelled),
        "expected Cancelled, got {err:?}"
    );
}

#[tokio::test]
async fn s4_frame_oversize() {
    let ip = "127.0.0.4";
    let ca = generate_ca();

    spawn_data_plane(format!("{ip}:5433").parse().unwrap(), &ca, |_req| {
        20_000_001u32.to_be_bytes().to_vec()
    })
    .await;

    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    let err = Connector::connect(&options).await.unwrap_err();
    assert!(
        matches!(err, ConnectError::MetadataExchangeProtocolError(_)),
        "expected MetadataExchangeProtocolError, got {err:?}"
    );
}

#[tokio::test]
async fn s5_truncated_response() {
    let ip = "127.0.0.5";
    let ca = generate_ca();

    spawn_data_plane(format!("{ip}:5433").parse().unwrap(), &ca, |_req| {
        let resp = ExchangeResponse {
            response_code: ResponseCode::Ok,
            error: String::new(),
        };
        let full = frame(&resp.encode());
        // advertise the real length, then close after sending only
        // `len - 3` bytes of the body.
        full[..full.len() - 3].to_vec()
    })
    .await;

    let control_plane_addr = spawn_control_plane(ip.to_string(), Arc::new(ca)).await;
    let options = build_options(control_plane_addr).await;

    let err = Connector::connect(&options).await.unwrap_err();
    assert!(
        matches!(err, ConnectError::MetadataExchangeProtocolError(_)),
        "expected MetadataExchangeProtocolError, got {err:?}"
    );
}
