//! RSA keypair generation and TLS material assembly (spec §4.2).
//!
//! The hostname-skipping verifier here is carried over close to verbatim
//! from the teacher crate's `tokio::client::tls::SkipHostnameVerifier`: it
//! chain-validates the server certificate against the control-plane-issued
//! CA but does not check that the certificate's subject matches the
//! endpoint, because the AlloyDB data-plane server presents an internal
//! identifier rather than the dialed IP (spec §4.2, §9).

use std::io::Cursor;
use std::sync::Arc;

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client;
use rustls::crypto::{self, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use zeroize::Zeroizing;

use crate::error::{ConnectError, ConnectResult};

const RSA_KEY_BITS: usize = 2048;

/// Freshly generated RSA-2048 keypair, PKCS8-DER private key + SPKI-PEM
/// public key (spec §4.2).
pub struct GeneratedKeyPair {
    /// PKCS8 DER encoding of the private key. Held in a zeroizing buffer
    /// between generation and hand-off into the `rustls::ClientConfig` —
    /// best-effort, per spec §5, not a hard correctness guarantee.
    pub private_key_pkcs8_der: Zeroizing<Vec<u8>>,
    pub public_key_pem: String,
}

/// Generate an RSA-2048 keypair (public exponent 65537, the `rsa` crate's
/// only supported exponent and the one the control plane expects).
pub fn generate_key_pair() -> ConnectResult<GeneratedKeyPair> {
    let mut rng = rand_core::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| ConnectError::InvalidConfig(format!("failed to generate RSA key: {e}")))?;

    let public_key_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| ConnectError::InvalidConfig(format!("failed to encode public key: {e}")))?;

    let private_key_pkcs8_der = private_key
        .to_pkcs8_der()
        .map_err(|e| ConnectError::InvalidConfig(format!("failed to encode private key: {e}")))?
        .as_bytes()
        .to_vec();

    Ok(GeneratedKeyPair {
        private_key_pkcs8_der: Zeroizing::new(private_key_pkcs8_der),
        public_key_pem,
    })
}

fn parse_cert_chain(pem: &str) -> ConnectResult<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut Cursor::new(pem.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::CertificateInvalid(format!("malformed PEM certificate: {e}")))
}

/// Assemble a `rustls::ClientConfig` from the ephemeral credentials
/// (spec §4.2):
///
/// - client identity = leaf cert (`cert_chain_pems[0]`) + any intermediates
///   + the generated private key
/// - trusted roots = `ca_pem` plus any non-leaf entries of
///   `cert_chain_pems`
/// - TLS 1.2 and 1.3 only
/// - hostname verification suppressed; chain-to-CA verification enforced
pub fn assemble_tls_material(
    private_key_pkcs8_der: &[u8],
    cert_chain_pems: &[String],
    ca_pem: &str,
) -> ConnectResult<ClientConfig> {
    if cert_chain_pems.is_empty() {
        return Err(ConnectError::CertificateInvalid(
            "certificate chain was empty".into(),
        ));
    }

    let mut client_chain = Vec::new();
    for pem in cert_chain_pems {
        client_chain.extend(parse_cert_chain(pem)?);
    }

    let private_key =
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(private_key_pkcs8_der.to_vec()));

    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(parse_cert_chain(ca_pem)?);
    if added == 0 {
        return Err(ConnectError::CertificateInvalid(
            "caCert did not contain a parsable certificate".into(),
        ));
    }
    // non-leaf entries of the returned chain (intermediates) are also
    // trusted roots for verification purposes, matching how the control
    // plane mints a short chain rooted at its own freshly issued CA.
    for pem in &cert_chain_pems[1..] {
        let (_, _) = roots.add_parsable_certificates(parse_cert_chain(pem)?);
    }

    let provider = Arc::new(crypto::aws_lc_rs::default_provider());
    let verifier = Arc::new(SkipHostnameVerifier::new_with_provider(roots, provider.clone()));

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(ConnectError::TLSHandshakeFailed)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(client_chain, private_key)
        .map_err(ConnectError::TLSHandshakeFailed)?;

    Ok(config)
}

/// A server certificate verifier that validates the certificate chain
/// against the supplied roots but skips hostname verification.
///
/// Carried over from the teacher's `SkipHostnameVerifier`, used there for
/// PostgreSQL's `verify-ca` SSL mode. Here it is the only policy offered,
/// because the AlloyDB data-plane server's certificate subject is an
/// internal UUID rather than the dialed endpoint (spec §4.2, §9) — there is
/// no hostname-checking variant to fall back to.
#[derive(Debug, Clone)]
struct SkipHostnameVerifier {
    roots: Arc<RootCertStore>,
    supported: WebPkiSupportedAlgorithms,
}

impl SkipHostnameVerifier {
    fn new_with_provider(roots: impl Into<Arc<RootCertStore>>, provider: Arc<CryptoProvider>) -> Self {
        Self {
            roots: roots.into(),
            supported: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for SkipHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let parsed = rustls::server::ParsedCertificate::try_from(end_entity)
            .map_err(|_| TlsError::InvalidCertificate(CertificateError::BadEncoding))?;

        client::verify_server_cert_signed_by_trust_anchor(
            &parsed,
            &self.roots,
            intermediates,
            now,
            self.supported.all,
        )?;

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        crypto::verify_tls12_signature(message, cert, dss, &self.supported)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        crypto::verify_tls13_signature(message, cert, dss, &self.supported)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePublicKey;

    #[test]
    fn generated_key_is_2048_bit_e65537() {
        let pair = generate_key_pair().unwrap();
        let public = rsa::RsaPublicKey::from_public_key_pem(&pair.public_key_pem).unwrap();
        assert_eq!(rsa::traits::PublicKeyParts::n(&public).bits(), 2048);
        assert_eq!(
            rsa::traits::PublicKeyParts::e(&public),
            &rsa::BigUint::from(65537u32)
        );
    }

    #[test]
    fn assemble_rejects_empty_chain() {
        let pair = generate_key_pair().unwrap();
        let err = assemble_tls_material(&pair.private_key_pkcs8_der, &[], "").unwrap_err();
        assert!(matches!(err, ConnectError::CertificateInvalid(_)));
    }
}
