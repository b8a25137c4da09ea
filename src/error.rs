use thiserror::Error;

/// Errors produced by [`crate::Connector::connect`] and its collaborators.
///
/// Every variant corresponds to exactly one failure category from the
/// handshake; categories are never collapsed into one another, so callers
/// can match on the kind to decide whether a retry, a config fix, or a
/// permission check is appropriate. No variant's `Display` ever includes
/// token or private key bytes.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid connect options: {0}")]
    InvalidConfig(String),

    #[error("token provider failed to produce a token: {0}")]
    TokenUnavailable(String),

    #[error("control plane returned HTTP {status}: {body_excerpt}")]
    ControlPlaneError { status: u16, body_excerpt: String },

    #[error("control plane request failed: {0}")]
    ControlPlaneTransport(#[from] reqwest::Error),

    #[error("ephemeral certificate response was invalid: {0}")]
    CertificateInvalid(String),

    #[error("connectionInfo response had no usable endpoint address")]
    NoEndpoint,

    #[error("failed to dial {0}: {1}")]
    DialFailed(String, #[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    TLSHandshakeFailed(#[from] rustls::Error),

    #[error("TLS handshake I/O error: {0}")]
    TLSHandshakeIo(std::io::Error),

    #[error("metadata exchange protocol error: {0}")]
    MetadataExchangeProtocolError(String),

    #[error("metadata exchange rejected: {0}")]
    MetadataExchangeRejected(String),

    #[error("connect was cancelled")]
    Cancelled,

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

pub type ConnectResult<T> = Result<T, ConnectError>;
