//! `ConnectOptions` (spec §3) and its builder (spec §4.9).
//!
//! The source language's keyword-list options become a frozen record plus
//! an explicit builder: every field from §3 has a builder method, there is
//! no stringly-typed "unknown option" escape hatch, and `build()` performs
//! the §4.5 step-1 validation eagerly so misconfiguration is caught before
//! any network I/O is attempted.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConnectError, ConnectResult};
use crate::token::TokenProvider;
use crate::uri::InstanceUri;

/// Authentication mode for the metadata exchange (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Authenticate with a cloud-IAM OAuth bearer token.
    Iam,
    /// Authenticate with the database's native password mechanism.
    DbNative,
}

/// Control-plane HTTPS endpoint configuration (spec §6, §4.9).
///
/// Never populated from the environment (spec §6); overriding it is how
/// tests point at a fake control plane and how regional deployments select
/// a non-default API version.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub base_url: String,
    pub api_version: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: "https://alloydb.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
        }
    }
}

/// Default I/O deadline applied per network operation (spec §3).
pub const DEFAULT_IO_DEADLINE: Duration = Duration::from_secs(30);

fn default_user_agent() -> String {
    format!("alloydb-connector-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Frozen record consumed by [`crate::Connector::connect`] (spec §3).
#[derive(Clone)]
pub struct ConnectOptions {
    pub(crate) instance_uri: InstanceUri,
    pub(crate) auth_mode: AuthMode,
    pub(crate) token_provider: Option<Arc<dyn TokenProvider>>,
    pub(crate) user_agent: String,
    pub(crate) io_deadline: Duration,
    pub(crate) control_plane: ControlPlaneConfig,
}

impl std::fmt::Debug for ConnectOptions {
    // the token provider is an opaque trait object; everything else is printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("instance_uri", &self.instance_uri)
            .field("auth_mode", &self.auth_mode)
            .field("token_provider", &self.token_provider.as_ref().map(|_| "<dyn TokenProvider>"))
            .field("user_agent", &self.user_agent)
            .field("io_deadline", &self.io_deadline)
            .field("control_plane", &self.control_plane)
            .finish()
    }
}

impl ConnectOptions {
    pub fn builder(instance_uri: InstanceUri) -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new(instance_uri)
    }

    pub fn instance_uri(&self) -> &InstanceUri {
        &self.instance_uri
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn io_deadline(&self) -> Duration {
        self.io_deadline
    }

    pub fn control_plane(&self) -> &ControlPlaneConfig {
        &self.control_plane
    }
}

/// Builder for [`ConnectOptions`]. See module docs.
pub struct ConnectOptionsBuilder {
    instance_uri: InstanceUri,
    auth_mode: AuthMode,
    token_provider: Option<Arc<dyn TokenProvider>>,
    user_agent: String,
    io_deadline: Duration,
    control_plane: ControlPlaneConfig,
}

impl ConnectOptionsBuilder {
    pub fn new(instance_uri: InstanceUri) -> Self {
        Self {
            instance_uri,
            auth_mode: AuthMode::Iam,
            token_provider: None,
            user_agent: default_user_agent(),
            io_deadline: DEFAULT_IO_DEADLINE,
            control_plane: ControlPlaneConfig::default(),
        }
    }

    pub fn auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    pub fn token_provider(mut self, token_provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn io_deadline(mut self, io_deadline: Duration) -> Self {
        self.io_deadline = io_deadline;
        self
    }

    pub fn control_plane(mut self, control_plane: ControlPlaneConfig) -> Self {
        self.control_plane = control_plane;
        self
    }

    /// Validate and freeze the options (spec §4.5 step 1).
    ///
    /// `auth_mode=Iam` with no token provider, or `auth_mode=DbNative` with
    /// one supplied, is an `InvalidConfig` error.
    pub fn build(self) -> ConnectResult<ConnectOptions> {
        match (self.auth_mode, &self.token_provider) {
            (AuthMode::Iam, None) => {
                return Err(ConnectError::InvalidConfig(
                    "auth_mode=Iam requires a token_provider".into(),
                ));
            }
            (AuthMode::DbNative, Some(_)) => {
                return Err(ConnectError::InvalidConfig(
                    "auth_mode=DbNative forbids a token_provider".into(),
                ));
            }
            _ => {}
        }

        Ok(ConnectOptions {
            instance_uri: self.instance_uri,
            auth_mode: self.auth_mode,
            token_provider: self.token_provider,
            user_agent: self.user_agent,
            io_deadline: self.io_deadline,
            control_plane: self.control_plane,
        })
    }
}
