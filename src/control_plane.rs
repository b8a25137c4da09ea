//! Control-plane HTTPS client (spec §4.3, §6).
//!
//! Grounded on the teacher's `api::auth::simple_oidc_validator` module,
//! which makes the same shape of call: a `reqwest::Client` request,
//! `serde::Deserialize` response struct, and errors mapped into the crate's
//! own error type — extended here with bearer auth and a POST body.

use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectError, ConnectResult};
use crate::options::ControlPlaneConfig;
use crate::token::Token;
use crate::uri::InstanceUri;

/// One retry, jitter 0-250ms, only for transport errors and 5xx responses;
/// 4xx is never retried (spec §7's resolved open question).
const MAX_ATTEMPTS: u32 = 2;
const RETRY_JITTER_MAX_MS: u64 = 250;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionInfoResponse {
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    psc_dns_name: Option<String>,
}

/// One reachable network endpoint for an instance (spec §3).
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintCertificateRequest<'a> {
    public_key: &'a str,
    cert_duration: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintCertificateResponse {
    #[serde(default)]
    pem_certificate_chain: Vec<String>,
    #[serde(default)]
    ca_cert: String,
}

/// Ephemeral credentials minted by the control plane (spec §3; the RSA
/// private key half is generated locally by [`crate::crypto`] and never
/// sent to the control plane).
#[derive(Debug, Clone)]
pub struct MintedCertificate {
    pub cert_chain: Vec<String>,
    pub ca_cert: String,
}

/// Authenticated HTTPS client for the two control-plane operations this
/// connector needs (spec §4.3).
pub struct ControlPlaneClient {
    http: reqwest::Client,
    config: ControlPlaneConfig,
}

impl ControlPlaneClient {
    pub fn new(config: ControlPlaneConfig, request_timeout: Duration) -> ConnectResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ConnectError::ControlPlaneTransport)?;
        Ok(Self { http, config })
    }

    fn url(&self, path_and_suffix: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            path_and_suffix
        )
    }

    /// `GET {base}/{api_version}/{instance_uri}/connectionInfo` (spec §4.3).
    pub async fn get_connection_info(
        &self,
        instance_uri: &InstanceUri,
        token: &Token,
    ) -> ConnectResult<EndpointInfo> {
        let url = self.url(&format!("{}/connectionInfo", instance_uri.as_str()));

        let body: ConnectionInfoResponse = self
            .execute_with_retry(|| {
                self.http
                    .get(&url)
                    .bearer_auth(&token.token)
                    .header("Content-Type", "application/json")
            })
            .await?;

        // prefer the explicit IP over the PSC DNS name (spec §3).
        let address = body
            .ip_address
            .filter(|s| !s.is_empty())
            .or_else(|| body.psc_dns_name.filter(|s| !s.is_empty()))
            .ok_or(ConnectError::NoEndpoint)?;

        Ok(EndpointInfo { address })
    }

    /// `POST {base}/{api_version}/{cluster_uri}:generateClientCertificate`
    /// (spec §4.3). Requests the 24h cap; the server may return a shorter
    /// lifetime, which this client does not inspect — certificates are
    /// never cached or reused across `connect` calls (spec §9).
    pub async fn mint_certificate(
        &self,
        cluster_uri: &str,
        public_key_pem: &str,
        token: &Token,
    ) -> ConnectResult<MintedCertificate> {
        let url = self.url(&format!("{cluster_uri}:generateClientCertificate"));
        let payload = MintCertificateRequest {
            public_key: public_key_pem,
            cert_duration: "86400s",
        };

        let body: MintCertificateResponse = self
            .execute_with_retry(|| {
                self.http
                    .post(&url)
                    .bearer_auth(&token.token)
                    .header("Content-Type", "application/json")
                    .json(&payload)
            })
            .await?;

        if body.pem_certificate_chain.is_empty() || body.ca_cert.is_empty() {
            return Err(ConnectError::CertificateInvalid(
                "generateClientCertificate response was missing chain or caCert".into(),
            ));
        }

        Ok(MintedCertificate {
            cert_chain: body.pem_certificate_chain,
            ca_cert: body.ca_cert,
        })
    }

    /// Execute a request, retrying once with jitter on transport errors or
    /// a 5xx response. 4xx responses are returned immediately as
    /// `ControlPlaneError` and never retried.
    async fn execute_with_retry<T, F>(&self, build_request: F) -> ConnectResult<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let jitter_ms = rand::rng().random_range(0..=RETRY_JITTER_MAX_MS);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            }

            match build_request().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(ConnectError::ControlPlaneTransport);
                    }

                    let body_excerpt = response.text().await.unwrap_or_default();
                    let body_excerpt: String = body_excerpt.chars().take(512).collect();
                    let err = ConnectError::ControlPlaneError {
                        status: status.as_u16(),
                        body_excerpt,
                    };

                    if !status.is_server_error() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(ConnectError::ControlPlaneTransport(e));
                }
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }
}
