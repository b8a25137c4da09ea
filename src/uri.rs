//! `InstanceUri` / `ClusterUri` — the structured identifier AlloyDB calls
//! and the control plane are addressed by.

use crate::error::{ConnectError, ConnectResult};

/// `projects/{project}/locations/{region}/clusters/{cluster}/instances/{instance}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceUri(String);

impl InstanceUri {
    /// Parse and validate the `projects/.../instances/...` shape.
    pub fn parse(raw: impl Into<String>) -> ConnectResult<Self> {
        let raw = raw.into();
        let segments: Vec<&str> = raw.split('/').collect();

        let valid = segments.len() == 8
            && segments[0] == "projects"
            && segments[2] == "locations"
            && segments[4] == "clusters"
            && segments[6] == "instances"
            && !segments[1].is_empty()
            && !segments[3].is_empty()
            && !segments[5].is_empty()
            && !segments[7].is_empty();

        if !valid {
            return Err(ConnectError::InvalidConfig(format!(
                "instance_uri {raw:?} does not match projects/{{p}}/locations/{{r}}/clusters/{{c}}/instances/{{i}}"
            )));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the `ClusterUri` (the `clusters/{cluster}` prefix, dropping
    /// `/instances/{instance}`) used for certificate minting.
    pub fn cluster_uri(&self) -> String {
        let idx = self
            .0
            .find("/instances/")
            .expect("validated in parse: always has /instances/ suffix");
        self.0[..idx].to_string()
    }
}

impl std::fmt::Display for InstanceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for InstanceUri {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
