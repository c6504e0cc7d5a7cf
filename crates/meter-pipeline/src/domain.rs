//! Metric domains and the resource types they claim.
//!
//! Compute, network and storage metrics run through the same pipeline. A
//! domain only decides which samples it owns.

use serde::{Deserialize, Serialize};

/// A named partition of the pipeline that owns a set of resource types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Domain name, used as the state directory name.
    pub name: String,
    /// Resource type tags this domain accepts.
    pub resource_types: Vec<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl DomainSpec {
    /// Creates a domain spec.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, resource_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            description: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns true if this domain owns `resource_type` (case-insensitive).
    #[must_use]
    pub fn accepts(&self, resource_type: &str) -> bool {
        self.resource_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(resource_type))
    }

    /// Virtual machine metrics.
    #[must_use]
    pub fn compute() -> Self {
        Self::new("compute", ["ec2_instance", "virtual_machine"])
            .with_description("virtual machine utilization")
    }

    /// Virtual network metrics.
    #[must_use]
    pub fn network() -> Self {
        Self::new(
            "network",
            [
                "vpc",
                "nat_gateway",
                "vpn_connection",
                "vpc_endpoint",
                "transit_gateway",
            ],
        )
        .with_description("virtual network traffic")
    }

    /// Object storage metrics.
    #[must_use]
    pub fn storage() -> Self {
        Self::new("storage", ["s3_bucket", "storage_account"])
            .with_description("object storage usage")
    }

    /// The three built-in domains.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![Self::compute(), Self::network(), Self::storage()]
    }
}
