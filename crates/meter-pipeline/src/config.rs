//! Pipeline configuration.
//!
//! A warehouse is built from one [`PipelineConfig`]:
//! - the tenant whose state it owns
//! - where snapshots live
//! - the default query window
//! - the domains and the resource types each one claims

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::DomainSpec;
use crate::error::{PipelineError, Result};

/// Default tenant name.
pub const DEFAULT_TENANT: &str = "default";
/// Default state directory.
pub const DEFAULT_STATE_DIR: &str = ".cloudmeter";
/// Default query window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;
/// Largest accepted query window in days.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Main pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tenant name. Lower-cased on load.
    pub tenant: String,
    /// Root directory for snapshots.
    pub state_dir: PathBuf,
    /// Window used by queries that give no explicit range.
    pub default_window_days: u32,
    /// Configured domains.
    pub domains: Vec<DomainSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            default_window_days: DEFAULT_WINDOW_DAYS,
            domains: DomainSpec::builtin(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PipelineError::InvalidConfig {
                reason: format!(
                    "failed to read config file '{}': {e}",
                    path.as_ref().display()
                ),
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| PipelineError::InvalidConfig {
            reason: format!("invalid TOML: {e}"),
        })?;

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Replaces the tenant, lower-casing it.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into().to_lowercase();
        self
    }

    /// Replaces the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    /// Directory holding one domain's snapshots for this tenant.
    #[must_use]
    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.state_dir.join(&self.tenant).join(domain)
    }

    fn normalized(mut self) -> Self {
        self.tenant = self.tenant.to_lowercase();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.tenant.is_empty() {
            return Err(invalid("tenant cannot be empty"));
        }

        if !is_path_component(&self.tenant) {
            return Err(invalid(
                "tenant must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }

        if self.default_window_days == 0 {
            return Err(invalid("default_window_days must be greater than 0"));
        }

        if self.default_window_days > MAX_WINDOW_DAYS {
            return Err(invalid(&format!(
                "default_window_days must be at most {MAX_WINDOW_DAYS}"
            )));
        }

        if self.domains.is_empty() {
            return Err(invalid("at least one domain must be configured"));
        }

        let mut names = HashSet::new();
        let mut claimed = HashSet::new();
        for domain in &self.domains {
            if domain.name.is_empty() {
                return Err(invalid("domain name cannot be empty"));
            }
            if !is_path_component(&domain.name) {
                return Err(invalid(&format!(
                    "domain '{}' must contain only alphanumeric characters, hyphens, and underscores",
                    domain.name
                )));
            }
            if !names.insert(domain.name.to_lowercase()) {
                return Err(invalid(&format!("duplicate domain '{}'", domain.name)));
            }
            for resource_type in &domain.resource_types {
                if !claimed.insert(resource_type.to_lowercase()) {
                    return Err(invalid(&format!(
                        "resource type '{resource_type}' is claimed by more than one domain"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Tenant and domain names become directory names under the state dir.
fn is_path_component(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn invalid(reason: &str) -> PipelineError {
    PipelineError::InvalidConfig {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn empty_document_uses_defaults() {
            let config = PipelineConfig::from_toml("").expect("parse");
            assert_eq!(config, PipelineConfig::default());
            assert_eq!(config.domains.len(), 3);
        }

        #[test]
        fn tenant_is_lower_cased() {
            let config = PipelineConfig::from_toml("tenant = \"ACME\"").expect("parse");
            assert_eq!(config.tenant, "acme");
            assert_eq!(
                config.domain_dir("compute"),
                PathBuf::from(DEFAULT_STATE_DIR).join("acme").join("compute")
            );
        }

        #[test]
        fn custom_domains_replace_builtins() {
            let toml = r#"
                tenant = "acme"
                state_dir = "/var/lib/cloudmeter"
                default_window_days = 30

                [[domains]]
                name = "compute"
                resource_types = ["ec2_instance"]

                [[domains]]
                name = "gpu"
                resource_types = ["gpu_node"]
                description = "accelerators"
            "#;
            let config = PipelineConfig::from_toml(toml).expect("parse");
            assert_eq!(config.default_window_days, 30);
            assert_eq!(config.state_dir, PathBuf::from("/var/lib/cloudmeter"));
            assert_eq!(config.domains.len(), 2);
            assert_eq!(config.domains[1].description, "accelerators");
        }

        #[test]
        fn malformed_toml_is_rejected() {
            let err = PipelineConfig::from_toml("tenant = ").expect_err("should fail");
            assert!(err.to_string().contains("invalid TOML"));
        }

        #[test]
        fn from_file_reads_toml() {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("cloudmeter.toml");
            std::fs::write(&path, "tenant = \"ops\"").expect("write");

            let config = PipelineConfig::from_file(&path).expect("load");
            assert_eq!(config.tenant, "ops");
        }

        #[test]
        fn from_file_missing_path_fails() {
            let err = PipelineConfig::from_file("/nonexistent/cloudmeter.toml")
                .expect_err("should fail");
            assert!(matches!(err, PipelineError::InvalidConfig { .. }));
        }
    }

    mod validate_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("" ; "empty")]
        #[test_case("acme corp" ; "space")]
        #[test_case("acme/prod" ; "slash")]
        fn rejects_bad_tenant(tenant: &str) {
            let config = PipelineConfig {
                tenant: tenant.to_string(),
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test_case(0 ; "zero")]
        #[test_case(MAX_WINDOW_DAYS + 1 ; "over maximum")]
        #[test_case(4_000_000_000 ; "past earliest time")]
        fn rejects_bad_window(days: u32) {
            let config = PipelineConfig {
                default_window_days: days,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn huge_window_in_toml_is_rejected() {
            let err = PipelineConfig::from_toml("default_window_days = 4000000000")
                .expect_err("should fail");
            assert!(err.to_string().contains("default_window_days"));
        }

        #[test]
        fn accepts_maximum_window() {
            let config = PipelineConfig {
                default_window_days: MAX_WINDOW_DAYS,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_ok());
        }

        #[test_case("../../etc" ; "parent traversal")]
        #[test_case("a/b" ; "slash")]
        #[test_case("gpu nodes" ; "space")]
        #[test_case("." ; "dot")]
        fn rejects_domain_name_outside_charset(name: &str) {
            let config = PipelineConfig {
                domains: vec![DomainSpec::new(name, ["gpu_node"])],
                ..PipelineConfig::default()
            };
            let err = config.validate().expect_err("should fail");
            assert!(err.to_string().contains("must contain only"));
        }

        #[test]
        fn traversing_domain_in_toml_is_rejected() {
            let toml = r#"
                [[domains]]
                name = "../../etc"
                resource_types = ["ec2_instance"]
            "#;
            assert!(PipelineConfig::from_toml(toml).is_err());
        }

        #[test]
        fn rejects_no_domains() {
            let config = PipelineConfig {
                domains: Vec::new(),
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_duplicate_domain_names() {
            let config = PipelineConfig {
                domains: vec![
                    DomainSpec::new("compute", ["ec2_instance"]),
                    DomainSpec::new("Compute", ["virtual_machine"]),
                ],
                ..PipelineConfig::default()
            };
            let err = config.validate().expect_err("should fail");
            assert!(err.to_string().contains("duplicate domain"));
        }

        #[test]
        fn rejects_type_claimed_twice() {
            let config = PipelineConfig {
                domains: vec![
                    DomainSpec::new("compute", ["ec2_instance"]),
                    DomainSpec::new("other", ["EC2_INSTANCE"]),
                ],
                ..PipelineConfig::default()
            };
            let err = config.validate().expect_err("should fail");
            assert!(err.to_string().contains("claimed by more than one domain"));
        }

        #[test]
        fn builder_lower_cases_tenant() {
            let config = PipelineConfig::default().with_tenant("Prod_EU");
            assert_eq!(config.tenant, "prod_eu");
            assert!(config.validate().is_ok());
        }
    }
}
