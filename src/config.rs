use crate::oci_registry::CredentialProvider;
use crate::secret_string::SecretString;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub webserver: Webserver,
    #[serde(default)]
    pub registries: Vec<Registry>,
    #[serde(default)]
    pub tls: Tls,
    #[serde(default, rename = "featureFlags")]
    pub feature_flags: FeatureFlags,
    #[serde(
        default = "default_registry_timeout_seconds",
        rename = "registryTimeoutSeconds"
    )]
    pub registry_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    pub hostname: String,
    pub username: Option<String>,
    pub token: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webserver {
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tls {
    #[serde(default, rename = "caCertificatePaths")]
    pub ca_certificate_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureFlags {
    /// When set, a restart patch also forces imagePullPolicy=Always on every
    /// regular container that does not have it yet
    #[serde(default, rename = "forcePullPolicy")]
    pub force_pull_policy: bool,
}

fn default_registry_timeout_seconds() -> u64 {
    10
}

impl Config {
    pub fn find_registry_for_hostname(&self, hostname: &str) -> Option<&Registry> {
        self.registries.iter().find(|r| r.hostname == hostname)
    }
}

impl CredentialProvider for Config {
    fn token_for(&self, registry: &str) -> Option<&SecretString> {
        self.find_registry_for_hostname(registry).map(|r| &r.token)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;

    Ok(config)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error if any env var is missing or regex fails.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| panic!("Missing environment variable: {}", var_name))
    });

    Ok(result.into_owned())
}
