//! Application configuration
//!
//! Settings come from defaults, then `SIF_ORAS_*` environment variables, then
//! command-line flags (applied by the CLI layer).

use crate::error::{OrasError, Result};
use crate::logging::Logger;
use crate::registry::auth::{AuthConfig, Credentials};
use crate::registry::client::USER_AGENT;
use oci_client::client::{ClientConfig, ClientProtocol};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_AUTH_FILE: &str = "SIF_ORAS_AUTH_FILE";
pub const ENV_INSECURE_REGISTRIES: &str = "SIF_ORAS_INSECURE_REGISTRIES";
pub const ENV_SKIP_TLS: &str = "SIF_ORAS_SKIP_TLS";
pub const ENV_VERBOSE: &str = "SIF_ORAS_VERBOSE";
pub const ENV_USERNAME: &str = "SIF_ORAS_USERNAME";
pub const ENV_PASSWORD: &str = "SIF_ORAS_PASSWORD";
pub const ENV_TMPDIR: &str = "SIF_ORAS_TMPDIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Docker `config.json` style credentials file
    pub auth_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Registry hosts reached over plain HTTP
    pub insecure_registries: Vec<String>,
    /// Use plain HTTP for every registry
    pub insecure: bool,
    /// Accept invalid TLS certificates
    pub skip_tls: bool,
    /// Parent directory for download staging
    pub tmp_dir: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
}

impl AppConfig {
    /// Create config from environment variables and defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from defaults and an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        if let Some(val) = lookup(ENV_AUTH_FILE).filter(|v| !v.is_empty()) {
            config.auth_file = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup(ENV_INSECURE_REGISTRIES) {
            config.insecure_registries = val
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(val) = lookup(ENV_TMPDIR).filter(|v| !v.is_empty()) {
            config.tmp_dir = Some(PathBuf::from(val));
        }
        config.skip_tls = flag(ENV_SKIP_TLS);
        config.verbose = flag(ENV_VERBOSE);
        config.username = lookup(ENV_USERNAME).filter(|v| !v.is_empty());
        config.password = lookup(ENV_PASSWORD);

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.verbose && self.quiet {
            return Err(OrasError::Config(
                "verbose and quiet output cannot both be enabled".to_string(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(OrasError::Config(
                "a password was given without a username".to_string(),
            ));
        }
        if let Some(dir) = self.tmp_dir.as_ref().filter(|d| !d.is_dir()) {
            return Err(OrasError::Config(format!(
                "temporary directory does not exist: {}",
                dir.display()
            )));
        }
        if let Some(host) = self
            .insecure_registries
            .iter()
            .find(|h| h.contains("://") || h.contains('/'))
        {
            return Err(OrasError::Config(format!(
                "insecure registry must be a bare host, got {}",
                host
            )));
        }
        Ok(())
    }

    /// Registry client configuration for these settings
    pub fn client_config(&self) -> ClientConfig {
        let protocol = if self.insecure {
            ClientProtocol::Http
        } else if !self.insecure_registries.is_empty() {
            ClientProtocol::HttpsExcept(self.insecure_registries.clone())
        } else {
            ClientProtocol::Https
        };

        ClientConfig {
            protocol,
            accept_invalid_certificates: self.skip_tls,
            user_agent: USER_AGENT,
            ..Default::default()
        }
    }

    pub fn credentials(&self) -> Credentials {
        let auth = self.username.as_ref().map(|username| {
            AuthConfig::new(username.clone(), self.password.clone().unwrap_or_default())
        });
        Credentials::new(auth, self.auth_file.clone())
    }

    pub fn logger(&self) -> Logger {
        if self.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(self.verbose)
        }
    }
}
