//! Registry credentials
//!
//! Credentials are an optional explicit [`AuthConfig`] plus an optional auth
//! file in docker `config.json` format. They are only read, never stored, and
//! are resolved per registry host into the registry client's auth type.

use crate::error::{OrasError, Result};
use base64::Engine;
use oci_client::secrets::RegistryAuth;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Username paired with identity tokens, as docker credential helpers do
pub const TOKEN_USERNAME: &str = "<token>";

/// Explicit authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    fn to_registry_auth(&self) -> Option<RegistryAuth> {
        if self.username.is_empty() {
            return None;
        }
        Some(RegistryAuth::Basic(
            self.username.clone(),
            self.password.clone(),
        ))
    }
}

/// Credentials handed to every registry operation
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub auth: Option<AuthConfig>,
    pub auth_file: Option<PathBuf>,
}

impl Credentials {
    pub fn new(auth: Option<AuthConfig>, auth_file: Option<PathBuf>) -> Self {
        Self { auth, auth_file }
    }

    /// Resolve the auth to use for `registry`.
    ///
    /// Explicit credentials win, then the explicit auth file, then the
    /// default docker config, then anonymous access.
    pub fn registry_auth(&self, registry: &str) -> Result<RegistryAuth> {
        if let Some(auth) = self.auth.as_ref().and_then(AuthConfig::to_registry_auth) {
            return Ok(auth);
        }

        if let Some(path) = &self.auth_file {
            let config = DockerConfig::load(path)?;
            return Ok(config.lookup(registry).unwrap_or(RegistryAuth::Anonymous));
        }

        if let Some(path) = default_docker_config_path().filter(|p| p.is_file()) {
            if let Ok(config) = DockerConfig::load(&path) {
                if let Some(auth) = config.lookup(registry) {
                    return Ok(auth);
                }
            }
        }

        Ok(RegistryAuth::Anonymous)
    }
}

/// `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`
pub fn default_docker_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, rename = "identitytoken")]
    identity_token: Option<String>,
    #[serde(default, rename = "registrytoken")]
    registry_token: Option<String>,
}

/// The `auths` section of a docker `config.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuthEntry>,
}

impl DockerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| OrasError::io(path, e))?;
        serde_json::from_str(&data).map_err(|e| {
            OrasError::Config(format!("failed to parse auth file {}: {}", path.display(), e))
        })
    }

    /// Find credentials for a registry host.
    ///
    /// Keys are tried as the exact host, `https://host`, `https://host/v1/`,
    /// then any key naming the same host or a Docker Hub alias of it, in key
    /// order.
    pub fn lookup(&self, registry: &str) -> Option<RegistryAuth> {
        let registry = registry.trim();
        let exact = [
            registry.to_string(),
            format!("https://{}", registry),
            format!("https://{}/v1/", registry),
        ];
        let wanted = normalize_registry(registry);

        exact
            .iter()
            .find_map(|key| self.auths.get(key))
            .or_else(|| {
                self.auths
                    .iter()
                    .find(|(key, _)| normalize_registry(key) == wanted)
                    .map(|(_, entry)| entry)
            })
            .and_then(DockerAuthEntry::to_registry_auth)
    }
}

impl DockerAuthEntry {
    fn to_registry_auth(&self) -> Option<RegistryAuth> {
        if let Some(token) = self
            .registry_token
            .as_ref()
            .or(self.identity_token.as_ref())
            .filter(|t| !t.is_empty())
        {
            return Some(RegistryAuth::Basic(
                TOKEN_USERNAME.to_string(),
                token.clone(),
            ));
        }

        if let Some(encoded) = self.auth.as_ref().filter(|a| !a.is_empty()) {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            return Some(RegistryAuth::Basic(
                username.to_string(),
                password.to_string(),
            ));
        }

        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() => {
                Some(RegistryAuth::Basic(u.clone(), p.clone()))
            }
            _ => None,
        }
    }
}

/// Reduce a registry key to its host, folding Docker Hub aliases together.
///
/// Keys may be bare hosts (`ghcr.io`) or URLs (`https://index.docker.io/v1/`).
fn normalize_registry(registry: &str) -> String {
    let registry = registry.trim();
    let host = if registry.contains("://") {
        url::Url::parse(registry)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                })
            })
            .unwrap_or_else(|| registry.to_string())
    } else {
        registry.split('/').next().unwrap_or(registry).to_string()
    };

    let host = host.to_lowercase();
    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        "index.docker.io".to_string()
    } else {
        host
    }
}
