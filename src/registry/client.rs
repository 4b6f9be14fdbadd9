//! Registry access for ORAS transfers
//!
//! [`Registry`] is the set of registry operations the transfer pipelines need.
//! [`OciRegistry`] implements it on top of the `oci-client` crate, resolving
//! credentials once per registry host.

use crate::error::{OrasError, Result};
use crate::logging::Logger;
use crate::registry::auth::Credentials;
use async_trait::async_trait;
use oci_client::client::ClientConfig;
use oci_client::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference, RegistryOperation};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::io::AsyncWrite;

/// User agent sent with every registry request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A manifest fetched from a registry, with the reference it was resolved from
#[derive(Debug, Clone)]
pub struct RemoteImage {
    pub reference: Reference,
    pub manifest: OciImageManifest,
    /// Digest of the manifest as reported by the registry
    pub digest: String,
}

/// Registry operations used by the ORAS pipelines
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the image manifest for `reference`, returning it with its digest
    async fn fetch_manifest(&self, reference: &Reference) -> Result<(OciImageManifest, String)>;

    /// Stream the blob described by `descriptor` into `out`
    async fn pull_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()>;

    /// Upload a blob, returning its location
    async fn push_blob(&self, reference: &Reference, data: &[u8], digest: &str) -> Result<String>;

    /// Upload an image manifest, returning its location
    async fn push_manifest(&self, reference: &Reference, manifest: &OciImageManifest)
    -> Result<String>;
}

/// Auth resolved per registry host, and repositories already authorised
/// for pushes
#[derive(Default)]
struct AuthCache {
    resolved: Mutex<HashMap<String, RegistryAuth>>,
    push_scopes: Mutex<HashSet<String>>,
}

impl AuthCache {
    fn get_or_resolve<F>(&self, registry: &str, resolve: F) -> Result<RegistryAuth>
    where
        F: FnOnce() -> Result<RegistryAuth>,
    {
        let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(auth) = resolved.get(registry) {
            return Ok(auth.clone());
        }
        let auth = resolve()?;
        resolved.insert(registry.to_string(), auth.clone());
        Ok(auth)
    }

    fn has_push_scope(&self, scope: &str) -> bool {
        self.push_scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(scope)
    }

    fn add_push_scope(&self, scope: String) {
        self.push_scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(scope);
    }
}

/// Registry backed by `oci_client::Client`
pub struct OciRegistry {
    client: Client,
    credentials: Credentials,
    auth_cache: AuthCache,
    logger: Logger,
}

impl OciRegistry {
    pub fn new(config: ClientConfig, credentials: Credentials, logger: Logger) -> Self {
        Self {
            client: Client::new(config),
            credentials,
            auth_cache: AuthCache::default(),
            logger,
        }
    }

    fn auth_for(&self, reference: &Reference) -> Result<RegistryAuth> {
        let registry = reference.registry();
        self.auth_cache
            .get_or_resolve(registry, || self.credentials.registry_auth(registry))
    }

    /// Exchange credentials for a push token once per repository
    async fn authenticate_push(&self, reference: &Reference) -> Result<()> {
        let scope = format!("{}/{}", reference.registry(), reference.repository());
        if self.auth_cache.has_push_scope(&scope) {
            return Ok(());
        }

        let auth = self.auth_for(reference)?;
        self.client
            .auth(reference, &auth, RegistryOperation::Push)
            .await
            .map_err(|e| OrasError::registry(reference, e))?;
        self.logger
            .verbose(&format!("Authorised pushes to {}", scope));
        self.auth_cache.add_push_scope(scope);
        Ok(())
    }
}

#[async_trait]
impl Registry for OciRegistry {
    async fn fetch_manifest(&self, reference: &Reference) -> Result<(OciImageManifest, String)> {
        self.logger
            .verbose(&format!("Fetching manifest for {}", reference));
        let auth = self.auth_for(reference)?;
        let (manifest, digest) = self
            .client
            .pull_image_manifest(reference, &auth)
            .await
            .map_err(|e| OrasError::registry(reference, e))?;
        self.logger
            .verbose(&format!("Manifest digest: {}", digest));
        Ok((manifest, digest))
    }

    // Relies on fetch_manifest having authenticated the repository for pulls.
    async fn pull_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        self.logger.verbose(&format!(
            "Pulling blob {} ({} bytes)",
            descriptor.digest, descriptor.size
        ));
        self.client
            .pull_blob(reference, descriptor, out)
            .await
            .map_err(|e| OrasError::registry(reference, e))
    }

    async fn push_blob(&self, reference: &Reference, data: &[u8], digest: &str) -> Result<String> {
        self.authenticate_push(reference).await?;
        self.logger
            .verbose(&format!("Pushing blob {} ({} bytes)", digest, data.len()));
        self.client
            .push_blob(reference, data, digest)
            .await
            .map_err(|e| OrasError::registry(reference, e))
    }

    async fn push_manifest(
        &self,
        reference: &Reference,
        manifest: &OciImageManifest,
    ) -> Result<String> {
        self.authenticate_push(reference).await?;
        self.logger
            .verbose(&format!("Pushing manifest to {}", reference));
        self.client
            .push_manifest(reference, &OciManifest::Image(manifest.clone()))
            .await
            .map_err(|e| OrasError::registry(reference, e))
    }
}
