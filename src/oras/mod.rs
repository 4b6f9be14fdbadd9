//! ORAS image transfer
//!
//! [`OrasTransfer`] moves single-file SIF images to and from OCI registries as
//! ORAS artifacts. Each public operation resolves the user reference, talks to
//! the [`Registry`] and honours the transfer's cancellation token.

mod download;
mod upload;

use crate::config::AppConfig;
use crate::digest::Hash;
use crate::error::{OrasError, Result};
use crate::image::manifest::validate_sif_manifest;
use crate::logging::Logger;
use crate::registry::client::{OciRegistry, Registry, RemoteImage};
use crate::registry::reference::resolve_reference;
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub use crate::digest::image_hash;

/// Transfer engine for SIF images over ORAS
pub struct OrasTransfer<R: Registry = OciRegistry> {
    registry: R,
    logger: Logger,
    cancel: CancellationToken,
    /// Parent of download staging directories; the system temp dir if unset
    staging_root: Option<PathBuf>,
}

impl OrasTransfer<OciRegistry> {
    /// Transfer engine talking to real registries with `config`'s settings
    pub fn new(config: &AppConfig) -> Self {
        let logger = config.logger();
        let registry = OciRegistry::new(
            config.client_config(),
            config.credentials(),
            logger.clone(),
        );
        let transfer = Self::with_registry(registry, logger);
        match &config.tmp_dir {
            Some(root) => transfer.with_staging_root(root),
            None => transfer,
        }
    }
}

impl<R: Registry> OrasTransfer<R> {
    pub fn with_registry(registry: R, logger: Logger) -> Self {
        Self {
            registry,
            logger,
            cancel: CancellationToken::new(),
            staging_root: None,
        }
    }

    /// Abort in-flight operations when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Create download staging directories under `root`
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Resolve `reference` and fetch its manifest
    pub async fn remote_image(&self, reference: &str) -> Result<RemoteImage> {
        self.cancellable(self.fetch_remote(reference)).await
    }

    /// Digest of the SIF layer recorded in the remote manifest
    ///
    /// The digest is returned as the registry reports it; no bytes are pulled.
    pub async fn ref_hash(&self, reference: &str) -> Result<Hash> {
        self.cancellable(async {
            let image = self.fetch_remote(reference).await?;
            let layer = validate_sif_manifest(&image.manifest)?;
            layer.digest.parse()
        })
        .await
    }

    async fn fetch_remote(&self, reference: &str) -> Result<RemoteImage> {
        let reference = resolve_reference(reference)?;
        let (manifest, digest) = self.registry.fetch_manifest(&reference).await?;
        Ok(RemoteImage {
            reference,
            manifest,
            digest,
        })
    }

    /// Run `operation` unless the transfer is cancelled first.
    ///
    /// On cancellation the operation future is dropped, so guards it owns
    /// run their cleanup before `Cancelled` is returned.
    async fn cancellable<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(OrasError::Cancelled),
            result = operation => result,
        }
    }
}
