//! Pull a SIF image from a registry into a local file

use super::OrasTransfer;
use crate::error::{OrasError, Result};
use crate::image::layout::OciLayout;
use crate::image::manifest::validate_sif_manifest;
use crate::image::sif::ensure_sif;
use crate::logging::Logger;
use crate::registry::client::Registry;
use crate::registry::progress::ProgressSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

const STAGING_PREFIX: &str = "oras-tmp-";

impl<R: Registry> OrasTransfer<R> {
    /// Download the SIF image at `reference` to `path`.
    ///
    /// The image is staged in a private OCI layout, copied to `path` and
    /// checked to be a SIF. On any failure `path` does not exist afterwards.
    /// `progress` observes the layer fetch from the registry.
    pub async fn download_image(
        &self,
        path: &Path,
        reference: &str,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<()> {
        self.cancellable(self.pull_to(path, reference, progress))
            .await
    }

    async fn pull_to(
        &self,
        path: &Path,
        reference: &str,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<()> {
        let image = self.fetch_remote(reference).await?;
        let layer = validate_sif_manifest(&image.manifest)?.clone();
        self.logger.verbose(&format!(
            "Resolved {} to manifest {}",
            image.reference, image.digest
        ));
        self.logger.info(&format!(
            "Pulling {} ({})",
            image.reference,
            self.logger.format_size(layer.size.max(0) as u64)
        ));

        let staging = StagingDir::new(self.staging_root.as_deref(), self.logger.clone())?;
        let mut layout = OciLayout::write(staging.path()).await?;
        layout.append_image(&self.registry, &image, progress).await?;
        self.logger
            .verbose(&format!("Staged image in {}", staging.path().display()));

        let mut source = layout.open_blob(&layer.digest).await?;
        let mut dest = tokio::fs::File::create(path)
            .await
            .map_err(|e| OrasError::io(path, e))?;
        let mut guard = DestinationGuard::new(path, self.logger.clone());

        tokio::io::copy(&mut source, &mut dest)
            .await
            .map_err(|e| OrasError::io(path, e))?;
        dest.flush().await.map_err(|e| OrasError::io(path, e))?;
        drop(dest);

        self.logger.step(&format!("Verifying {}", path.display()));
        ensure_sif(path)?;
        guard.disarm();

        self.logger
            .success(&format!("Downloaded {} to {}", image.reference, path.display()));
        Ok(())
    }
}

/// Temporary staging directory, removed on drop
struct StagingDir {
    dir: Option<TempDir>,
    logger: Logger,
}

impl StagingDir {
    fn new(root: Option<&Path>, logger: Logger) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root).map_err(|e| OrasError::io(root, e))?,
            None => builder
                .tempdir()
                .map_err(|e| OrasError::io(std::env::temp_dir(), e))?,
        };
        Ok(Self {
            dir: Some(dir),
            logger,
        })
    }

    fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            // Logged only; the transfer result stands.
            if let Err(e) = dir.close() {
                self.logger.warning(&format!(
                    "Failed to remove staging directory {}: {}",
                    path.display(),
                    e
                ));
            }
        }
    }
}

/// Removes a downloaded file on drop unless disarmed
struct DestinationGuard {
    path: PathBuf,
    armed: bool,
    logger: Logger,
}

impl DestinationGuard {
    fn new(path: &Path, logger: Logger) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
            logger,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => self.logger.warning(&format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            )),
        }
    }
}
