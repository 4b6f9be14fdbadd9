//! Push a local SIF image to a registry

use super::OrasTransfer;
use crate::error::Result;
use crate::image::manifest::{SIF_LAYER_MEDIA_TYPE_V1, SifArtifact};
use crate::image::sif::ensure_sif;
use crate::registry::client::Registry;
use crate::registry::progress::TransferBar;
use crate::registry::reference::resolve_reference;
use crate::upload::progress::{Update, spawn_progress_relay};
use oci_client::Reference;
use std::io::IsTerminal;
use std::path::Path;
use tokio::sync::mpsc;

impl<R: Registry> OrasTransfer<R> {
    /// Upload the SIF image at `path` to `reference`.
    ///
    /// A progress bar is shown when stderr is a terminal and output is not
    /// quiet.
    pub async fn upload_image(&self, path: &Path, reference: &str) -> Result<()> {
        let interactive = std::io::stderr().is_terminal() && !self.logger.quiet;
        if !interactive {
            return self.upload_image_with_progress(path, reference, None).await;
        }

        // Validate before the bar appears.
        ensure_sif(path)?;
        resolve_reference(reference)?;

        let (updates, relay) = spawn_progress_relay(TransferBar::new("Uploading"));
        let result = self
            .upload_image_with_progress(path, reference, Some(updates))
            .await;
        if let Err(e) = relay.await {
            self.logger
                .verbose(&format!("Upload progress display failed: {}", e));
        }
        result
    }

    /// Upload the SIF image at `path` to `reference`, reporting to `updates`.
    ///
    /// The sender is dropped when the upload ends, which stops the consumer.
    pub async fn upload_image_with_progress(
        &self,
        path: &Path,
        reference: &str,
        updates: Option<mpsc::Sender<Update>>,
    ) -> Result<()> {
        self.cancellable(async move {
            let result = self.push_sif(path, reference, updates.as_ref()).await;
            if let (Err(e), Some(tx)) = (&result, &updates) {
                let _ = tx.send(Update::Error(e.to_string())).await;
            }
            result
        })
        .await
    }

    async fn push_sif(
        &self,
        path: &Path,
        reference: &str,
        updates: Option<&mpsc::Sender<Update>>,
    ) -> Result<()> {
        ensure_sif(path)?;
        let reference = resolve_reference(reference)?;

        let artifact = SifArtifact::from_file(path, SIF_LAYER_MEDIA_TYPE_V1)?;
        let total = artifact.total_size();
        self.logger.info(&format!(
            "Pushing {} ({}) to {}",
            path.display(),
            self.logger.format_size(total),
            reference
        ));

        let mut complete = 0u64;
        report(updates, Update::Progress { complete, total }).await;
        for blob in artifact.blobs() {
            self.registry
                .push_blob(&reference, &blob.data, &blob.descriptor.digest)
                .await?;
            complete += blob.data.len() as u64;
            report(updates, Update::Progress { complete, total }).await;
        }

        self.push_manifest(&reference, &artifact).await
    }

    async fn push_manifest(&self, reference: &Reference, artifact: &SifArtifact) -> Result<()> {
        let url = self
            .registry
            .push_manifest(reference, &artifact.manifest())
            .await?;
        self.logger.verbose(&format!("Manifest available at {}", url));
        self.logger.success(&format!("Pushed {}", reference));
        Ok(())
    }
}

async fn report(updates: Option<&mpsc::Sender<Update>>, update: Update) {
    if let Some(tx) = updates {
        // A closed relay only loses the display.
        let _ = tx.send(update).await;
    }
}
