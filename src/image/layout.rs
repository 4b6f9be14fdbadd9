//! Staging OCI image layout
//!
//! Downloads are staged through an OCI image layout on disk:
//!
//! ```text
//! staging/
//! ├── oci-layout      (layout marker)
//! ├── index.json      (image index)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>
//!         ├── <config>
//!         └── <layer>
//! ```
//!
//! Every blob is verified against its descriptor digest while it streams in.

use crate::digest::{DigestUtils, Hash, SHA256};
use crate::error::{OrasError, Result};
use crate::registry::client::{Registry, RemoteImage};
use crate::registry::progress::{ProgressSink, ProgressWriter};
use oci_client::Reference;
use oci_client::manifest::{OCI_IMAGE_MEDIA_TYPE, OciDescriptor};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

const OCI_LAYOUT_FILE: &str = "oci-layout";
const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";
const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageIndex {
    schema_version: u8,
    manifests: Vec<OciDescriptor>,
}

impl Default for ImageIndex {
    fn default() -> Self {
        Self {
            schema_version: 2,
            manifests: Vec::new(),
        }
    }
}

/// An OCI image layout rooted at a directory
#[derive(Debug)]
pub struct OciLayout {
    root: PathBuf,
    index: ImageIndex,
}

impl OciLayout {
    /// Write an empty layout (marker file and an index without manifests)
    pub async fn write(root: &Path) -> Result<Self> {
        let blobs = root.join("blobs").join(SHA256);
        tokio::fs::create_dir_all(&blobs)
            .await
            .map_err(|e| OrasError::io(&blobs, e))?;

        let marker = root.join(OCI_LAYOUT_FILE);
        tokio::fs::write(&marker, OCI_LAYOUT_CONTENT)
            .await
            .map_err(|e| OrasError::io(&marker, e))?;

        let layout = Self {
            root: root.to_path_buf(),
            index: ImageIndex::default(),
        };
        layout.write_index().await?;
        Ok(layout)
    }

    /// Number of images recorded in the index
    #[cfg(test)]
    fn image_count(&self) -> usize {
        self.index.manifests.len()
    }

    /// Copy a remote image into the layout: config and layer blobs first,
    /// then the manifest, then the index entry.
    ///
    /// `progress` only observes layer blobs.
    pub async fn append_image(
        &mut self,
        registry: &dyn Registry,
        image: &RemoteImage,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<()> {
        self.fetch_blob(registry, &image.reference, &image.manifest.config, None)
            .await?;
        for layer in &image.manifest.layers {
            self.fetch_blob(registry, &image.reference, layer, progress.clone())
                .await?;
        }

        let manifest_json = serde_json::to_vec(&image.manifest)?;
        let digest = DigestUtils::compute_digest(&manifest_json);
        let path = self.blob_path(&digest)?;
        tokio::fs::write(&path, &manifest_json)
            .await
            .map_err(|e| OrasError::io(&path, e))?;

        let mut annotations = BTreeMap::new();
        if let Some(tag) = image.reference.tag() {
            annotations.insert(ANNOTATION_REF_NAME.to_string(), tag.to_string());
        }
        self.index.manifests.push(OciDescriptor {
            media_type: image
                .manifest
                .media_type
                .clone()
                .unwrap_or_else(|| OCI_IMAGE_MEDIA_TYPE.to_string()),
            digest,
            size: manifest_json.len() as i64,
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        });
        self.write_index().await
    }

    /// Path of the blob with `digest`
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hash: Hash = digest.parse()?;
        Ok(self.root.join("blobs").join(hash.algorithm).join(hash.hex))
    }

    /// Open a blob for reading
    pub async fn open_blob(&self, digest: &str) -> Result<tokio::fs::File> {
        let path = self.blob_path(digest)?;
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| OrasError::io(&path, e))
    }

    async fn fetch_blob(
        &self,
        registry: &dyn Registry,
        reference: &Reference,
        descriptor: &OciDescriptor,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<PathBuf> {
        let path = self.blob_path(&descriptor.digest)?;
        let partial = path.with_extension("partial");

        if let Some(sink) = &progress {
            sink.init(descriptor.size.max(0) as u64);
        }
        let stored = self
            .store_blob(registry, reference, descriptor, &path, &partial, progress.as_ref())
            .await;

        match &stored {
            Ok(_) => {
                if let Some(sink) = &progress {
                    sink.finish();
                }
            }
            Err(_) => {
                if let Some(sink) = &progress {
                    sink.abort();
                }
                let _ = tokio::fs::remove_file(&partial).await;
            }
        }
        stored
    }

    /// Stream one blob into `partial`, verify it, then move it to `path`
    async fn store_blob(
        &self,
        registry: &dyn Registry,
        reference: &Reference,
        descriptor: &OciDescriptor,
        path: &Path,
        partial: &Path,
        progress: Option<&Arc<dyn ProgressSink>>,
    ) -> Result<PathBuf> {
        let file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| OrasError::io(partial, e))?;
        let mut writer = DigestWriter::new(BufWriter::new(file));

        match progress {
            Some(sink) => {
                let mut counted = ProgressWriter::new(&mut writer, sink.clone());
                registry.pull_blob(reference, descriptor, &mut counted).await?
            }
            None => registry.pull_blob(reference, descriptor, &mut writer).await?,
        }
        writer.flush().await.map_err(|e| OrasError::io(partial, e))?;

        let (digest, written) = writer.finish();
        if digest != descriptor.digest {
            return Err(OrasError::Digest(format!(
                "blob digest mismatch: expected {}, got {}",
                descriptor.digest, digest
            )));
        }
        if descriptor.size >= 0 && written != descriptor.size as u64 {
            return Err(OrasError::Digest(format!(
                "blob {} size mismatch: expected {} bytes, got {}",
                descriptor.digest, descriptor.size, written
            )));
        }

        tokio::fs::rename(partial, path)
            .await
            .map_err(|e| OrasError::io(path, e))?;
        Ok(path.to_path_buf())
    }

    async fn write_index(&self) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let data = serde_json::to_vec_pretty(&self.index)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| OrasError::io(&path, e))
    }
}

/// `AsyncWrite` adapter computing the sha256 of everything written
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn finish(self) -> (String, u64) {
        (
            format!("{}:{}", SHA256, hex::encode(self.hasher.finalize())),
            self.written,
        )
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for DigestWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            let n = *n;
            self.hasher.update(&buf[..n]);
            self.written += n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
