//! ORAS SIF manifest handling
//!
//! Validation of manifests fetched from a registry, and construction of the
//! single-layer artifact pushed for a local SIF file.

use crate::digest::DigestUtils;
use crate::error::{OrasError, Result};
use oci_client::manifest::{OciDescriptor, OciImageManifest};
use std::collections::BTreeMap;
use std::path::Path;

/// Layer media type written for SIF images
pub const SIF_LAYER_MEDIA_TYPE_V1: &str = "application/vnd.sylabs.sif.layer.v1.sif";

/// Layer media type used by early ORAS pushes. The spelling is what was
/// published and must be matched exactly.
pub const SIF_LAYER_MEDIA_TYPE_PROTO: &str = "appliciation/vnd.sylabs.sif.layer.tar";

/// Config media type written for SIF images
pub const SIF_CONFIG_MEDIA_TYPE_V1: &str = "application/vnd.sylabs.sif.config.v1+json";

/// Annotation holding the file name of the pushed layer
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

const SIF_CONFIG_DATA: &[u8] = b"{}";

/// Whether a layer media type identifies a SIF payload
pub fn is_sif_layer_media_type(media_type: &str) -> bool {
    media_type == SIF_LAYER_MEDIA_TYPE_V1 || media_type == SIF_LAYER_MEDIA_TYPE_PROTO
}

/// Check that a manifest describes exactly one SIF layer and return it.
///
/// The config media type is not checked.
pub fn validate_sif_manifest(manifest: &OciImageManifest) -> Result<&OciDescriptor> {
    if manifest.layers.len() != 1 {
        return Err(OrasError::Manifest(format!(
            "ORAS SIF image should have a single layer, found {}",
            manifest.layers.len()
        )));
    }

    let layer = &manifest.layers[0];
    if !is_sif_layer_media_type(&layer.media_type) {
        return Err(OrasError::Manifest(format!(
            "invalid layer mediatype: {}",
            layer.media_type
        )));
    }

    Ok(layer)
}

/// A blob held in memory together with its descriptor
#[derive(Debug, Clone)]
pub struct Blob {
    pub descriptor: OciDescriptor,
    pub data: Vec<u8>,
}

impl Blob {
    fn new(data: Vec<u8>, media_type: &str, annotations: Option<BTreeMap<String, String>>) -> Self {
        let descriptor = OciDescriptor {
            media_type: media_type.to_string(),
            digest: DigestUtils::compute_digest(&data),
            size: data.len() as i64,
            annotations,
            ..Default::default()
        };
        Self { descriptor, data }
    }
}

/// In-memory ORAS artifact wrapping a single SIF file
#[derive(Debug, Clone)]
pub struct SifArtifact {
    pub config: Blob,
    pub layer: Blob,
}

impl SifArtifact {
    /// Read a SIF file into an artifact whose single layer carries `layer_media_type`
    pub fn from_file(path: &Path, layer_media_type: &str) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| OrasError::io(path, e))?;
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.sif".to_string());
        Ok(Self::from_bytes(data, &title, layer_media_type))
    }

    pub fn from_bytes(data: Vec<u8>, title: &str, layer_media_type: &str) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_TITLE.to_string(), title.to_string());

        Self {
            config: Blob::new(SIF_CONFIG_DATA.to_vec(), SIF_CONFIG_MEDIA_TYPE_V1, None),
            layer: Blob::new(data, layer_media_type, Some(annotations)),
        }
    }

    /// Blobs in push order
    pub fn blobs(&self) -> [&Blob; 2] {
        [&self.config, &self.layer]
    }

    /// Sum of blob sizes, as reported to upload progress
    pub fn total_size(&self) -> u64 {
        self.blobs().iter().map(|b| b.data.len() as u64).sum()
    }

    pub fn manifest(&self) -> OciImageManifest {
        OciImageManifest {
            config: self.config.descriptor.clone(),
            layers: vec![self.layer.descriptor.clone()],
            annotations: None,
            ..Default::default()
        }
    }
}
