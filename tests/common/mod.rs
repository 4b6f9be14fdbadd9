//! Shared fixtures for the integration tests: an in-memory registry, a
//! recording progress sink and a minimal SIF image builder.

#![allow(dead_code)]

use async_trait::async_trait;
use oci_client::Reference;
use oci_client::manifest::{OciDescriptor, OciImageManifest};
use sif_oras::digest::DigestUtils;
use sif_oras::error::{OrasError, Result};
use sif_oras::image::manifest::SIF_CONFIG_MEDIA_TYPE_V1;
use sif_oras::registry::progress::ProgressSink;
use sif_oras::registry::{Registry, resolve_reference};
use sif_oras::{Logger, OrasTransfer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Registry keeping manifests and blobs in memory and recording every call
#[derive(Default)]
pub struct MemoryRegistry {
    manifests: Mutex<HashMap<String, OciImageManifest>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    stall_fetch: bool,
    reject_pushes: bool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest fetches never complete
    pub fn stalled() -> Self {
        Self {
            stall_fetch: true,
            ..Default::default()
        }
    }

    /// Every push fails as if the registry refused it
    pub fn read_only() -> Self {
        Self {
            reject_pushes: true,
            ..Default::default()
        }
    }

    /// Store an image whose layers are `(media_type, data)` pairs
    pub fn insert_image(&self, reference: &str, layers: &[(&str, Vec<u8>)]) -> OciImageManifest {
        let config = b"{}".to_vec();
        let manifest = OciImageManifest {
            config: self.insert_blob(config, SIF_CONFIG_MEDIA_TYPE_V1),
            layers: layers
                .iter()
                .map(|(media_type, data)| self.insert_blob(data.clone(), media_type))
                .collect(),
            ..Default::default()
        };
        self.insert_manifest(reference, manifest.clone());
        manifest
    }

    pub fn insert_blob(&self, data: Vec<u8>, media_type: &str) -> OciDescriptor {
        let descriptor = descriptor_for(&data, media_type);
        self.blobs
            .lock()
            .unwrap()
            .insert(descriptor.digest.clone(), data);
        descriptor
    }

    pub fn insert_manifest(&self, reference: &str, manifest: OciImageManifest) {
        let key = resolve_reference(reference).unwrap().to_string();
        self.manifests.lock().unwrap().insert(key, manifest);
    }

    pub fn manifest(&self, reference: &str) -> Option<OciImageManifest> {
        let key = resolve_reference(reference).unwrap().to_string();
        self.manifests.lock().unwrap().get(&key).cloned()
    }

    pub fn blob(&self, digest: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(digest).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn fetch_manifest(&self, reference: &Reference) -> Result<(OciImageManifest, String)> {
        self.record(format!("fetch_manifest {}", reference));
        if self.stall_fetch {
            std::future::pending::<()>().await;
        }
        let manifest = self
            .manifests
            .lock()
            .unwrap()
            .get(&reference.to_string())
            .cloned()
            .ok_or_else(|| OrasError::registry(reference, "manifest unknown"))?;
        let digest = DigestUtils::compute_digest(&serde_json::to_vec(&manifest)?);
        Ok((manifest, digest))
    }

    async fn pull_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        self.record(format!("pull_blob {}", descriptor.digest));
        let data = self
            .blob(&descriptor.digest)
            .ok_or_else(|| OrasError::registry(reference, "blob unknown"))?;
        out.write_all(&data)
            .await
            .map_err(|e| OrasError::registry(reference, e))
    }

    async fn push_blob(&self, reference: &Reference, data: &[u8], digest: &str) -> Result<String> {
        self.record(format!("push_blob {}", digest));
        if self.reject_pushes {
            return Err(OrasError::registry(reference, "denied: requested access to the resource is denied"));
        }
        if DigestUtils::compute_digest(data) != digest {
            return Err(OrasError::registry(reference, "digest invalid"));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(digest.to_string(), data.to_vec());
        Ok(format!(
            "https://{}/v2/{}/blobs/{}",
            reference.registry(),
            reference.repository(),
            digest
        ))
    }

    async fn push_manifest(
        &self,
        reference: &Reference,
        manifest: &OciImageManifest,
    ) -> Result<String> {
        self.record(format!("push_manifest {}", reference));
        if self.reject_pushes {
            return Err(OrasError::registry(reference, "denied"));
        }
        self.manifests
            .lock()
            .unwrap()
            .insert(reference.to_string(), manifest.clone());
        Ok(format!(
            "https://{}/v2/{}/manifests/{}",
            reference.registry(),
            reference.repository(),
            reference.tag().unwrap_or("latest")
        ))
    }
}

/// Progress sink recording what a transfer reported
#[derive(Debug, Default)]
pub struct CountingSink {
    pub inits: Mutex<Vec<u64>>,
    pub bytes: AtomicU64,
    pub finished: AtomicU64,
    pub aborted: AtomicU64,
}

impl ProgressSink for CountingSink {
    fn init(&self, total: u64) {
        self.inits.lock().unwrap().push(total);
    }

    fn incr_by(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn abort(&self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn descriptor_for(data: &[u8], media_type: &str) -> OciDescriptor {
    OciDescriptor {
        media_type: media_type.to_string(),
        digest: DigestUtils::compute_digest(data),
        size: data.len() as i64,
        ..Default::default()
    }
}

pub fn transfer(registry: MemoryRegistry) -> OrasTransfer<MemoryRegistry> {
    OrasTransfer::with_registry(registry, Logger::new_quiet())
}

/// A minimal SIF image: global header, one descriptor per data type, payload
pub fn sif_image(data_types: &[i32], payload: &[u8]) -> Vec<u8> {
    const HEADER_LEN: usize = 128;
    const DESCRIPTOR_LEN: usize = 585;

    let mut image = vec![0u8; HEADER_LEN];
    image[..31].copy_from_slice(b"#!/usr/bin/env run-singularity\n");
    image[32..42].copy_from_slice(b"SIF_MAGIC\0");
    image[42..45].copy_from_slice(b"01\0");
    image[88..96].copy_from_slice(&(data_types.len() as i64).to_le_bytes());
    image[96..104].copy_from_slice(&(HEADER_LEN as i64).to_le_bytes());

    for data_type in data_types {
        let mut entry = vec![0u8; DESCRIPTOR_LEN];
        entry[..4].copy_from_slice(&data_type.to_le_bytes());
        entry[4] = 1;
        image.extend_from_slice(&entry);
    }
    image.extend_from_slice(payload);
    image
}

/// A plain SIF with a squashfs partition descriptor
pub fn plain_sif(payload: &[u8]) -> Vec<u8> {
    sif_image(&[0x4004], payload)
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
