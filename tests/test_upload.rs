mod common;

use common::{MemoryRegistry, plain_sif, transfer, write_file};
use sif_oras::OrasError;
use sif_oras::digest::image_hash;
use sif_oras::image::manifest::{
    ANNOTATION_TITLE, SIF_CONFIG_MEDIA_TYPE_V1, SIF_LAYER_MEDIA_TYPE_V1,
};
use sif_oras::upload::Update;
use tokio::sync::mpsc;

const REFERENCE: &str = "oras://localhost:5000/sif/alpine:3.20";

#[tokio::test]
async fn test_upload_pushes_single_layer_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let image = plain_sif(b"alpine rootfs");
    let path = write_file(dir.path(), "alpine.sif", &image);

    let transfer = transfer(MemoryRegistry::new());
    transfer.upload_image(&path, REFERENCE).await.unwrap();

    let registry = transfer.registry();
    let manifest = registry.manifest(REFERENCE).unwrap();
    assert_eq!(manifest.config.media_type, SIF_CONFIG_MEDIA_TYPE_V1);
    assert_eq!(registry.blob(&manifest.config.digest).unwrap(), b"{}".to_vec());

    assert_eq!(manifest.layers.len(), 1);
    let layer = &manifest.layers[0];
    assert_eq!(layer.media_type, SIF_LAYER_MEDIA_TYPE_V1);
    assert_eq!(layer.size, image.len() as i64);
    assert_eq!(
        layer.annotations.as_ref().unwrap()[ANNOTATION_TITLE],
        "alpine.sif"
    );
    assert_eq!(registry.blob(&layer.digest).unwrap(), image);

    let calls = registry.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], format!("push_blob {}", manifest.config.digest));
    assert_eq!(calls[1], format!("push_blob {}", layer.digest));
    assert!(calls[2].starts_with("push_manifest localhost:5000/sif/alpine:3.20"));
}

#[tokio::test]
async fn test_upload_refuses_non_sif_before_network() {
    let dir = tempfile::tempdir().unwrap();
    let mut squashfs = b"hsqs".to_vec();
    squashfs.extend_from_slice(&[0u8; 256]);
    let path = write_file(dir.path(), "rootfs.squashfs", &squashfs);

    let transfer = transfer(MemoryRegistry::new());
    let err = transfer.upload_image(&path, REFERENCE).await.unwrap_err();

    assert!(matches!(err, OrasError::Format(_)));
    assert!(err.to_string().contains("squashfs"));
    assert!(transfer.registry().calls().is_empty());
}

#[tokio::test]
async fn test_upload_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = transfer(MemoryRegistry::new());

    let err = transfer
        .upload_image(&dir.path().join("absent.sif"), REFERENCE)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("could not open image"));
    assert!(transfer.registry().calls().is_empty());
}

#[tokio::test]
async fn test_upload_reports_progress_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let image = plain_sif(&vec![1u8; 10_000]);
    let path = write_file(dir.path(), "big.sif", &image);
    let total = image.len() as u64 + 2;

    let (tx, mut rx) = mpsc::channel(16);
    transfer(MemoryRegistry::new())
        .upload_image_with_progress(&path, REFERENCE, Some(tx))
        .await
        .unwrap();

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(
        updates,
        vec![
            Update::Progress { complete: 0, total },
            Update::Progress { complete: 2, total },
            Update::Progress { complete: total, total },
        ]
    );
}

#[tokio::test]
async fn test_upload_failure_sends_error_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "image.sif", &plain_sif(b"data"));

    let (tx, mut rx) = mpsc::channel(16);
    let err = transfer(MemoryRegistry::read_only())
        .upload_image_with_progress(&path, REFERENCE, Some(tx))
        .await
        .unwrap_err();
    assert!(matches!(err, OrasError::Registry { .. }));

    let mut last = None;
    while let Some(update) = rx.recv().await {
        last = Some(update);
    }
    assert!(matches!(last, Some(Update::Error(message)) if message.contains("denied")));
}

#[tokio::test]
async fn test_round_trip_preserves_bytes_and_digest() {
    let dir = tempfile::tempdir().unwrap();
    let image = plain_sif(b"round trip payload");
    let source = write_file(dir.path(), "source.sif", &image);

    let transfer = transfer(MemoryRegistry::new());
    transfer.upload_image(&source, REFERENCE).await.unwrap();

    let dest = dir.path().join("pulled.sif");
    transfer.download_image(&dest, REFERENCE, None).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), image);

    let remote = transfer.ref_hash(REFERENCE).await.unwrap();
    assert_eq!(remote, image_hash(&source).unwrap());
    assert_eq!(remote, image_hash(&dest).unwrap());
}
