//! SIF image handling module
//!
//! This module provides the pieces that deal with image content rather than
//! registry transport:
//!
//! - [`sif`]: recognising SIF and OCI-SIF files on disk
//! - [`manifest`]: validating fetched ORAS manifests and building the
//!   single-layer artifact pushed for a SIF file
//! - [`layout`]: the OCI image layout downloads are staged through

pub mod layout;
pub mod manifest;
pub mod sif;

pub use layout::OciLayout;
pub use manifest::{
    SIF_CONFIG_MEDIA_TYPE_V1, SIF_LAYER_MEDIA_TYPE_PROTO, SIF_LAYER_MEDIA_TYPE_V1, SifArtifact,
    validate_sif_manifest,
};
pub use sif::{ImageFormat, detect_format, ensure_sif};
