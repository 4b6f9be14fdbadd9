//! SIF ORAS Library
//!
//! Moves single-file SIF container images to and from OCI registries as ORAS
//! artifacts, organizing reference resolution, registry access, SIF
//! validation and the transfer pipelines.

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod logging;
pub mod oras;
pub mod registry;
pub mod upload;

pub use config::AppConfig;
pub use digest::{Hash, image_hash};
pub use error::{OrasError, Result};
pub use logging::Logger;
pub use oras::OrasTransfer;
