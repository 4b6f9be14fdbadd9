//! Registry module for ORAS registry interactions
//!
//! This module provides reference resolution, credential lookup and the
//! registry client used to move SIF artifacts, plus byte-level progress
//! reporting for blob transfers.

pub mod auth;
pub mod client;
pub mod progress;
pub mod reference;

pub use auth::{AuthConfig, Credentials};
pub use client::{OciRegistry, Registry, RemoteImage, USER_AGENT};
pub use progress::{ProgressSink, ProgressWriter, TransferBar};
pub use reference::{DEFAULT_REGISTRY, DEFAULT_TAG, resolve_reference};
