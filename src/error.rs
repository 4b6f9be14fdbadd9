//! Error handling module for SIF/ORAS transfers

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrasError {
    /// The reference string does not parse as `[registry/]repository[:tag|@digest]`
    #[error("invalid reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    /// Network, authentication and not-found failures reported by the registry client
    #[error("registry error for {reference}: {message}")]
    Registry { reference: String, message: String },

    /// The remote manifest does not describe a single-layer SIF artifact
    #[error("{0}")]
    Manifest(String),

    /// A local file is not a recognised SIF image
    #[error("{0}")]
    Format(String),

    #[error("digest error: {0}")]
    Digest(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl OrasError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrasError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn registry(reference: impl ToString, err: impl std::fmt::Display) -> Self {
        OrasError::Registry {
            reference: reference.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrasError>;
