//! ORAS reference resolution
//!
//! Normalises user supplied references such as `oras://ghcr.io/org/image:tag`
//! into registry client references, applying the default tag and registry.

use crate::error::{OrasError, Result};
use oci_client::Reference;

/// Scheme marker of ORAS references
pub const ORAS_SCHEME: &str = "oras://";

/// Tag used when a reference carries neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

/// Registry used when a reference names no registry host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Strip the `oras://` and `//` prefixes, in that order, each optional
pub fn strip_scheme(reference: &str) -> &str {
    let reference = reference.strip_prefix(ORAS_SCHEME).unwrap_or(reference);
    reference.strip_prefix("//").unwrap_or(reference)
}

/// Resolve a user supplied reference into a registry reference
pub fn resolve_reference(reference: &str) -> Result<Reference> {
    let stripped = strip_scheme(reference);
    let parsed = Reference::try_from(stripped).map_err(|e| OrasError::InvalidReference {
        reference: stripped.to_string(),
        message: e.to_string(),
    })?;

    if parsed.tag().is_none() && parsed.digest().is_none() {
        return Ok(Reference::with_tag(
            parsed.registry().to_string(),
            parsed.repository().to_string(),
            DEFAULT_TAG.to_string(),
        ));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("oras://ghcr.io/a/b:1"), "ghcr.io/a/b:1");
        assert_eq!(strip_scheme("//ghcr.io/a/b:1"), "ghcr.io/a/b:1");
        assert_eq!(strip_scheme("oras:////ghcr.io/a/b:1"), "ghcr.io/a/b:1");
        assert_eq!(strip_scheme("ghcr.io/a/b:1"), "ghcr.io/a/b:1");
    }

    #[test]
    fn test_prefixed_matches_plain() {
        let prefixed = resolve_reference("oras://registry.example.org/ns/image:latest").unwrap();
        let plain = resolve_reference("registry.example.org/ns/image:latest").unwrap();
        assert_eq!(prefixed, plain);
        assert_eq!(prefixed.registry(), "registry.example.org");
        assert_eq!(prefixed.repository(), "ns/image");
        assert_eq!(prefixed.tag(), Some("latest"));

        let slashes = resolve_reference("//registry.example.org/ns/image:latest").unwrap();
        assert_eq!(slashes, plain);
    }

    #[test]
    fn test_defaults_applied() {
        let r = resolve_reference("myimage").unwrap();
        assert_eq!(r.registry(), DEFAULT_REGISTRY);
        assert!(r.repository().ends_with("myimage"));
        assert_eq!(r.tag(), Some(DEFAULT_TAG));
    }

    #[test]
    fn test_default_tag_with_registry() {
        let r = resolve_reference("oras://localhost:5000/sif/alpine").unwrap();
        assert_eq!(r.registry(), "localhost:5000");
        assert_eq!(r.repository(), "sif/alpine");
        assert_eq!(r.tag(), Some(DEFAULT_TAG));
    }

    #[test]
    fn test_digest_reference_keeps_no_tag() {
        let r = resolve_reference(&format!("ghcr.io/org/image@{}", DIGEST)).unwrap();
        assert_eq!(r.digest(), Some(DIGEST));
        assert_eq!(r.tag(), None);
    }

    #[test]
    fn test_invalid_references() {
        for bad in ["", "oras://", "ghcr.io/Org/UPPER:tag", "image:bad tag"] {
            let err = resolve_reference(bad).unwrap_err();
            assert!(
                matches!(err, OrasError::InvalidReference { .. }),
                "expected invalid reference for {:?}, got {:?}",
                bad,
                err
            );
        }
    }
}
