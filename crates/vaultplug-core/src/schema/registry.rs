//! Fail-closed schema version registry.
//!
//! A recipe specification declares the policy schema version it was authored
//! against. Building against an unknown version must fail rather than guess
//! field mappings, since a wrong guess would produce a signable encoding
//! with different meaning than the plugin intended.

use thiserror::Error;

/// The schema version this client encodes and decodes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// All schema versions this client can build against.
///
/// Version 0 is the pre-versioning wire format, identical to version 1;
/// older marketplace entries omit the field and deserialize as 0.
pub const SUPPORTED_SCHEMA_VERSIONS: &[u32] = &[0, CURRENT_SCHEMA_VERSION];

/// A recipe specification declared a schema version unknown to this client.
///
/// Fatal for the build attempt; the plugin needs a client update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported policy schema version {version}; a client update is required")]
pub struct UnsupportedSchemaVersion {
    /// The version the specification declared.
    pub version: u32,
}

/// Checks that `version` is one this client can build against.
///
/// # Errors
///
/// Returns [`UnsupportedSchemaVersion`] for any version not listed in
/// [`SUPPORTED_SCHEMA_VERSIONS`].
pub fn ensure_supported(version: u32) -> Result<(), UnsupportedSchemaVersion> {
    if SUPPORTED_SCHEMA_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(UnsupportedSchemaVersion { version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_supported() {
        assert!(ensure_supported(CURRENT_SCHEMA_VERSION).is_ok());
        assert!(ensure_supported(0).is_ok());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = ensure_supported(99).unwrap_err();
        assert_eq!(err.version, 99);
        assert!(err.to_string().contains("unsupported policy schema version"));
    }
}
