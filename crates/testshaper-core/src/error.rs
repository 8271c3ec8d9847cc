//! Error types for TestShaper
//!
//! Provides the error hierarchy shared by storage, policy resolution and the
//! authentication layer.

use thiserror::Error;

/// The main error type for TestShaper core operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Storage Errors ==========
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    // ========== Policy Errors ==========
    #[error("Policy resolution failed: {0}")]
    PolicyResolution(String),

    // ========== Identity Errors ==========
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Identity already exists: {0}")]
    IdentityExists(String),

    // ========== Crypto Errors ==========
    #[error("Encryption error: {0}")]
    Encryption(String),

    // ========== Serialization Errors ==========
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Validation Errors ==========
    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for TestShaper operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error means a backing store could not be reached
    /// or read. Callers decide between failing closed and substituting a
    /// default based on this.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_)
                | Error::StorageUnavailable(_)
                | Error::PolicyResolution(_)
                | Error::Io(_)
        )
    }
}
