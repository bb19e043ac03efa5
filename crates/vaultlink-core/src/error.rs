//! Error types for the vaultlink core library.

use thiserror::Error;

/// Errors surfaced by vault session operations.
///
/// Application-level failures (the server answered but reported
/// `success = false`) are not errors; those come back as empty results on the
/// individual [`VaultApi`](crate::api::VaultApi) methods.
#[derive(Error, Debug)]
pub enum Error {
    /// The vault CLI binary is missing or the server could not be started.
    #[error("vault CLI server is not available")]
    Unavailable,

    /// The user abandoned a credential prompt.
    #[error("cancelled at the credential prompt")]
    Cancelled,

    /// The local API server was reachable-checked or called and the transport
    /// itself failed.
    #[error("vault server transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered but rejected the request, in a context where the
    /// surrounding operation cannot continue.
    #[error("vault server rejected {0}")]
    Rejected(&'static str),

    /// Binary update check, download, or install failed.
    #[error("vault CLI update failed: {0}")]
    Update(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vault session operations.
pub type Result<T> = std::result::Result<T, Error>;
