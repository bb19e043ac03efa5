//! Vault-CLI session control and item tagging for vaultlink.
//!
//! This crate manages the lifecycle of a locally-spawned vault-CLI process
//! acting as an API server, enforces the locked/unlocked state machine around
//! every call, and runs the idempotent tagging pass that back-references
//! vault items to host-application records.

pub mod api;
pub mod error;
pub mod models;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod session;
pub mod update;

pub use api::{ApiClient, VaultApi};
pub use error::{Error, Result};
pub use models::{
    AuthState, Credential, Field, FieldKind, LoginData, UriEntry, UriMatchType, VaultItem,
    VaultStatus,
};
pub use process::{ProcessHandle, VaultServer};
pub use progress::{NullProgress, ProgressReporter, ScaledProgress};
pub use prompt::CredentialPrompt;
pub use reconcile::{MarkerConfig, ReconciliationEngine, TagOutcome};
pub use session::{SessionController, SessionOptions};
pub use update::{
    DownloadLocation, ExecutableInstaller, HttpUpdateChannel, Installer, UpdateChannel,
};
