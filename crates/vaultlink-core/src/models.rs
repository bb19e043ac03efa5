//! Shared data types for the vault session.
//!
//! The item and status types mirror the vendor CLI's JSON wire format. Items
//! are fetched, locally mutated, and pushed back in place, so every attribute
//! we do not model explicitly is captured in a flattened map and re-serialized
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Authentication state of the vault, as reported by the local API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    /// No user is logged in, or no server is reachable.
    Unauthenticated,
    /// A user is logged in but the vault is locked.
    Locked,
    /// The vault is open for item operations.
    Unlocked,
}

/// Snapshot of the vault's authentication status.
///
/// Ephemeral: recomputed on every query, never cached across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    /// URL of the remote vault server the CLI is enrolled against.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Email of the logged-in user, if any.
    #[serde(default)]
    pub user_email: Option<String>,
    /// Timestamp of the last successful vault sync.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Template object marker carried by the wire format.
    #[serde(default)]
    pub object: Option<String>,
    /// Current authentication state.
    #[serde(rename = "status")]
    pub state: AuthState,
}

impl VaultStatus {
    /// Status synthesized locally when no server is reachable.
    pub fn unauthenticated() -> Self {
        Self {
            server_url: None,
            user_email: None,
            last_sync: None,
            object: None,
            state: AuthState::Unauthenticated,
        }
    }
}

/// Kind of a custom item field, in the vendor's numeric encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum FieldKind {
    Text,
    Hidden,
    Boolean,
    Linked,
    /// Forward-compatible catch-all for encodings we do not know.
    Other(u8),
}

impl From<u8> for FieldKind {
    fn from(value: u8) -> Self {
        match value {
            0 => FieldKind::Text,
            1 => FieldKind::Hidden,
            2 => FieldKind::Boolean,
            3 => FieldKind::Linked,
            other => FieldKind::Other(other),
        }
    }
}

impl From<FieldKind> for u8 {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => 0,
            FieldKind::Hidden => 1,
            FieldKind::Boolean => 2,
            FieldKind::Linked => 3,
            FieldKind::Other(other) => other,
        }
    }
}

/// A custom field on a vault item. Names are not unique within an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

/// URI match behavior, in the vendor's numeric encoding. `None` on the wire
/// means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum UriMatchType {
    Domain,
    Host,
    StartsWith,
    Exact,
    Regex,
    /// The entry is never used for matching; used for synthetic marker URIs.
    Never,
    Other(u8),
}

impl From<u8> for UriMatchType {
    fn from(value: u8) -> Self {
        match value {
            0 => UriMatchType::Domain,
            1 => UriMatchType::Host,
            2 => UriMatchType::StartsWith,
            3 => UriMatchType::Exact,
            4 => UriMatchType::Regex,
            5 => UriMatchType::Never,
            other => UriMatchType::Other(other),
        }
    }
}

impl From<UriMatchType> for u8 {
    fn from(match_type: UriMatchType) -> Self {
        match match_type {
            UriMatchType::Domain => 0,
            UriMatchType::Host => 1,
            UriMatchType::StartsWith => 2,
            UriMatchType::Exact => 3,
            UriMatchType::Regex => 4,
            UriMatchType::Never => 5,
            UriMatchType::Other(other) => other,
        }
    }
}

/// A single URI entry on a login item. Order within the list is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriEntry {
    pub uri: String,
    #[serde(rename = "match", default)]
    pub match_type: Option<UriMatchType>,
}

/// Login-specific attributes of an item.
///
/// Only the URI list is modeled; username, password, totp and the rest ride
/// along opaquely in `rest` and survive the fetch-mutate-push cycle verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<UriEntry>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// A vault item. `id` is the vault's own stable identifier and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Custom fields; position 0 is the first one displayed by host UIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Present only for login-type items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginData>,
    /// Everything else the vendor sent, preserved untouched.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl VaultItem {
    /// Whether this is a login-type item. Login items carry their tagging
    /// marker on the URI list rather than in a custom field.
    pub fn is_login(&self) -> bool {
        self.login.is_some()
    }
}

/// A master credential held only for the duration of a login or unlock
/// attempt, plus the controller-owned in-memory cache. The password buffer is
/// wiped on drop and never serialized or logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
