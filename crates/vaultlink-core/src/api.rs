//! Typed client for the locally-spawned vault-CLI API server.
//!
//! Transport failures (server unreachable, timeout, bad JSON) surface as
//! [`Error::Transport`]; application-level failures (`success = false` in the
//! response envelope) surface as empty or `false` results so callers can
//! choose to tolerate them.

use crate::error::{Error, Result};
use crate::models::{VaultItem, VaultStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// The server capability subset consumed by the session controller.
///
/// Kept as a trait so tests can substitute a scripted fake for the spawned
/// server.
pub trait VaultApi {
    /// Query the authentication status.
    fn status(&self) -> Result<VaultStatus>;
    /// Authenticate a user; returns the session token on success.
    fn login(&self, email: &str, password: &str) -> Result<Option<String>>;
    /// Unlock the vault with the master password; `false` means rejected.
    fn unlock(&self, password: &str) -> Result<bool>;
    /// Lock the vault.
    fn lock(&self) -> Result<bool>;
    /// Pull the latest vault state from the backend.
    fn sync(&self) -> Result<bool>;
    /// Fetch all items; `None` is an application-level fetch failure.
    fn items(&self) -> Result<Option<Vec<VaultItem>>>;
    /// Fetch a single item by id.
    fn item(&self, id: &str) -> Result<Option<VaultItem>>;
    /// Push a locally-mutated item back, update-in-place.
    fn put_item(&self, item: &VaultItem) -> Result<bool>;
    /// Current TOTP code for an item.
    fn totp(&self, id: &str) -> Result<Option<String>>;
    /// End the server-side session.
    fn logout(&self) -> Result<bool>;
}

/// Response envelope wrapping every server reply.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
}

/// `data` wrapper carrying the status template.
#[derive(Debug, Deserialize)]
struct StatusData {
    template: VaultStatus,
}

/// `data` wrapper carrying a raw string payload (session tokens).
#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    raw: Option<String>,
}

/// `data` wrapper carrying a list payload.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ListData<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// `data` wrapper carrying a single value payload (TOTP codes).
#[derive(Debug, Deserialize)]
struct ValueData {
    data: String,
}

/// Blocking HTTP client over the spawned server's API surface.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    base: String,
}

impl ApiClient {
    /// Client for a server listening on `localhost:<port>`.
    pub fn new(port: u16) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::Transport)?;
        Ok(Self {
            http,
            base: format!("http://localhost:{port}"),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        Ok(self.http.get(self.url(path)).send()?.json()?)
    }

    fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Envelope<T>> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send()?.json()?)
    }
}

impl VaultApi for ApiClient {
    fn status(&self) -> Result<VaultStatus> {
        let resp: Envelope<StatusData> = self.get("/status")?;
        Ok(resp
            .data
            .map(|d| d.template)
            .unwrap_or_else(VaultStatus::unauthenticated))
    }

    fn login(&self, email: &str, password: &str) -> Result<Option<String>> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp: Envelope<RawData> = self.post("/login", Some(&body))?;
        if !resp.success {
            return Ok(None);
        }
        Ok(resp
            .data
            .and_then(|d| d.raw)
            .filter(|token| !token.is_empty()))
    }

    fn unlock(&self, password: &str) -> Result<bool> {
        let body = serde_json::json!({ "password": password });
        let resp: Envelope<RawData> = self.post("/unlock", Some(&body))?;
        Ok(resp.success)
    }

    fn lock(&self) -> Result<bool> {
        let resp: Envelope<serde_json::Value> = self.post("/lock", None)?;
        Ok(resp.success)
    }

    fn sync(&self) -> Result<bool> {
        let resp: Envelope<serde_json::Value> = self.post("/sync", None)?;
        Ok(resp.success)
    }

    fn items(&self) -> Result<Option<Vec<VaultItem>>> {
        let resp: Envelope<ListData<VaultItem>> = self.get("/list/object/items")?;
        if !resp.success {
            return Ok(None);
        }
        Ok(Some(resp.data.map(|d| d.data).unwrap_or_default()))
    }

    fn item(&self, id: &str) -> Result<Option<VaultItem>> {
        let resp: Envelope<VaultItem> = self.get(&format!("/object/item/{id}"))?;
        if !resp.success {
            return Ok(None);
        }
        Ok(resp.data)
    }

    fn put_item(&self, item: &VaultItem) -> Result<bool> {
        let resp: Envelope<serde_json::Value> = self
            .http
            .put(self.url(&format!("/object/item/{}", item.id)))
            .json(item)
            .send()?
            .json()?;
        Ok(resp.success)
    }

    fn totp(&self, id: &str) -> Result<Option<String>> {
        let resp: Envelope<ValueData> = self.get(&format!("/object/totp/{id}"))?;
        if !resp.success {
            return Ok(None);
        }
        Ok(resp.data.map(|d| d.data))
    }

    fn logout(&self) -> Result<bool> {
        let resp: Envelope<serde_json::Value> = self.post("/logout", None)?;
        Ok(resp.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthState;

    #[test]
    fn status_envelope_parses() {
        let raw = r#"{
            "success": true,
            "data": {
                "template": {
                    "object": "template",
                    "serverUrl": null,
                    "lastSync": null,
                    "userEmail": "user@example.com",
                    "status": "unlocked"
                }
            }
        }"#;
        let envelope: Envelope<StatusData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.success);
        let status = envelope.data.unwrap().template;
        assert_eq!(status.state, AuthState::Unlocked);
    }

    #[test]
    fn soft_failure_envelope_carries_no_data() {
        let raw = r#"{"success": false, "message": "Vault is locked."}"#;
        let envelope: Envelope<ListData<VaultItem>> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn unlock_envelope_carries_the_session_token() {
        let raw = r#"{
            "success": true,
            "data": {"noColor": false, "object": "message", "title": "unlocked", "raw": "tok123"}
        }"#;
        let envelope: Envelope<RawData> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.unwrap().raw.as_deref(), Some("tok123"));
    }
}
