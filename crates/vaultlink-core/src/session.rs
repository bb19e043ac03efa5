//! Vault session controller.
//!
//! Orchestrates the spawned server and the API client behind one rule: every
//! operation runs against an unlocked vault and the vault is re-locked
//! afterward. The master password is prompted exactly when needed, cached
//! in memory for the controller's lifetime, and never persisted or logged.

use crate::api::VaultApi;
use crate::error::{Error, Result};
use crate::models::{AuthState, Credential, VaultStatus};
use crate::process::VaultServer;
use crate::prompt::CredentialPrompt;
use std::path::{Path, PathBuf};

/// Construction options for [`SessionController`].
pub struct SessionOptions {
    /// The CLI's app-data directory, deleted best-effort on logout.
    pub app_data_dir: PathBuf,
    /// Re-lock the vault after every operation. Disable only for interactive
    /// development sessions; the default configuration keeps it on.
    pub auto_lock: bool,
}

/// Single logical vault session. Owns the spawned server, the cached master
/// credential, and the lock state machine; callers never drive `AuthState`
/// directly. `&mut self` on every entry point keeps operations serialized
/// and rules out re-entrant calls.
pub struct SessionController<A: VaultApi, S: VaultServer> {
    api: A,
    server: S,
    prompt: Box<dyn CredentialPrompt>,
    cached: Option<Credential>,
    app_data_dir: PathBuf,
    auto_lock: bool,
}

impl<A: VaultApi, S: VaultServer> SessionController<A, S> {
    pub fn new(api: A, server: S, prompt: Box<dyn CredentialPrompt>, options: SessionOptions) -> Self {
        Self {
            api,
            server,
            prompt,
            cached: None,
            app_data_dir: options.app_data_dir,
            auto_lock: options.auto_lock,
        }
    }

    /// Current vault status. Degrades to a synthesized `Unauthenticated` when
    /// the binary is missing, the server will not start, or the query fails;
    /// none of those are errors here.
    pub fn status(&mut self) -> VaultStatus {
        if !self.server.exists() {
            return VaultStatus::unauthenticated();
        }
        if !self.server.is_attached() && !self.server.start(None) {
            return VaultStatus::unauthenticated();
        }
        self.api
            .status()
            .unwrap_or_else(|_| VaultStatus::unauthenticated())
    }

    /// Run `operation` against an unlocked vault.
    ///
    /// Ensures the server is attached (starting it on demand), unlocks the
    /// vault (prompting as needed; [`Error::Cancelled`] when the user
    /// abandons the prompt), runs the operation, and re-locks the vault on
    /// every exit path unless auto-lock is disabled.
    pub fn run_with_unlocked_vault<T>(
        &mut self,
        operation: impl FnOnce(&A) -> Result<T>,
    ) -> Result<T> {
        self.ensure_attached()?;
        let outcome = self.ensure_unlocked().and_then(|()| operation(&self.api));
        if self.auto_lock {
            if let Err(err) = self.api.lock() {
                tracing::debug!("re-lock after operation failed: {err}");
            }
        }
        outcome
    }

    /// Explicit login entry point: prompts until a session token is issued or
    /// the user cancels. A no-op when a user is already logged in.
    pub fn login(&mut self) -> Result<VaultStatus> {
        self.ensure_attached()?;
        let status = self.api.status()?;
        if status.state == AuthState::Unauthenticated {
            self.login_loop()?;
            return self.api.status();
        }
        Ok(status)
    }

    /// Log out and clean up: kill the server, best-effort logout, best-effort
    /// app-data removal, drop the cached credential. Never raises.
    pub fn logout(&mut self) {
        self.server.kill();
        // The server is dead by now; the one-shot CLI logout below is what
        // actually clears the vendor session.
        if let Err(err) = self.api.logout() {
            tracing::debug!("api logout failed: {err}");
        }
        self.server.logout_best_effort();
        remove_dir_best_effort(&self.app_data_dir);
        self.cached = None;
        tracing::info!("logged out");
    }

    fn ensure_attached(&mut self) -> Result<()> {
        if self.server.is_attached() {
            return Ok(());
        }
        if !self.server.exists() {
            tracing::info!("vault CLI binary not present; session unavailable");
            return Err(Error::Unavailable);
        }
        if !self.server.start(None) {
            return Err(Error::Unavailable);
        }
        Ok(())
    }

    fn ensure_unlocked(&mut self) -> Result<()> {
        let status = self.api.status()?;
        match status.state {
            AuthState::Unlocked => Ok(()),
            AuthState::Locked => self.unlock_loop(&status),
            AuthState::Unauthenticated => self.login_loop(),
        }
    }

    fn unlock_loop(&mut self, status: &VaultStatus) -> Result<()> {
        // A different logged-in identity invalidates the cached credential.
        if let (Some(cached), Some(email)) = (self.cached.as_ref(), status.user_email.as_deref()) {
            if !cached.email.eq_ignore_ascii_case(email) {
                self.cached = None;
            }
        }

        // Try the cached master password before prompting; the server can
        // re-lock on its own between operations.
        let had_cached = self.cached.is_some();
        if let Some(cached) = self.cached.as_ref() {
            if self.api.unlock(&cached.password)? {
                return Ok(());
            }
        }
        if had_cached {
            self.cached = None;
        }

        let seed = status.user_email.clone();
        loop {
            let Some(credential) = self.prompt.prompt(seed.as_deref()) else {
                return Err(Error::Cancelled);
            };
            // Blank input re-prompts; it is not a cancellation.
            if credential.password.is_empty() {
                continue;
            }
            if self.api.unlock(&credential.password)? {
                self.cached = Some(credential);
                return Ok(());
            }
            tracing::info!("master password rejected; prompting again");
        }
    }

    fn login_loop(&mut self) -> Result<()> {
        let mut seed = self.cached.as_ref().map(|c| c.email.clone());
        loop {
            let Some(credential) = self.prompt.prompt(seed.as_deref()) else {
                return Err(Error::Cancelled);
            };
            if credential.email.trim().is_empty() || credential.password.is_empty() {
                continue;
            }
            match self.api.login(&credential.email, &credential.password)? {
                Some(token) => {
                    // Restart the server pre-authenticated with the token.
                    self.server.kill();
                    if !self.server.start(Some(&token)) {
                        return Err(Error::Unavailable);
                    }
                    self.cached = Some(credential);
                    return Ok(());
                }
                None => {
                    tracing::info!("login rejected; prompting again");
                    seed = Some(credential.email.clone());
                }
            }
        }
    }
}

impl<A: VaultApi, S: VaultServer> Drop for SessionController<A, S> {
    fn drop(&mut self) {
        if self.server.is_attached() {
            let _ = self.api.lock();
            self.server.kill();
        }
    }
}

/// Delete a directory tree. Falls back to deleting entries one by one when
/// the bulk removal fails, silently skipping files that still fail.
fn remove_dir_best_effort(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if std::fs::remove_dir_all(dir).is_ok() {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(err) = result {
            tracing::debug!(path = %path.display(), "skipped during logout cleanup: {err}");
        }
    }
    let _ = std::fs::remove_dir(dir);
}
