//! Lifecycle of the locally-spawned vault-CLI server process.
//!
//! The spawned server is an owned resource with explicit start/kill
//! operations, never an ambient global. The [`VaultServer`] trait is the seam
//! that lets tests substitute a fake server.

use crate::error::Result;
use crate::progress::{ProgressReporter, ScaledProgress};
use crate::update::{DownloadLocation, Installer, UpdateChannel};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Vendor env var pinning the CLI's app-data directory.
const APPDATA_ENV: &str = "BITWARDENCLI_APPDATA_DIR";
/// Vendor env var pre-authenticating a spawned server.
const SESSION_ENV: &str = "BW_SESSION";

const REACHABLE_ATTEMPTS: u32 = 40;
const REACHABLE_DELAY: Duration = Duration::from_millis(250);

/// Lifecycle operations of the vault-CLI server, owned by one controller.
pub trait VaultServer {
    /// True iff the CLI binary is present at its configured path.
    fn exists(&self) -> bool;

    /// Launch the binary as a background API server and wait for it to
    /// become reachable. Passing a session token pre-authenticates the
    /// spawned server. Start failure is reported as `false`, not raised.
    fn start(&mut self, session_token: Option<&str>) -> bool;

    /// Forcibly terminate the server process. No-op when none is running.
    fn kill(&mut self);

    /// True iff a server process is currently known to be running.
    fn is_attached(&self) -> bool;

    /// One-shot CLI `logout` invocation, used after the server is dead.
    /// Failures are swallowed.
    fn logout_best_effort(&mut self);
}

/// Owner of the vault-CLI binary path and its spawned server process.
pub struct ProcessHandle {
    bin_path: PathBuf,
    app_data_dir: PathBuf,
    port: u16,
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn new(
        bin_path: impl Into<PathBuf>,
        app_data_dir: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            bin_path: bin_path.into(),
            app_data_dir: app_data_dir.into(),
            port,
            child: None,
        }
    }

    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    /// Version string of the installed binary, via a one-shot `--version`
    /// invocation. `None` when the binary is absent or the call fails.
    pub fn installed_version(&self) -> Option<String> {
        if !self.exists() {
            return None;
        }
        let output = Command::new(&self.bin_path).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }

    /// Query the update channel; returns a location only if a build newer
    /// than the installed one exists.
    pub fn check_for_update(
        &self,
        channel: &dyn UpdateChannel,
    ) -> Result<Option<DownloadLocation>> {
        channel.check(self.installed_version().as_deref())
    }

    /// Download and install the update. Download occupies the first half of
    /// the progress range, install the second half.
    pub fn apply_update(
        &mut self,
        location: &DownloadLocation,
        channel: &dyn UpdateChannel,
        installer: &dyn Installer,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        // A running binary cannot be overwritten.
        if self.is_attached() {
            self.kill();
        }
        let artifact = channel.download(location, &mut ScaledProgress::new(progress, 0.0, 0.5))?;
        installer.install(
            &artifact,
            &self.bin_path,
            &mut ScaledProgress::new(progress, 0.5, 1.0),
        )?;
        tracing::info!(
            version = %location.version,
            path = %self.bin_path.display(),
            "vault CLI updated"
        );
        Ok(())
    }

    fn wait_reachable(&mut self) -> bool {
        for _ in 0..REACHABLE_ATTEMPTS {
            // The child can exit immediately (port taken, corrupt binary).
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    tracing::warn!(%status, "vault server exited during startup");
                    self.child = None;
                    return false;
                }
            }
            if probe_status(self.port) {
                return true;
            }
            std::thread::sleep(REACHABLE_DELAY);
        }
        false
    }
}

impl VaultServer for ProcessHandle {
    fn exists(&self) -> bool {
        self.bin_path.is_file()
    }

    fn start(&mut self, session_token: Option<&str>) -> bool {
        if self.child.is_some() {
            return true;
        }
        let mut command = Command::new(&self.bin_path);
        command
            .arg("serve")
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--hostname")
            .arg("localhost")
            .env(APPDATA_ENV, &self.app_data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(token) = session_token {
            command.env(SESSION_ENV, token);
        }

        match command.spawn() {
            Ok(child) => {
                tracing::info!(port = self.port, "vault server starting");
                self.child = Some(child);
                if self.wait_reachable() {
                    true
                } else {
                    tracing::warn!("vault server never became reachable");
                    self.kill();
                    false
                }
            }
            Err(err) => {
                tracing::warn!("failed to spawn vault server: {err}");
                false
            }
        }
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::debug!("vault server kill failed: {err}");
            }
            let _ = child.wait();
        }
    }

    fn is_attached(&self) -> bool {
        self.child.is_some()
    }

    fn logout_best_effort(&mut self) {
        if !self.exists() {
            return;
        }
        let result = Command::new(&self.bin_path)
            .arg("logout")
            .env(APPDATA_ENV, &self.app_data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output();
        if let Err(err) = result {
            tracing::debug!("one-shot logout failed: {err}");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

fn probe_status(port: u16) -> bool {
    let url = format!("http://localhost:{port}/status");
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .map(|client| client.get(&url).send().is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_degrades_cleanly() {
        let handle = ProcessHandle::new("/nonexistent/vault-cli", "/tmp/appdata", 8087);
        assert!(!handle.exists());
        assert!(handle.installed_version().is_none());
    }

    #[test]
    fn kill_without_a_running_server_is_a_no_op() {
        let mut handle = ProcessHandle::new("/nonexistent/vault-cli", "/tmp/appdata", 8087);
        handle.kill();
        assert!(!handle.is_attached());
    }

    #[test]
    fn existing_binary_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("vault-cli");
        std::fs::write(&bin, b"").unwrap();
        let handle = ProcessHandle::new(&bin, dir.path(), 8087);
        assert!(handle.exists());
    }
}
