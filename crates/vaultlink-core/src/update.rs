//! Versioned update channel for the vault CLI binary.
//!
//! A remote release manifest names the latest version and its artifact URL.
//! Downloading reports progress; installing is delegated to an [`Installer`],
//! since archive handling (picking the executable entry out of a zip by file
//! extension) belongs to the host application.

use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Where to fetch a newer CLI build from.
#[derive(Debug, Clone)]
pub struct DownloadLocation {
    pub url: String,
    pub version: String,
}

/// Remote source of CLI builds.
pub trait UpdateChannel {
    /// Returns a location only if a build newer than `installed` exists.
    fn check(&self, installed: Option<&str>) -> Result<Option<DownloadLocation>>;

    /// Fetch the artifact bytes, reporting download progress.
    fn download(
        &self,
        location: &DownloadLocation,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<u8>>;
}

/// Consumer of a downloaded artifact.
pub trait Installer {
    /// Place the artifact's executable at `dest`, reporting install progress.
    fn install(
        &self,
        artifact: &[u8],
        dest: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    version: String,
    url: String,
}

/// Update channel backed by an HTTP release manifest `{ "version", "url" }`.
pub struct HttpUpdateChannel {
    http: reqwest::blocking::Client,
    manifest_url: String,
}

impl HttpUpdateChannel {
    pub fn new(manifest_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::Transport)?;
        Ok(Self {
            http,
            manifest_url: manifest_url.into(),
        })
    }
}

impl UpdateChannel for HttpUpdateChannel {
    fn check(&self, installed: Option<&str>) -> Result<Option<DownloadLocation>> {
        let manifest: ReleaseManifest = self
            .http
            .get(self.manifest_url.as_str())
            .send()?
            .error_for_status()?
            .json()?;
        let newer = match installed {
            Some(current) => version_newer(&manifest.version, current),
            None => true,
        };
        tracing::debug!(
            remote = %manifest.version,
            installed = installed.unwrap_or("<none>"),
            newer,
            "checked update channel"
        );
        Ok(newer.then(|| DownloadLocation {
            url: manifest.url,
            version: manifest.version,
        }))
    }

    fn download(
        &self,
        location: &DownloadLocation,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<u8>> {
        let mut response = self.http.get(location.url.as_str()).send()?.error_for_status()?;
        let total = response.content_length().filter(|len| *len > 0);

        let mut artifact = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            let read = response.read(&mut buf)?;
            if read == 0 {
                break;
            }
            artifact.extend_from_slice(&buf[..read]);
            if let Some(total) = total {
                progress.report(artifact.len() as f64 / total as f64);
            }
        }
        progress.report(1.0);
        Ok(artifact)
    }
}

/// Installer for artifacts that are already a bare executable.
pub struct ExecutableInstaller;

impl Installer for ExecutableInstaller {
    fn install(
        &self,
        artifact: &[u8],
        dest: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        if artifact.is_empty() {
            return Err(Error::Update("downloaded artifact is empty".into()));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, artifact)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(dest)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(dest, perms)?;
        }
        progress.report(1.0);
        Ok(())
    }
}

/// True when `remote` is strictly newer than `installed`, comparing dotted
/// numeric segments. Non-numeric segments compare as zero.
fn version_newer(remote: &str, installed: &str) -> bool {
    fn segments(version: &str) -> Vec<u64> {
        version
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|seg| seg.parse().unwrap_or(0))
            .collect()
    }
    segments(remote) > segments(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;

    #[test]
    fn newer_versions_are_detected() {
        assert!(version_newer("2024.2.0", "2024.1.9"));
        assert!(version_newer("v2024.2.0", "2024.2"));
        assert!(!version_newer("2024.2.0", "2024.2.0"));
        assert!(!version_newer("2023.12.1", "2024.1.0"));
    }

    #[test]
    fn release_manifest_parses() {
        let raw = r#"{"version": "2024.2.0", "url": "https://example.com/cli.zip"}"#;
        let manifest: ReleaseManifest = serde_json::from_str(raw).unwrap();
        assert_eq!(manifest.version, "2024.2.0");
    }

    #[test]
    fn executable_installer_writes_the_binary() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cli");
        ExecutableInstaller
            .install(b"#!/bin/sh\n", &dest, &mut NullProgress)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"#!/bin/sh\n");
    }
}
