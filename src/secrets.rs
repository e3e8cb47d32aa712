//! Secret file handling
//!
//! Credentials and sensitive record names are supplied as file paths. Their
//! contents live in `Zeroizing` buffers and never reach the log stream.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};
use std::path::Path;

use anyhow::{Context as _, Result};
use zeroize::Zeroizing;

/// Reads a secret file, trimming surrounding whitespace
///
/// An empty file is not an error here; callers decide whether empty is
/// acceptable for the value they are loading.
pub fn read_secret_file(path: &Path) -> Result<Zeroizing<String>> {
    let raw = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read secret file {}", path.display()))?,
    );
    Ok(Zeroizing::new(raw.trim().to_string()))
}

/// Writes `contents` to `path`, creating or truncating it with `mode`
///
/// The mode is applied at creation and again afterwards, since an existing
/// file keeps its old permissions when opened.
pub fn write_file_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))
}

/// Redacts sensitive data (API tokens and zone IDs) from log messages
#[must_use]
pub fn redact_secrets(message: &str, secrets: &[&str]) -> String {
    let mut sanitized = message.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            sanitized = sanitized.replace(secret, "***REDACTED***");
        }
    }
    sanitized
}
