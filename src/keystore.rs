//! Keystore access
//!
//! Reads the node account from the keystore directory that `geth account new`
//! populates. The launcher never writes key files itself.

use crate::error::{LauncherError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Account address both nodes run under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// 40 hex digits, no `0x` prefix (as stored by geth)
    pub address: String,
}

/// The only part of a V3 key file we care about
#[derive(Debug, Deserialize)]
struct KeyFile {
    address: Option<String>,
}

/// Key files in the keystore, sorted by file name.
///
/// Geth names key files `UTC--<timestamp>--<address>`, so name order is
/// creation order.
fn key_files(keystore_dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(keystore_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();

    files.sort();
    files
}

/// Check whether the keystore holds at least one key file
pub fn has_credential(keystore_dir: &Path) -> bool {
    !key_files(keystore_dir).is_empty()
}

/// Read the current credential (the oldest key file in the keystore)
pub fn current_credential(keystore_dir: &Path) -> Result<Credential> {
    let files = key_files(keystore_dir);

    let path = files.first().ok_or_else(|| LauncherError::NoCredential {
        keystore: keystore_dir.to_path_buf(),
    })?;

    if files.len() > 1 {
        log::warn!(
            "Keystore {} holds {} key files, using {}",
            keystore_dir.display(),
            files.len(),
            path.display()
        );
    }

    read_key_file(path)
}

fn read_key_file(path: &Path) -> Result<Credential> {
    let corrupt = |reason: String| LauncherError::CorruptCredential {
        path: path.to_path_buf(),
        reason,
    };

    let contents = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    let key: KeyFile = serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))?;
    let raw = key
        .address
        .ok_or_else(|| corrupt("missing address field".to_string()))?;

    let address = raw.trim().trim_start_matches("0x").to_lowercase();
    match hex::decode(&address) {
        Ok(bytes) if bytes.len() == 20 => Ok(Credential { address }),
        Ok(bytes) => Err(corrupt(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        ))),
        Err(e) => Err(corrupt(format!("invalid address {:?}: {}", raw, e))),
    }
}
