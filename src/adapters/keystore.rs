//! Directory key store
//!
//! Each alias is a pair of files in the store directory: `<alias>.crt`
//! (PEM or DER certificate) and `<alias>.key` (PEM `ENCRYPTED PRIVATE KEY`).
//! Certificates are read at `init()`; a private key is read from disk only
//! when its alias is authenticated.
//!
//! Session policy: [`SessionPolicy::Reject`]. A second `authenticate` while a
//! session is open fails with `SessionLimitExceeded`; call `reset()` first.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::soft_backend::{unlock_error, KeySource, SoftBackend, StoredToken};
use crate::error::{SigFactoryError, SigFactoryResult};
use crate::logic::{split_pem_bundle, SoftKey};
use crate::model::{BackendKind, Certificate, Credential, SessionPolicy};

const CERTIFICATE_EXTENSION: &str = "crt";
const KEY_EXTENSION: &str = "key";

pub struct KeystoreSource {
    dir: PathBuf,
}

impl KeystoreSource {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Keystore backend (type `JKS`)
pub type KeystoreBackend = SoftBackend<KeystoreSource>;

impl KeystoreBackend {
    /// Backend over the store directory `dir`; `max_attempts` of `None` never locks
    pub fn new(dir: impl Into<PathBuf>, max_attempts: Option<u8>) -> Self {
        SoftBackend::with_source(KeystoreSource { dir: dir.into() }, max_attempts)
    }
}

fn read_certificate(path: &Path) -> SigFactoryResult<Certificate> {
    let bytes = fs::read(path)
        .map_err(|e| SigFactoryError::initialization(format!("reading {}: {e}", path.display())))?;
    let parsed = match std::str::from_utf8(&bytes) {
        Ok(text) if text.trim_start().starts_with("-----BEGIN") => Certificate::from_pem(text),
        _ => Certificate::from_der(bytes),
    };
    parsed.map_err(|e| SigFactoryError::initialization(format!("{}: {e}", path.display())))
}

impl KeySource for KeystoreSource {
    /// Path of the alias' key file
    type Entry = PathBuf;

    fn kind(&self) -> BackendKind {
        BackendKind::Keystore
    }

    fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::Reject
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn load(&self) -> SigFactoryResult<Vec<StoredToken<PathBuf>>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SigFactoryError::initialization(format!("opening {}: {e}", self.dir.display()))
        })?;

        let mut aliases = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SigFactoryError::initialization(e.to_string()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CERTIFICATE_EXTENSION) {
                continue;
            }
            let Some(alias) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let key_path = path.with_extension(KEY_EXTENSION);
            if !key_path.is_file() {
                warn!(alias, "certificate without private key skipped");
                continue;
            }
            aliases.push((alias.to_string(), path.clone(), key_path));
        }
        aliases.sort_by(|a, b| a.0.cmp(&b.0));

        let token_name = self
            .dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.location());
        aliases
            .into_iter()
            .map(|(alias, cert_path, key_path)| {
                Ok(StoredToken {
                    label: alias,
                    token_name: token_name.clone(),
                    certificate: read_certificate(&cert_path)?,
                    entry: key_path,
                })
            })
            .collect()
    }

    fn unlock(&self, entry: &PathBuf, credential: &Credential) -> SigFactoryResult<SoftKey> {
        let text = fs::read_to_string(entry).map_err(|e| {
            SigFactoryError::initialization(format!("reading {}: {e}", entry.display()))
        })?;
        let block = split_pem_bundle(&text)
            .map_err(|e| SigFactoryError::initialization(format!("{}: {e}", entry.display())))?
            .into_iter()
            .find(|block| block.label == "ENCRYPTED PRIVATE KEY")
            .ok_or_else(|| {
                SigFactoryError::initialization(format!(
                    "{} holds no encrypted private key",
                    entry.display()
                ))
            })?;
        SoftKey::from_encrypted_pkcs8_der(&block.der, credential.as_bytes()).map_err(unlock_error)
    }
}
