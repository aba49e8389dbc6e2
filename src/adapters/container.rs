//! Password-protected software key container
//!
//! A container is a single PEM file holding certificates and
//! `ENCRYPTED PRIVATE KEY` blocks (PKCS#8, PBES2). The n-th key belongs to
//! the n-th certificate. The file is read once at `init()`; its directory
//! never changes for the lifetime of the backend.
//!
//! Session policy: [`SessionPolicy::Preempt`]. Every key is available after
//! one password check, so switching tokens or roles simply replaces the
//! in-memory key of the previous session.

use std::fs;
use std::path::{Path, PathBuf};

use super::soft_backend::{unlock_error, KeySource, SoftBackend, StoredToken};
use crate::error::{SigFactoryError, SigFactoryResult};
use crate::logic::{split_pem_bundle, SoftKey};
use crate::model::{BackendKind, Certificate, Credential, SessionPolicy};

const CERTIFICATE: &str = "CERTIFICATE";
const ENCRYPTED_KEY: &str = "ENCRYPTED PRIVATE KEY";

pub struct ContainerSource {
    path: PathBuf,
}

impl ContainerSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Software-container backend (type `PKCS12`)
pub type ContainerBackend = SoftBackend<ContainerSource>;

impl ContainerBackend {
    /// Backend over the container at `path`; `max_attempts` of `None` never locks
    pub fn new(path: impl Into<PathBuf>, max_attempts: Option<u8>) -> Self {
        SoftBackend::with_source(ContainerSource { path: path.into() }, max_attempts)
    }
}

impl KeySource for ContainerSource {
    /// Encrypted PKCS#8 bytes, decrypted on every authentication
    type Entry = Vec<u8>;

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::Preempt
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> SigFactoryResult<Vec<StoredToken<Vec<u8>>>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            SigFactoryError::initialization(format!("reading {}: {e}", self.path.display()))
        })?;
        let blocks = split_pem_bundle(&text).map_err(|e| {
            SigFactoryError::initialization(format!("parsing {}: {e}", self.path.display()))
        })?;

        let mut certificates = Vec::new();
        let mut keys = Vec::new();
        for block in blocks {
            match block.label.as_str() {
                CERTIFICATE => {
                    let certificate = Certificate::from_der(block.der).map_err(|e| {
                        SigFactoryError::initialization(format!("{}: {e}", self.path.display()))
                    })?;
                    certificates.push(certificate);
                }
                ENCRYPTED_KEY => keys.push(block.der),
                "PRIVATE KEY" | "RSA PRIVATE KEY" | "EC PRIVATE KEY" => {
                    return Err(SigFactoryError::initialization(format!(
                        "{} holds an unencrypted private key",
                        self.path.display()
                    )));
                }
                _ => {}
            }
        }
        if certificates.len() != keys.len() {
            return Err(SigFactoryError::initialization(format!(
                "{} holds {} certificates but {} keys",
                self.path.display(),
                certificates.len(),
                keys.len()
            )));
        }

        let token_name = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.location());
        Ok(certificates
            .into_iter()
            .zip(keys)
            .enumerate()
            .map(|(n, (certificate, entry))| StoredToken {
                label: certificate
                    .common_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Key {}", n + 1)),
                token_name: token_name.clone(),
                certificate,
                entry,
            })
            .collect())
    }

    fn unlock(&self, entry: &Vec<u8>, credential: &Credential) -> SigFactoryResult<SoftKey> {
        SoftKey::from_encrypted_pkcs8_der(entry, credential.as_bytes()).map_err(unlock_error)
    }
}
