//! Factory configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! backend = "PKCS12"          # PKCS11 | PKCS12 | JKS
//! operation_timeout_secs = 30 # optional
//!
//! [hardware]
//! module = "piv"
//!
//! [container]
//! path = "keys.pem"
//! max_attempts = 3
//!
//! [keystore]
//! dir = "/etc/sigfactory/store"
//! max_attempts = 5
//! ```
//!
//! Only the section of the selected backend is required.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::PIV_MODULE;
use crate::error::{SigFactoryError, SigFactoryResult};
use crate::model::BackendKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactoryConfig {
    /// Declared backend type identifier
    pub backend: String,

    #[serde(default)]
    pub hardware: Option<HardwareConfig>,

    #[serde(default)]
    pub container: Option<ContainerConfig>,

    #[serde(default)]
    pub keystore: Option<KeystoreConfig>,

    /// Deadline for one backend operation; none when absent
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardwareConfig {
    /// Driver module loaded through the driver registry
    #[serde(default = "default_module")]
    pub module: String,
}

fn default_module() -> String {
    PIV_MODULE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub path: PathBuf,
    /// Failed password attempts before the container locks
    #[serde(default)]
    pub max_attempts: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeystoreConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub max_attempts: Option<u8>,
}

impl FactoryConfig {
    /// Configuration with only the backend type set
    pub fn for_backend(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            hardware: None,
            container: None,
            keystore: None,
            operation_timeout_secs: None,
        }
    }

    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Initialization` if the document is not valid configuration
    pub fn from_toml_str(text: &str) -> SigFactoryResult<Self> {
        toml::from_str(text)
            .map_err(|e| SigFactoryError::initialization(format!("invalid configuration: {e}")))
    }

    /// Read and parse a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> SigFactoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SigFactoryError::initialization(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Canonical type identifier of the declared backend
    pub fn backend_type(&self) -> String {
        BackendKind::normalize_type_id(&self.backend)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    pub fn hardware(&self) -> SigFactoryResult<&HardwareConfig> {
        self.hardware.as_ref().ok_or_else(|| missing("hardware"))
    }

    pub fn container(&self) -> SigFactoryResult<&ContainerConfig> {
        self.container.as_ref().ok_or_else(|| missing("container"))
    }

    pub fn keystore(&self) -> SigFactoryResult<&KeystoreConfig> {
        self.keystore.as_ref().ok_or_else(|| missing("keystore"))
    }
}

fn missing(section: &str) -> SigFactoryError {
    SigFactoryError::initialization(format!("configuration has no [{section}] section"))
}
