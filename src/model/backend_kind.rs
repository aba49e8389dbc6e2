//! Backend classes and the type identifiers the dispatcher routes on

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Type identifier of the driver-backed hardware token backend
pub const TYPE_PKCS11: &str = "PKCS11";
/// Type identifier of the password-protected software key container backend
pub const TYPE_PKCS12: &str = "PKCS12";
/// Type identifier of the directory key store backend
pub const TYPE_JKS: &str = "JKS";

/// Class of key storage behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Hardware security token: PIN-gated, one login per slot
    Hardware,
    /// Software key container: opened once, all keys held in memory
    Software,
    /// Key store: one entry per alias, loaded on demand
    Keystore,
}

impl BackendKind {
    /// Built-in type identifier for this class
    pub fn type_id(self) -> &'static str {
        match self {
            BackendKind::Hardware => TYPE_PKCS11,
            BackendKind::Software => TYPE_PKCS12,
            BackendKind::Keystore => TYPE_JKS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Hardware => "hardware",
            BackendKind::Software => "software",
            BackendKind::Keystore => "keystore",
        }
    }

    /// Normalize a declared backend string to its canonical type identifier.
    ///
    /// Built-in identifiers and class names resolve to the built-in identifier;
    /// anything else is upper-cased so custom registrations match regardless of case.
    pub fn normalize_type_id(declared: &str) -> String {
        match declared.parse::<BackendKind>() {
            Ok(kind) => kind.type_id().to_string(),
            Err(_) => declared.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pkcs11" | "hardware" => Ok(BackendKind::Hardware),
            "pkcs12" | "software" => Ok(BackendKind::Software),
            "jks" | "keystore" => Ok(BackendKind::Keystore),
            _ => Err(BackendKindError::Unknown {
                declared: s.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendKindError {
    #[error("Unknown backend kind: {declared}")]
    Unknown { declared: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_ids() {
        assert_eq!("PKCS11".parse::<BackendKind>().unwrap(), BackendKind::Hardware);
        assert_eq!("pkcs12".parse::<BackendKind>().unwrap(), BackendKind::Software);
        assert_eq!("Jks".parse::<BackendKind>().unwrap(), BackendKind::Keystore);
    }

    #[test]
    fn test_parse_class_names() {
        assert_eq!("hardware".parse::<BackendKind>().unwrap(), BackendKind::Hardware);
        assert_eq!(" keystore ".parse::<BackendKind>().unwrap(), BackendKind::Keystore);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            "tpm".parse::<BackendKind>(),
            Err(BackendKindError::Unknown { .. })
        ));
    }

    #[test]
    fn test_normalize_type_id() {
        assert_eq!(BackendKind::normalize_type_id("software"), TYPE_PKCS12);
        assert_eq!(BackendKind::normalize_type_id("tpm2"), "TPM2");
    }
}
