//! X.509 certificate bound to a token
//!
//! The DER bytes are the source of truth; the few fields the core needs
//! (subject, key usage, public key) are extracted once at construction.

use std::fmt;

use pkcs8::der::pem;
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

/// Public key algorithm of a certificate's subject key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    EcP256,
    EcP384,
}

/// Subset of the KeyUsage extension that decides what a key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
}

impl KeyUsageFlags {
    /// Signing keys carry non-repudiation, or a bare digital signature bit
    pub fn can_sign(&self) -> bool {
        self.non_repudiation
            || (self.digital_signature && !(self.key_encipherment || self.data_encipherment))
    }

    pub fn can_authenticate(&self) -> bool {
        self.key_encipherment || self.data_encipherment
    }
}

/// DER-encoded X.509 public-key certificate
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    common_name: Option<String>,
    serial: String,
    key_usage: Option<KeyUsageFlags>,
    public_key_der: Vec<u8>,
    key_algorithm: Option<KeyAlgorithm>,
}

impl Certificate {
    /// Parse a DER certificate
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::Malformed` if the bytes are not an X.509 certificate
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, CertificateError> {
        let der = der.into();
        let (_, cert) = X509Certificate::from_der(&der).map_err(|e| CertificateError::Malformed {
            reason: e.to_string(),
        })?;

        let subject = cert.subject().to_string();
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let serial = cert.raw_serial_as_string();
        let key_usage = cert
            .key_usage()
            .map_err(|e| CertificateError::Malformed {
                reason: format!("KeyUsage extension: {e}"),
            })?
            .map(|ext| KeyUsageFlags {
                digital_signature: ext.value.digital_signature(),
                non_repudiation: ext.value.non_repudiation(),
                key_encipherment: ext.value.key_encipherment(),
                data_encipherment: ext.value.data_encipherment(),
            });
        let spki = cert.public_key();
        let public_key_der = spki.raw.to_vec();
        let key_algorithm = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => Some(KeyAlgorithm::Rsa {
                bits: rsa.key_size(),
            }),
            Ok(PublicKey::EC(point)) => match point.data().len() {
                65 => Some(KeyAlgorithm::EcP256),
                97 => Some(KeyAlgorithm::EcP384),
                _ => None,
            },
            _ => None,
        };

        Ok(Self {
            der,
            subject,
            common_name,
            serial,
            key_usage,
            public_key_der,
            key_algorithm,
        })
    }

    /// Parse a single PEM `CERTIFICATE` block
    pub fn from_pem(pem_text: &str) -> Result<Self, CertificateError> {
        let (label, der) =
            pem::decode_vec(pem_text.as_bytes()).map_err(|e| CertificateError::Malformed {
                reason: format!("PEM: {e}"),
            })?;
        if label != "CERTIFICATE" {
            return Err(CertificateError::Malformed {
                reason: format!("unexpected PEM label {label}"),
            });
        }
        Self::from_der(der)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// Subject distinguished name in RFC 4514 form
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// KeyUsage extension, `None` when the certificate carries none
    pub fn key_usage(&self) -> Option<KeyUsageFlags> {
        self.key_usage
    }

    /// Capabilities `(can_sign, can_authenticate)`; unrestricted without a KeyUsage extension
    pub fn capabilities(&self) -> (bool, bool) {
        match self.key_usage {
            Some(usage) => (usage.can_sign(), usage.can_authenticate()),
            None => (true, true),
        }
    }

    /// DER-encoded SubjectPublicKeyInfo
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    pub fn key_algorithm(&self) -> Option<KeyAlgorithm> {
        self.key_algorithm
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("serial", &self.serial)
            .field("der_len", &self.der.len())
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Malformed certificate: {reason}")]
    Malformed { reason: String },
}
