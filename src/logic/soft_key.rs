//! Private keys held in process memory
//!
//! Used by the container and keystore backends. Keys are decoded from
//! (optionally password-encrypted) PKCS#8 and dropped with their session.

use p256::ecdsa::signature::hazmat::PrehashSigner;
use pkcs8::{DecodePrivateKey, EncodePublicKey, EncryptedPrivateKeyInfo};
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use thiserror::Error;

use super::padding::pkcs1v15_scheme;
use crate::model::{Mechanism, SignatureScheme};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoftKeyError {
    #[error("wrong password or corrupt encrypted key")]
    Decryption,

    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),

    #[error("mechanism {mechanism} does not fit a {key} key")]
    MechanismMismatch {
        mechanism: Mechanism,
        key: &'static str,
    },

    #[error("{0}")]
    Operation(String),
}

/// Private key decoded into memory
pub enum SoftKey {
    Rsa(Box<RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl SoftKey {
    /// Decode an unencrypted PKCS#8 `PrivateKeyInfo`
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, SoftKeyError> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(SoftKey::Rsa(Box::new(key)));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(SoftKey::P256(key));
        }
        p384::ecdsa::SigningKey::from_pkcs8_der(der)
            .map(SoftKey::P384)
            .map_err(|e| SoftKeyError::UnsupportedKey(e.to_string()))
    }

    /// Decrypt an `EncryptedPrivateKeyInfo` with `password`, then decode it
    pub fn from_encrypted_pkcs8_der(der: &[u8], password: &[u8]) -> Result<Self, SoftKeyError> {
        let info = EncryptedPrivateKeyInfo::try_from(der)
            .map_err(|e| SoftKeyError::UnsupportedKey(e.to_string()))?;
        let document = info
            .decrypt(password)
            .map_err(|_| SoftKeyError::Decryption)?;
        // a wrong key can still pass the CBC padding check; garbage then fails to decode
        Self::from_pkcs8_der(document.as_bytes()).map_err(|_| SoftKeyError::Decryption)
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            SoftKey::Rsa(_) => "RSA",
            SoftKey::P256(_) => "P-256",
            SoftKey::P384(_) => "P-384",
        }
    }

    /// DER-encoded SubjectPublicKeyInfo, comparable with a certificate's
    pub fn public_key_der(&self) -> Result<Vec<u8>, SoftKeyError> {
        let document = match self {
            SoftKey::Rsa(key) => key.to_public_key().to_public_key_der(),
            SoftKey::P256(key) => key.verifying_key().to_public_key_der(),
            SoftKey::P384(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| SoftKeyError::Operation(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Sign a prehashed digest
    ///
    /// RSA produces a PKCS#1 v1.5 signature over the DigestInfo; ECDSA
    /// produces the fixed-size `r || s` encoding.
    pub fn sign(&self, digest: &[u8], mechanism: Mechanism) -> Result<Vec<u8>, SoftKeyError> {
        match (self, mechanism.scheme) {
            (SoftKey::Rsa(key), SignatureScheme::RsaPkcs1v15) => key
                .sign_with_rng(&mut OsRng, pkcs1v15_scheme(mechanism.hash), digest)
                .map_err(|e| SoftKeyError::Operation(e.to_string())),
            (SoftKey::P256(key), SignatureScheme::Ecdsa) => {
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| SoftKeyError::Operation(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
            (SoftKey::P384(key), SignatureScheme::Ecdsa) => {
                let signature: p384::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| SoftKeyError::Operation(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
            _ => Err(SoftKeyError::MechanismMismatch {
                mechanism,
                key: self.algorithm(),
            }),
        }
    }

    /// Decrypt a PKCS#1 v1.5 ciphertext; EC keys cannot decrypt
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SoftKeyError> {
        match self {
            SoftKey::Rsa(key) => key
                .decrypt(Pkcs1v15Encrypt, ciphertext)
                .map_err(|e| SoftKeyError::Operation(e.to_string())),
            other => Err(SoftKeyError::Operation(format!(
                "{} keys cannot decrypt",
                other.algorithm()
            ))),
        }
    }
}

impl std::fmt::Debug for SoftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftKey({})", self.algorithm())
    }
}
