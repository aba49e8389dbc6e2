//! Mechanism type: the hash algorithm and signature scheme applied to a digest

use std::fmt;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;

/// Hash algorithm the caller used to produce a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Length in bytes of a digest produced by this algorithm
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Hash `data` with this algorithm.
    ///
    /// A convenience for callers preparing a digest; the executor itself never
    /// re-hashes.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = MechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(MechanismError::Unknown {
                mechanism: s.to_string(),
            }),
        }
    }
}

/// Signature scheme applied to the digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5 over a DigestInfo structure
    RsaPkcs1v15,
    /// ECDSA over the prehashed digest
    Ecdsa,
}

impl SignatureScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureScheme::RsaPkcs1v15 => "rsa",
            SignatureScheme::Ecdsa => "ecdsa",
        }
    }
}

/// Combination of hash algorithm and signature scheme selected per signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mechanism {
    pub hash: HashAlgorithm,
    pub scheme: SignatureScheme,
}

impl Mechanism {
    pub const RSA_SHA1: Mechanism = Mechanism::new(HashAlgorithm::Sha1, SignatureScheme::RsaPkcs1v15);
    pub const RSA_SHA256: Mechanism =
        Mechanism::new(HashAlgorithm::Sha256, SignatureScheme::RsaPkcs1v15);
    pub const RSA_SHA384: Mechanism =
        Mechanism::new(HashAlgorithm::Sha384, SignatureScheme::RsaPkcs1v15);
    pub const RSA_SHA512: Mechanism =
        Mechanism::new(HashAlgorithm::Sha512, SignatureScheme::RsaPkcs1v15);
    pub const ECDSA_SHA256: Mechanism = Mechanism::new(HashAlgorithm::Sha256, SignatureScheme::Ecdsa);
    pub const ECDSA_SHA384: Mechanism = Mechanism::new(HashAlgorithm::Sha384, SignatureScheme::Ecdsa);

    pub const fn new(hash: HashAlgorithm, scheme: SignatureScheme) -> Self {
        Self { hash, scheme }
    }

    /// Check that a digest has the length implied by this mechanism's hash
    pub fn check_digest(&self, digest: &[u8]) -> Result<(), MechanismError> {
        let expected = self.hash.digest_len();
        if digest.len() != expected {
            return Err(MechanismError::DigestLength {
                expected,
                actual: digest.len(),
            });
        }
        Ok(())
    }
}

impl Default for Mechanism {
    fn default() -> Self {
        Self::RSA_SHA256
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scheme.as_str(), self.hash.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = MechanismError;

    /// Parse identifiers such as `rsa-sha256` or `ecdsa-sha384`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || MechanismError::Unknown {
            mechanism: s.to_string(),
        };
        let (scheme, hash) = s.split_once('-').ok_or_else(unknown)?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "rsa" => SignatureScheme::RsaPkcs1v15,
            "ecdsa" => SignatureScheme::Ecdsa,
            _ => return Err(unknown()),
        };
        let hash = hash.parse::<HashAlgorithm>().map_err(|_| unknown())?;
        Ok(Self::new(hash, scheme))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MechanismError {
    #[error("Unknown mechanism: {mechanism}")]
    Unknown { mechanism: String },

    #[error("Digest must be {expected} bytes for this mechanism, got {actual}")]
    DigestLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mechanism() {
        assert_eq!("rsa-sha256".parse::<Mechanism>().unwrap(), Mechanism::RSA_SHA256);
        assert_eq!("ECDSA-SHA384".parse::<Mechanism>().unwrap(), Mechanism::ECDSA_SHA384);
        assert!("rsa".parse::<Mechanism>().is_err());
        assert!("dsa-sha256".parse::<Mechanism>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let mechanism = Mechanism::RSA_SHA512;
        assert_eq!(mechanism.to_string(), "rsa-sha512");
        assert_eq!(mechanism.to_string().parse::<Mechanism>().unwrap(), mechanism);
    }

    #[test]
    fn test_check_digest() {
        assert!(Mechanism::RSA_SHA256.check_digest(&[0u8; 32]).is_ok());
        assert_eq!(
            Mechanism::RSA_SHA256.check_digest(&[0u8; 20]).unwrap_err(),
            MechanismError::DigestLength {
                expected: 32,
                actual: 20
            }
        );
    }

    #[test]
    fn test_digest_lengths_match() {
        for hash in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(hash.digest(b"abc").len(), hash.digest_len());
        }
        assert_eq!(
            hex::encode(HashAlgorithm::Sha1.digest(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_default_mechanism() {
        assert_eq!(Mechanism::default(), Mechanism::RSA_SHA256);
    }
}
