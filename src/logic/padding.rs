//! PKCS#1 v1.5 encoding helpers
//!
//! Hardware tokens sign raw blocks, so the DigestInfo structure and the
//! EMSA-PKCS1-v1_5 block are built here. The DigestInfo prefixes come from
//! [`rsa::Pkcs1v15Sign`], keyed by each hash's object identifier.

use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;

use crate::model::HashAlgorithm;

/// Minimum number of 0xff / random padding bytes in a PKCS#1 v1.5 block
const MIN_PADDING: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaddingError {
    #[error("key of {modulus_len} bytes too short for a {needed} byte encoding")]
    KeyTooShort { modulus_len: usize, needed: usize },

    #[error("decryption block is not PKCS#1 v1.5 type 2")]
    MalformedBlock,
}

/// Signature scheme for a prehashed digest of the given algorithm
pub fn pkcs1v15_scheme(hash: HashAlgorithm) -> Pkcs1v15Sign {
    match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// Build the EMSA-PKCS1-v1_5 block `00 01 ff.. 00 || DigestInfo || digest`
///
/// # Arguments
///
/// * `modulus_len` - Size of the RSA modulus in bytes
pub fn emsa_pkcs1_v15(
    hash: HashAlgorithm,
    digest: &[u8],
    modulus_len: usize,
) -> Result<Vec<u8>, PaddingError> {
    let prefix = pkcs1v15_scheme(hash).prefix;
    let t_len = prefix.len() + digest.len();
    let needed = t_len + MIN_PADDING + 3;
    if modulus_len < needed {
        return Err(PaddingError::KeyTooShort {
            modulus_len,
            needed,
        });
    }

    let mut block = Vec::with_capacity(modulus_len);
    block.extend_from_slice(&[0x00, 0x01]);
    block.resize(modulus_len - t_len - 1, 0xff);
    block.push(0x00);
    block.extend_from_slice(&prefix);
    block.extend_from_slice(digest);
    Ok(block)
}

/// Strip `00 02 <nonzero padding> 00` from a raw RSA decryption result
pub fn strip_pkcs1_v15_type2(block: &[u8]) -> Result<Vec<u8>, PaddingError> {
    if block.len() < MIN_PADDING + 3 || block[0] != 0x00 || block[1] != 0x02 {
        return Err(PaddingError::MalformedBlock);
    }
    let separator = block[2..]
        .iter()
        .position(|&b| b == 0x00)
        .ok_or(PaddingError::MalformedBlock)?;
    if separator < MIN_PADDING {
        return Err(PaddingError::MalformedBlock);
    }
    Ok(block[2 + separator + 1..].to_vec())
}
