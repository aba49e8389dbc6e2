//! Key and certificate fixtures for unit tests

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use pkcs8::der::pem::LineEnding;
use pkcs8::pkcs5::pbes2;
use pkcs8::{EncodePrivateKey, PrivateKeyInfo};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, KeyUsagePurpose};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;

use crate::model::Certificate;

pub const PASSWORD: &str = "correct-pass";

static RSA_KEYS: [OnceLock<RsaPrivateKey>; 4] = [
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
];

/// Key usage to put in a test certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// digitalSignature + nonRepudiation
    Signing,
    /// digitalSignature + keyEncipherment
    Authentication,
    /// no KeyUsage extension
    Unrestricted,
}

/// One of four cached 2048-bit RSA keys
pub fn rsa_key(n: usize) -> RsaPrivateKey {
    RSA_KEYS[n]
        .get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation"))
        .clone()
}

/// Self-signed certificate over the cached RSA key 0
pub fn self_signed(cn: &str, usage: Usage) -> (Certificate, RsaPrivateKey) {
    let key = rsa_key(0);
    (self_signed_with(cn, usage, &key), key)
}

/// Self-signed certificate over a given RSA key
pub fn self_signed_with(cn: &str, usage: Usage, key: &RsaPrivateKey) -> Certificate {
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let key_pair = KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256).unwrap();
    certify(cn, usage, &key_pair)
}

/// Self-signed P-256 certificate and its unencrypted PKCS#8 key
pub fn ec_self_signed(cn: &str, usage: Usage) -> (Certificate, Vec<u8>) {
    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    (certify(cn, usage, &key_pair), key_pair.serialize_der())
}

pub fn ec_key_der() -> Vec<u8> {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .unwrap()
        .serialize_der()
}

fn certify(cn: &str, usage: Usage, key_pair: &KeyPair) -> Certificate {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.key_usages = match usage {
        Usage::Signing => vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ],
        Usage::Authentication => vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
        Usage::Unrestricted => Vec::new(),
    };
    let cert = params.self_signed(key_pair).unwrap();
    Certificate::from_der(cert.der().to_vec()).unwrap()
}

/// Encrypt a PKCS#8 key with PBES2 (PBKDF2-SHA256, AES-256-CBC)
pub fn encrypt_pkcs8(der: &[u8], password: &str) -> Vec<u8> {
    let salt = [7u8; 16];
    let iv = [9u8; 16];
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv).unwrap();
    PrivateKeyInfo::try_from(der)
        .unwrap()
        .encrypt_with_params(params, password)
        .unwrap()
        .as_bytes()
        .to_vec()
}

pub fn rsa_pkcs8_der(key: &RsaPrivateKey) -> Vec<u8> {
    key.to_pkcs8_der().unwrap().as_bytes().to_vec()
}

pub fn certificate_pem(cert: &Certificate) -> String {
    pkcs8::der::pem::encode_string("CERTIFICATE", LineEnding::LF, cert.as_der()).unwrap()
}

pub fn encrypted_key_pem(pkcs8_der: &[u8], password: &str) -> String {
    pkcs8::der::pem::encode_string(
        "ENCRYPTED PRIVATE KEY",
        LineEnding::LF,
        &encrypt_pkcs8(pkcs8_der, password),
    )
    .unwrap()
}

/// `(common name, usage, cached RSA key number)` of one stored key
pub type KeySpec<'a> = (&'a str, Usage, usize);

/// Write a PEM key container: each certificate followed by its encrypted key
pub fn write_container(path: &Path, keys: &[KeySpec<'_>], password: &str) {
    let mut bundle = String::new();
    for (cn, usage, n) in keys {
        let key = rsa_key(*n);
        bundle.push_str(&certificate_pem(&self_signed_with(cn, *usage, &key)));
        bundle.push_str(&encrypted_key_pem(&rsa_pkcs8_der(&key), password));
    }
    fs::write(path, bundle).unwrap();
}

/// Write a keystore directory with one `<alias>.crt` / `<alias>.key` pair per key
pub fn write_keystore(dir: &Path, keys: &[KeySpec<'_>], password: &str) {
    fs::create_dir_all(dir).unwrap();
    for (alias, usage, n) in keys {
        let key = rsa_key(*n);
        fs::write(
            dir.join(format!("{alias}.crt")),
            certificate_pem(&self_signed_with(alias, *usage, &key)),
        )
        .unwrap();
        fs::write(
            dir.join(format!("{alias}.key")),
            encrypted_key_pem(&rsa_pkcs8_der(&key), password),
        )
        .unwrap();
    }
}
