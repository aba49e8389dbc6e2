//! Fixtures shared by the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pkcs8::der::pem::LineEnding;
use pkcs8::pkcs5::pbes2;
use pkcs8::{EncodePrivateKey, PrivateKeyInfo};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, KeyUsagePurpose};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;

pub const PASSWORD: &str = "integration-pass";

static KEYS: [OnceLock<RsaPrivateKey>; 2] = [OnceLock::new(), OnceLock::new()];

#[derive(Debug, Clone, Copy)]
pub enum Usage {
    Signing,
    Authentication,
}

pub fn rsa_key(n: usize) -> RsaPrivateKey {
    KEYS[n]
        .get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation"))
        .clone()
}

fn certificate_pem(cn: &str, usage: Usage, key: &RsaPrivateKey) -> String {
    let key_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256).unwrap();

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
    };
    params.self_signed(&key_pair).unwrap().pem()
}

fn encrypted_key_pem(key: &RsaPrivateKey, password: &str) -> String {
    let der = key.to_pkcs8_der().unwrap();
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &[3u8; 16], &[5u8; 16]).unwrap();
    let encrypted = PrivateKeyInfo::try_from(der.as_bytes())
        .unwrap()
        .encrypt_with_params(params, password)
        .unwrap();
    pkcs8::der::pem::encode_string("ENCRYPTED PRIVATE KEY", LineEnding::LF, encrypted.as_bytes())
        .unwrap()
}

/// Container with a signing key (RSA key 0) and an authentication key (RSA key 1)
pub fn write_container(dir: &Path) -> PathBuf {
    let path = dir.join("keys.pem");
    let mut bundle = String::new();
    for (cn, usage, n) in [
        ("Signing Key 1", Usage::Signing, 0),
        ("Auth Key 1", Usage::Authentication, 1),
    ] {
        let key = rsa_key(n);
        bundle.push_str(&certificate_pem(cn, usage, &key));
        bundle.push_str(&encrypted_key_pem(&key, PASSWORD));
    }
    fs::write(&path, bundle).unwrap();
    path
}

/// Keystore directory with `auth` (RSA key 1) and `signer` (RSA key 0) entries
pub fn write_keystore(dir: &Path) -> PathBuf {
    let store = dir.join("store");
    fs::create_dir_all(&store).unwrap();
    for (alias, usage, n) in [("signer", Usage::Signing, 0), ("auth", Usage::Authentication, 1)] {
        let key = rsa_key(n);
        fs::write(store.join(format!("{alias}.crt")), certificate_pem(alias, usage, &key)).unwrap();
        fs::write(store.join(format!("{alias}.key")), encrypted_key_pem(&key, PASSWORD)).unwrap();
    }
    store
}

pub fn container_config(path: &Path, max_attempts: Option<u8>) -> String {
    let mut toml = format!("backend = \"PKCS12\"\n\n[container]\npath = {:?}\n", path);
    if let Some(max) = max_attempts {
        toml.push_str(&format!("max_attempts = {max}\n"));
    }
    toml
}

pub fn keystore_config(dir: &Path) -> String {
    format!("backend = \"JKS\"\n\n[keystore]\ndir = {:?}\n", dir)
}
