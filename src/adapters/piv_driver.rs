//! YubiKey PIV token driver
//!
//! Implements [`TokenDriver`] over the `yubikey` crate and PC/SC. Every
//! connected YubiKey is a token named after its reader; its PIV slots 9C
//! (digital signature) and 9A (authentication) are the key slots.
//!
//! A session is a dedicated PC/SC connection on which the PIN has been
//! verified. It stays open until closed, so the PIN is checked once per
//! session rather than per operation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};
use x509_cert::der::Encode;
use yubikey::piv::{decrypt_data, sign_data, AlgorithmId, SlotId};
use yubikey::{Context, YubiKey};

use crate::logic::{emsa_pkcs1_v15, strip_pkcs1_v15_type2};
use crate::model::{Certificate, Credential, KeyAlgorithm, Mechanism, SignatureScheme};
use crate::ports::{DriverError, DriverHandle, DriverSlot, SlotRef, TokenDriver};

use super::driver_registry::PIV_MODULE;

/// PIV slots exposed as key slots, with their role `(can_sign, can_authenticate)`
const PIV_SLOTS: [(SlotId, bool, bool); 2] = [
    (SlotId::Signature, true, false),
    (SlotId::Authentication, false, true),
];

struct PivSession {
    slot: SlotId,
    slot_ref: SlotRef,
    device: YubiKey,
    certificate: Certificate,
}

struct PivState {
    sessions: HashMap<u64, PivSession>,
    next_handle: u64,
}

pub struct PivDriver {
    state: Mutex<PivState>,
}

impl PivDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PivState {
                sessions: HashMap::new(),
                next_handle: 1,
            }),
        }
    }
}

impl Default for PivDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn device_error(err: yubikey::Error) -> DriverError {
    match err {
        yubikey::Error::WrongPin { tries } => DriverError::WrongPin {
            attempts_remaining: Some(tries),
        },
        yubikey::Error::PinLocked => DriverError::PinLocked,
        yubikey::Error::PcscError { .. } => DriverError::TokenRemoved,
        yubikey::Error::NotFound => DriverError::NoCertificate,
        other => DriverError::Device(other.to_string()),
    }
}

fn slot_id(key_ref: u8) -> Option<SlotId> {
    PIV_SLOTS
        .iter()
        .map(|(slot, _, _)| *slot)
        .find(|slot| u8::from(*slot) == key_ref)
}

/// Open a PC/SC connection to the YubiKey in the named reader
fn open_reader(name: &str) -> Result<YubiKey, DriverError> {
    let mut readers = Context::open().map_err(|e| DriverError::Unavailable(e.to_string()))?;
    let reader = readers
        .iter()
        .map_err(|e| DriverError::Unavailable(e.to_string()))?
        .find(|reader| reader.name() == name)
        .ok_or(DriverError::TokenRemoved)?;
    reader.open().map_err(device_error)
}

fn read_certificate(device: &mut YubiKey, slot: SlotId) -> Result<Certificate, DriverError> {
    let certificate = yubikey::Certificate::read(device, slot).map_err(device_error)?;
    let der = certificate
        .cert
        .to_der()
        .map_err(|e| DriverError::Device(e.to_string()))?;
    Certificate::from_der(der).map_err(|e| DriverError::Device(e.to_string()))
}

fn algorithm_of(certificate: &Certificate) -> Result<AlgorithmId, DriverError> {
    match certificate.key_algorithm() {
        Some(KeyAlgorithm::Rsa { bits: 1024 }) => Ok(AlgorithmId::Rsa1024),
        Some(KeyAlgorithm::Rsa { bits: 2048 }) => Ok(AlgorithmId::Rsa2048),
        Some(KeyAlgorithm::EcP256) => Ok(AlgorithmId::EccP256),
        Some(KeyAlgorithm::EcP384) => Ok(AlgorithmId::EccP384),
        other => Err(DriverError::Device(format!(
            "unsupported PIV key algorithm {other:?}"
        ))),
    }
}

fn modulus_len(algorithm: AlgorithmId) -> Option<usize> {
    match algorithm {
        AlgorithmId::Rsa1024 => Some(128),
        AlgorithmId::Rsa2048 => Some(256),
        _ => None,
    }
}

impl TokenDriver for PivDriver {
    fn module(&self) -> &str {
        PIV_MODULE
    }

    fn slots(&self) -> Result<Vec<DriverSlot>, DriverError> {
        let mut readers = Context::open().map_err(|e| DriverError::Unavailable(e.to_string()))?;
        let mut slots = Vec::new();
        for reader in readers
            .iter()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?
        {
            let name = reader.name().to_string();
            let mut device = match reader.open() {
                Ok(device) => device,
                Err(e) => {
                    debug!(reader = %name, error = %e, "reader skipped");
                    continue;
                }
            };
            for (slot, can_sign, can_authenticate) in PIV_SLOTS {
                let Ok(certificate) = read_certificate(&mut device, slot) else {
                    continue;
                };
                let key_ref = u8::from(slot);
                slots.push(DriverSlot {
                    slot: SlotRef {
                        token: name.clone(),
                        key_ref,
                    },
                    label: certificate
                        .common_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("PIV {key_ref:02X}")),
                    can_sign,
                    can_authenticate,
                    certificate: Some(certificate),
                });
            }
        }
        Ok(slots)
    }

    fn open_session(
        &self,
        slot: &SlotRef,
        credential: &Credential,
    ) -> Result<DriverHandle, DriverError> {
        let slot_id = slot_id(slot.key_ref).ok_or_else(|| DriverError::NoSuchSlot(slot.clone()))?;
        let mut state = self.state.lock();
        if state.sessions.values().any(|open| &open.slot_ref == slot) {
            return Err(DriverError::SlotBusy(slot.clone()));
        }

        let mut device = open_reader(&slot.token)?;
        let certificate = read_certificate(&mut device, slot_id).map_err(|e| match e {
            DriverError::NoCertificate => DriverError::NoSuchSlot(slot.clone()),
            other => other,
        })?;
        device.verify_pin(credential.as_bytes()).map_err(device_error)?;
        info!(%slot, serial = %device.serial(), "PIV session opened");

        let handle = state.next_handle;
        state.next_handle += 1;
        state.sessions.insert(
            handle,
            PivSession {
                slot: slot_id,
                slot_ref: slot.clone(),
                device,
                certificate,
            },
        );
        Ok(DriverHandle(handle))
    }

    fn sign(
        &self,
        handle: DriverHandle,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&handle.0)
            .ok_or(DriverError::InvalidHandle(handle))?;
        let algorithm = algorithm_of(&session.certificate)?;

        let input = match (mechanism.scheme, modulus_len(algorithm)) {
            (SignatureScheme::RsaPkcs1v15, Some(len)) => emsa_pkcs1_v15(mechanism.hash, digest, len)
                .map_err(|e| DriverError::Device(e.to_string()))?,
            (SignatureScheme::Ecdsa, None) => digest.to_vec(),
            _ => return Err(DriverError::UnsupportedMechanism(mechanism)),
        };

        let signature =
            sign_data(&mut session.device, &input, algorithm, session.slot).map_err(device_error)?;
        Ok(signature.to_vec())
    }

    fn decrypt(&self, handle: DriverHandle, ciphertext: &[u8]) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&handle.0)
            .ok_or(DriverError::InvalidHandle(handle))?;
        let algorithm = algorithm_of(&session.certificate)?;
        if modulus_len(algorithm).is_none() {
            return Err(DriverError::Device("EC keys cannot decrypt".to_string()));
        }

        let block = decrypt_data(&mut session.device, ciphertext, algorithm, session.slot)
            .map_err(device_error)?;
        strip_pkcs1_v15_type2(&block).map_err(|e| DriverError::Device(e.to_string()))
    }

    fn read_certificate(&self, handle: DriverHandle) -> Result<Certificate, DriverError> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&handle.0)
            .ok_or(DriverError::InvalidHandle(handle))?;
        read_certificate(&mut session.device, session.slot)
    }

    fn close_session(&self, handle: DriverHandle) {
        if let Some(session) = self.state.lock().sessions.remove(&handle.0) {
            debug!(slot = %session.slot_ref, "PIV session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Real hardware tests, enable with: --features hardware-tests
    // They expect a YubiKey with the default PIN and a certificate in slot 9C.

    const DEFAULT_PIN: &str = "123456";

    fn signing_slot(driver: &PivDriver) -> DriverSlot {
        driver
            .slots()
            .expect("PC/SC available")
            .into_iter()
            .find(|slot| slot.can_sign)
            .expect("YubiKey with a certificate in slot 9C")
    }

    #[test]
    fn test_slot_ids() {
        assert_eq!(slot_id(0x9c), Some(SlotId::Signature));
        assert_eq!(slot_id(0x9a), Some(SlotId::Authentication));
        assert_eq!(slot_id(0x82), None);
    }

    #[test]
    fn test_device_error_mapping() {
        assert_eq!(
            device_error(yubikey::Error::WrongPin { tries: 2 }),
            DriverError::WrongPin {
                attempts_remaining: Some(2)
            }
        );
        assert_eq!(device_error(yubikey::Error::PinLocked), DriverError::PinLocked);
        assert_eq!(device_error(yubikey::Error::NotFound), DriverError::NoCertificate);
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)]
    fn test_list_slots() {
        let driver = PivDriver::new();
        let slot = signing_slot(&driver);
        assert_eq!(slot.slot.key_ref, 0x9c);
        assert!(slot.certificate.is_some());
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)]
    fn test_sign_with_signing_slot() {
        let driver = PivDriver::new();
        let slot = signing_slot(&driver);
        let pin = Credential::new(DEFAULT_PIN).unwrap();

        let handle = driver.open_session(&slot.slot, &pin).expect("PIN accepted");
        let mechanism = match slot.certificate.as_ref().and_then(Certificate::key_algorithm) {
            Some(KeyAlgorithm::EcP256) => Mechanism::ECDSA_SHA256,
            _ => Mechanism::RSA_SHA256,
        };
        let signature = driver.sign(handle, &[0x42; 32], mechanism);
        driver.close_session(handle);

        assert!(!signature.expect("signature").is_empty());
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)]
    fn test_second_session_on_slot_is_busy() {
        let driver = PivDriver::new();
        let slot = signing_slot(&driver);
        let pin = Credential::new(DEFAULT_PIN).unwrap();

        let handle = driver.open_session(&slot.slot, &pin).expect("PIN accepted");
        assert!(matches!(
            driver.open_session(&slot.slot, &pin),
            Err(DriverError::SlotBusy(_))
        ));
        driver.close_session(handle);
    }
}
