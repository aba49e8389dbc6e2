//! In-memory token driver emulating a PIV-style card reader
//!
//! Behaves like the hardware: one PIN per token with a retry counter,
//! 9C signing and 9A authentication key slots, one open session per slot,
//! and tokens that can be pulled out between (or during) operations.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::logic::{SoftKey, SoftKeyError};
use crate::model::{Certificate, Credential, Mechanism};
use crate::ports::{DriverError, DriverHandle, DriverSlot, SlotRef, TokenDriver};
use crate::test_support::{self_signed_with, rsa_key, rsa_pkcs8_der, Usage};

pub const SIGNING_SLOT: u8 = 0x9c;
pub const AUTHENTICATION_SLOT: u8 = 0x9a;
pub const PIN_RETRIES: u8 = 3;
pub const DEFAULT_PIN: &str = "123456";

pub struct EmulatedKey {
    key_ref: u8,
    certificate: Certificate,
    key: SoftKey,
}

pub struct EmulatedToken {
    name: String,
    pin: String,
    tries_left: u8,
    inserted: bool,
    keys: Vec<EmulatedKey>,
}

impl EmulatedToken {
    pub fn new(name: &str, pin: &str) -> Self {
        Self {
            name: name.to_string(),
            pin: pin.to_string(),
            tries_left: PIN_RETRIES,
            inserted: true,
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, key_ref: u8, certificate: Certificate, key: SoftKey) -> Self {
        self.keys.push(EmulatedKey {
            key_ref,
            certificate,
            key,
        });
        self
    }

    /// Card with an RSA signing key in 9C and an RSA authentication key in 9A
    pub fn standard(name: &str) -> Self {
        let signing = rsa_key(0);
        let auth = rsa_key(1);
        Self::new(name, DEFAULT_PIN)
            .with_key(
                SIGNING_SLOT,
                self_signed_with(&format!("{name} Signing"), Usage::Signing, &signing),
                SoftKey::from_pkcs8_der(&rsa_pkcs8_der(&signing)).unwrap(),
            )
            .with_key(
                AUTHENTICATION_SLOT,
                self_signed_with(&format!("{name} Authentication"), Usage::Authentication, &auth),
                SoftKey::from_pkcs8_der(&rsa_pkcs8_der(&auth)).unwrap(),
            )
    }
}

struct CardState {
    tokens: Vec<EmulatedToken>,
    sessions: HashMap<u64, SlotRef>,
    next_handle: u64,
}

impl CardState {
    fn key(&self, slot: &SlotRef) -> Result<&EmulatedKey, DriverError> {
        let token = self
            .tokens
            .iter()
            .find(|t| t.name == slot.token)
            .ok_or(DriverError::TokenRemoved)?;
        if !token.inserted {
            return Err(DriverError::TokenRemoved);
        }
        token
            .keys
            .iter()
            .find(|k| k.key_ref == slot.key_ref)
            .ok_or_else(|| DriverError::NoSuchSlot(slot.clone()))
    }

    fn session_key(&self, handle: DriverHandle) -> Result<&EmulatedKey, DriverError> {
        let slot = self
            .sessions
            .get(&handle.0)
            .ok_or(DriverError::InvalidHandle(handle))?;
        self.key(slot)
    }
}

pub struct EmulatedCard {
    module: String,
    state: Mutex<CardState>,
}

impl EmulatedCard {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            state: Mutex::new(CardState {
                tokens: Vec::new(),
                sessions: HashMap::new(),
                next_handle: 1,
            }),
        }
    }

    pub fn with_token(self, token: EmulatedToken) -> Self {
        self.state.lock().tokens.push(token);
        self
    }

    /// Pull the token out of its reader
    pub fn remove_token(&self, name: &str) {
        if let Some(token) = self.state.lock().tokens.iter_mut().find(|t| t.name == name) {
            token.inserted = false;
        }
    }

    pub fn insert_token(&self, name: &str) {
        if let Some(token) = self.state.lock().tokens.iter_mut().find(|t| t.name == name) {
            token.inserted = true;
        }
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl TokenDriver for EmulatedCard {
    fn module(&self) -> &str {
        &self.module
    }

    fn slots(&self) -> Result<Vec<DriverSlot>, DriverError> {
        let state = self.state.lock();
        let slots = state
            .tokens
            .iter()
            .filter(|t| t.inserted)
            .flat_map(|token| {
                token.keys.iter().map(move |key| DriverSlot {
                    slot: SlotRef {
                        token: token.name.clone(),
                        key_ref: key.key_ref,
                    },
                    label: key
                        .certificate
                        .common_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Slot {:02X}", key.key_ref)),
                    can_sign: key.key_ref == SIGNING_SLOT,
                    can_authenticate: key.key_ref == AUTHENTICATION_SLOT,
                    certificate: Some(key.certificate.clone()),
                })
            })
            .collect();
        Ok(slots)
    }

    fn open_session(
        &self,
        slot: &SlotRef,
        credential: &Credential,
    ) -> Result<DriverHandle, DriverError> {
        let mut state = self.state.lock();
        state.key(slot)?;
        if state.sessions.values().any(|open| open == slot) {
            return Err(DriverError::SlotBusy(slot.clone()));
        }

        let token = state
            .tokens
            .iter_mut()
            .find(|t| t.name == slot.token)
            .ok_or(DriverError::TokenRemoved)?;
        if token.tries_left == 0 {
            return Err(DriverError::PinLocked);
        }
        if token.pin != credential.as_str() {
            token.tries_left -= 1;
            return Err(DriverError::WrongPin {
                attempts_remaining: Some(token.tries_left),
            });
        }
        token.tries_left = PIN_RETRIES;

        let handle = state.next_handle;
        state.next_handle += 1;
        state.sessions.insert(handle, slot.clone());
        Ok(DriverHandle(handle))
    }

    fn sign(
        &self,
        handle: DriverHandle,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> Result<Vec<u8>, DriverError> {
        let state = self.state.lock();
        let key = state.session_key(handle)?;
        key.key.sign(digest, mechanism).map_err(|e| match e {
            SoftKeyError::MechanismMismatch { .. } => DriverError::UnsupportedMechanism(mechanism),
            other => DriverError::Device(other.to_string()),
        })
    }

    fn decrypt(&self, handle: DriverHandle, ciphertext: &[u8]) -> Result<Vec<u8>, DriverError> {
        let state = self.state.lock();
        let key = state.session_key(handle)?;
        key.key
            .decrypt(ciphertext)
            .map_err(|e| DriverError::Device(e.to_string()))
    }

    fn read_certificate(&self, handle: DriverHandle) -> Result<Certificate, DriverError> {
        let state = self.state.lock();
        Ok(state.session_key(handle)?.certificate.clone())
    }

    fn close_session(&self, handle: DriverHandle) {
        self.state.lock().sessions.remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> EmulatedCard {
        EmulatedCard::new("emulated").with_token(EmulatedToken::standard("Card A"))
    }

    fn slot(key_ref: u8) -> SlotRef {
        SlotRef {
            token: "Card A".to_string(),
            key_ref,
        }
    }

    #[test]
    fn test_slots_report_roles() {
        let slots = card().slots().unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0].can_sign && !slots[0].can_authenticate);
        assert!(slots[1].can_authenticate && !slots[1].can_sign);
        assert_eq!(slots[0].label, "Card A Signing");
    }

    #[test]
    fn test_pin_retry_counter() {
        let card = card();
        let wrong = Credential::new("000000").unwrap();

        assert_eq!(
            card.open_session(&slot(SIGNING_SLOT), &wrong),
            Err(DriverError::WrongPin {
                attempts_remaining: Some(2)
            })
        );
        card.open_session(&slot(SIGNING_SLOT), &wrong).unwrap_err();
        card.open_session(&slot(SIGNING_SLOT), &wrong).unwrap_err();

        let right = Credential::new(DEFAULT_PIN).unwrap();
        assert_eq!(
            card.open_session(&slot(SIGNING_SLOT), &right),
            Err(DriverError::PinLocked)
        );
    }

    #[test]
    fn test_one_session_per_slot() {
        let card = card();
        let pin = Credential::new(DEFAULT_PIN).unwrap();

        let handle = card.open_session(&slot(SIGNING_SLOT), &pin).unwrap();
        assert!(matches!(
            card.open_session(&slot(SIGNING_SLOT), &pin),
            Err(DriverError::SlotBusy(_))
        ));
        assert!(card.open_session(&slot(AUTHENTICATION_SLOT), &pin).is_ok());

        card.close_session(handle);
        assert!(card.open_session(&slot(SIGNING_SLOT), &pin).is_ok());
    }

    #[test]
    fn test_removed_token() {
        let card = card();
        let pin = Credential::new(DEFAULT_PIN).unwrap();
        let handle = card.open_session(&slot(SIGNING_SLOT), &pin).unwrap();

        card.remove_token("Card A");
        assert!(card.slots().unwrap().is_empty());
        assert_eq!(
            card.sign(handle, &[0u8; 32], Mechanism::RSA_SHA256),
            Err(DriverError::TokenRemoved)
        );
    }
}
