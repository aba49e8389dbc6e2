//! TokenDriver trait - boundary to an opaque hardware token provider
//!
//! A driver owns its native handles in an internal arena and hands out
//! [`DriverHandle`] indices only. It enforces at most one open session per
//! key slot, whichever backend instance asks.

use std::fmt;

use thiserror::Error;

use crate::model::{Certificate, Credential, Mechanism, Role};

/// Opaque index into a driver's session arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverHandle(pub u64);

impl fmt::Display for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Address of one key slot: the token (reader) name plus the key reference on it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub token: String,
    pub key_ref: u8,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02x}", self.token, self.key_ref)
    }
}

/// Key slot reported by a driver probe
#[derive(Debug, Clone)]
pub struct DriverSlot {
    pub slot: SlotRef,
    pub label: String,
    pub can_sign: bool,
    pub can_authenticate: bool,
    pub certificate: Option<Certificate>,
}

impl DriverSlot {
    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Signing => self.can_sign,
            Role::Authentication => self.can_authenticate,
        }
    }
}

/// Failures reported by a driver
///
/// The hardware backend maps these onto the crate-wide error taxonomy,
/// adding the token index the driver does not know about.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("wrong PIN")]
    WrongPin { attempts_remaining: Option<u8> },

    #[error("PIN blocked")]
    PinLocked,

    #[error("slot {0} not present")]
    NoSuchSlot(SlotRef),

    #[error("slot {0} already has an open session")]
    SlotBusy(SlotRef),

    #[error("session handle {0} is not open")]
    InvalidHandle(DriverHandle),

    #[error("token removed")]
    TokenRemoved,

    #[error("no certificate in slot")]
    NoCertificate,

    #[error("mechanism {0} not supported by the key")]
    UnsupportedMechanism(Mechanism),

    #[error("device error: {0}")]
    Device(String),
}

/// Capability set of a loaded hardware driver module
///
/// Shared process-wide through the driver registry, hence `Send + Sync`
/// and `&self` receivers: implementations serialize access internally.
pub trait TokenDriver: Send + Sync {
    /// Module identifier the driver was loaded under
    fn module(&self) -> &str;

    /// Probe the readers and report every certificate-bearing key slot
    fn slots(&self) -> Result<Vec<DriverSlot>, DriverError>;

    /// Verify the PIN and open a session on one slot
    fn open_session(
        &self,
        slot: &SlotRef,
        credential: &Credential,
    ) -> Result<DriverHandle, DriverError>;

    /// Sign a digest with the slot's key
    ///
    /// RSA keys apply EMSA-PKCS1-v1_5 with the DigestInfo of `mechanism`.
    fn sign(
        &self,
        handle: DriverHandle,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> Result<Vec<u8>, DriverError>;

    /// Decrypt a PKCS#1 v1.5 ciphertext with the slot's key
    fn decrypt(&self, handle: DriverHandle, ciphertext: &[u8]) -> Result<Vec<u8>, DriverError>;

    /// Read the certificate stored alongside the slot's key
    fn read_certificate(&self, handle: DriverHandle) -> Result<Certificate, DriverError>;

    /// Close a session; unknown handles are ignored
    fn close_session(&self, handle: DriverHandle);
}
