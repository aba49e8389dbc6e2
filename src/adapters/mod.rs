//! Adapters - concrete implementations of ports (traits)

mod container;
mod driver_registry;
mod hardware;
mod keystore;
mod soft_backend;

#[cfg(feature = "piv")]
mod piv_driver;

#[cfg(test)]
pub mod emulated_card;

pub use container::{ContainerBackend, ContainerSource};
pub use driver_registry::{DriverLoader, DriverRegistry, LoadedDriver, PIV_MODULE};
pub use hardware::HardwareBackend;
pub use keystore::{KeystoreBackend, KeystoreSource};
pub use soft_backend::{KeySource, SoftBackend, StoredToken};

#[cfg(feature = "piv")]
pub use piv_driver::PivDriver;
