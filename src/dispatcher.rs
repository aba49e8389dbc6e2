//! Factory dispatcher
//!
//! Maps a declared backend type identifier to the factory that builds the
//! backend. The dispatcher holds no cryptographic state. New backend kinds are
//! added by registering another [`BackendFactory`]; built-in routes are never
//! touched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::{ContainerBackend, DriverRegistry, HardwareBackend, KeystoreBackend};
use crate::config::FactoryConfig;
use crate::error::{BackendError, SigFactoryError, SigFactoryResult};
use crate::model::{BackendKind, TYPE_JKS, TYPE_PKCS11, TYPE_PKCS12};
use crate::ports::{CredentialSession, SignatureBackend};

/// Builder for one backend type
pub trait BackendFactory: Send + Sync {
    /// Canonical, upper-case type identifier this factory serves
    fn type_id(&self) -> &str;

    /// Build an uninitialized backend from configuration
    fn create(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>>;
}

pub struct HardwareFactory {
    registry: Arc<DriverRegistry>,
}

impl HardwareFactory {
    pub fn new() -> Self {
        Self::with_registry(DriverRegistry::global())
    }

    pub fn with_registry(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for HardwareFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for HardwareFactory {
    fn type_id(&self) -> &str {
        TYPE_PKCS11
    }

    fn create(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
        let hardware = config.hardware()?;
        Ok(Box::new(HardwareBackend::with_registry(
            hardware.module.clone(),
            self.registry.clone(),
        )))
    }
}

pub struct ContainerFactory;

impl BackendFactory for ContainerFactory {
    fn type_id(&self) -> &str {
        TYPE_PKCS12
    }

    fn create(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
        let container = config.container()?;
        Ok(Box::new(ContainerBackend::new(
            container.path.clone(),
            container.max_attempts,
        )))
    }
}

pub struct KeystoreFactory;

impl BackendFactory for KeystoreFactory {
    fn type_id(&self) -> &str {
        TYPE_JKS
    }

    fn create(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
        let keystore = config.keystore()?;
        Ok(Box::new(KeystoreBackend::new(
            keystore.dir.clone(),
            keystore.max_attempts,
        )))
    }
}

#[derive(Default)]
pub struct Dispatcher {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl Dispatcher {
    /// Dispatcher without any route
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher routing the three built-in backend types
    pub fn with_builtin() -> Self {
        let mut dispatcher = Self::new();
        for factory in [
            Arc::new(HardwareFactory::new()) as Arc<dyn BackendFactory>,
            Arc::new(ContainerFactory),
            Arc::new(KeystoreFactory),
        ] {
            dispatcher.factories.insert(factory.type_id().to_string(), factory);
        }
        dispatcher
    }

    /// Add a route for a new backend type
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Initialization` if the type is already routed
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) -> SigFactoryResult<()> {
        let type_id = BackendKind::normalize_type_id(factory.type_id());
        if self.factories.contains_key(&type_id) {
            return Err(SigFactoryError::initialization(format!(
                "backend type {type_id} is already registered"
            )));
        }
        debug!(type_id, "backend factory registered");
        self.factories.insert(type_id, factory);
        Ok(())
    }

    /// Factory serving a declared type identifier or class name
    pub fn resolve(&self, declared: &str) -> SigFactoryResult<&dyn BackendFactory> {
        let type_id = BackendKind::normalize_type_id(declared);
        self.factories
            .get(&type_id)
            .map(|factory| factory.as_ref())
            .ok_or(SigFactoryError::Backend(BackendError::UnknownType { type_id }))
    }

    /// Build the configured backend, uninitialized
    pub fn create(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
        let factory = self.resolve(&config.backend)?;
        debug!(type_id = factory.type_id(), "creating backend");
        factory.create(config)
    }

    /// Build and initialize the configured backend
    pub fn open(&self, config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
        let mut backend = self.create(config)?;
        backend.init()?;
        Ok(backend)
    }

    /// Routed type identifiers, sorted
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
