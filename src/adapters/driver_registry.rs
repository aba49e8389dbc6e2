//! Process-wide registry of loaded hardware driver modules
//!
//! A driver is loaded on first use and shared by every backend that names the
//! same module. The registry keeps only weak references: the driver is dropped
//! once the last backend holding it closes.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{SigFactoryError, SigFactoryResult};
use crate::ports::{DriverError, TokenDriver};

/// Constructor for a driver module
pub type DriverLoader =
    Arc<dyn Fn() -> Result<Arc<dyn TokenDriver>, DriverError> + Send + Sync>;

/// Module identifier of the built-in YubiKey PIV driver
pub const PIV_MODULE: &str = "piv";

static GLOBAL: OnceLock<Arc<DriverRegistry>> = OnceLock::new();

/// A loaded driver module, shared between backends through `Arc`
pub struct LoadedDriver {
    module: String,
    driver: Arc<dyn TokenDriver>,
}

impl Deref for LoadedDriver {
    type Target = dyn TokenDriver;

    fn deref(&self) -> &Self::Target {
        self.driver.as_ref()
    }
}

impl Drop for LoadedDriver {
    fn drop(&mut self) {
        info!(module = %self.module, "driver module released");
    }
}

pub struct DriverRegistry {
    loaders: Mutex<HashMap<String, DriverLoader>>,
    live: Mutex<HashMap<String, Weak<LoadedDriver>>>,
}

impl DriverRegistry {
    /// Registry with the built-in driver modules
    pub fn new() -> Self {
        let registry = Self::empty();
        #[cfg(feature = "piv")]
        registry.register_loader(PIV_MODULE, || {
            Ok(Arc::new(super::PivDriver::new()) as Arc<dyn TokenDriver>)
        });
        registry
    }

    /// Registry without any driver module
    pub fn empty() -> Self {
        Self {
            loaders: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Registry shared by every `HardwareBackend::new`
    pub fn global() -> Arc<DriverRegistry> {
        GLOBAL.get_or_init(|| Arc::new(DriverRegistry::new())).clone()
    }

    /// Make a driver module loadable under `module`
    pub fn register_loader<F>(&self, module: &str, loader: F)
    where
        F: Fn() -> Result<Arc<dyn TokenDriver>, DriverError> + Send + Sync + 'static,
    {
        debug!(module, "driver module registered");
        self.loaders.lock().insert(module.to_string(), Arc::new(loader));
    }

    /// Reference to the loaded driver, loading it if no backend holds it
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Initialization` if the module is unknown or fails to load
    pub fn acquire(&self, module: &str) -> SigFactoryResult<Arc<LoadedDriver>> {
        let mut live = self.live.lock();
        if let Some(driver) = live.get(module).and_then(Weak::upgrade) {
            debug!(module, "reusing loaded driver");
            return Ok(driver);
        }

        let loader = self.loaders.lock().get(module).cloned().ok_or_else(|| {
            SigFactoryError::initialization(format!("no driver module named '{module}'"))
        })?;
        let driver = loader().map_err(|e| {
            SigFactoryError::initialization(format!("loading driver module '{module}': {e}"))
        })?;

        let loaded = Arc::new(LoadedDriver {
            module: module.to_string(),
            driver,
        });
        live.insert(module.to_string(), Arc::downgrade(&loaded));
        info!(module, driver = loaded.driver.module(), "driver module loaded");
        Ok(loaded)
    }

    /// Number of live references to the module's driver; 0 once released
    pub fn ref_count(&self, module: &str) -> usize {
        self.live
            .lock()
            .get(module)
            .map(Weak::strong_count)
            .unwrap_or(0)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
