//! Library entry points
//!
//! Thin wrappers that resolve the configured backend through the built-in
//! dispatcher.

use crate::config::FactoryConfig;
use crate::dispatcher::Dispatcher;
use crate::error::SigFactoryResult;
use crate::ports::{CredentialSession, SignatureBackend, TokenDirectory};
use crate::shared::SharedBackend;

pub use crate::model::*;

/// Build and initialize the backend named by `config`
pub fn open_backend(config: &FactoryConfig) -> SigFactoryResult<Box<dyn SignatureBackend>> {
    Dispatcher::with_builtin().open(config)
}

/// Open the configured backend for use from several threads
///
/// Calls made through [`SharedBackend::run`] honour the configured
/// operation timeout.
pub fn open_shared_backend(config: &FactoryConfig) -> SigFactoryResult<SharedBackend> {
    Ok(SharedBackend::new(open_backend(config)?).with_deadline(config.operation_timeout()))
}

/// Every key slot of the configured backend; no credential needed
pub fn list_tokens(config: &FactoryConfig) -> SigFactoryResult<Vec<TokenKeyInfo>> {
    let mut backend = open_backend(config)?;
    let tokens = backend.list_all_tokens();
    backend.close_session()?;
    tokens
}

/// Tokens of the configured backend usable in `role`
pub fn list_tokens_by_role(config: &FactoryConfig, role: Role) -> SigFactoryResult<Vec<TokenKeyInfo>> {
    Ok(list_tokens(config)?
        .into_iter()
        .filter(|info| info.supports(role))
        .collect())
}
