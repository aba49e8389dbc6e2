//! TokenDirectory trait - capability to enumerate key-bearing tokens

use crate::error::SigFactoryResult;
use crate::model::{Role, TokenKeyInfo};

/// Capability to enumerate the key slots a backend can reach
///
/// No authentication is required. Calls are idempotent and safe to repeat.
/// Backends over removable hardware re-probe on every call; backends over
/// static stores may serve a cache built at `init()`.
pub trait TokenDirectory {
    /// List every usable key slot, ordered by token index
    ///
    /// # Errors
    ///
    /// Returns `BackendError::DirectoryUnavailable` if the enumeration channel
    /// cannot be opened (driver missing, backend not initialized)
    fn list_all_tokens(&self) -> SigFactoryResult<Vec<TokenKeyInfo>>;

    /// List the key slots able to serve `role`
    fn list_tokens_by_role(&self, role: Role) -> SigFactoryResult<Vec<TokenKeyInfo>> {
        Ok(self
            .list_all_tokens()?
            .into_iter()
            .filter(|info| info.supports(role))
            .collect())
    }

    /// Distinct physical or logical token names, in first-seen order
    fn list_available_token_names(&self) -> SigFactoryResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for info in self.list_all_tokens()? {
            if !names.contains(&info.token_name) {
                names.push(info.token_name);
            }
        }
        Ok(names)
    }
}
