//! Checker plugin contract.

use std::sync::Arc;

use thiserror::Error;

use crate::config::decode::{ConfigSchema, TypedParams};
use crate::control::{CheckError, CheckRequest};

/// Errors raised by adapters outside of a policy decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Typed params decoded but are semantically unusable.
    #[error("invalid adapter config: {0}")]
    InvalidConfig(String),

    /// The adapter could not be constructed (e.g. its backend is unreachable).
    #[error("adapter build failed: {0}")]
    Build(String),

    /// A check could not be evaluated at all.
    #[error("{0}")]
    Check(String),
}

/// An admission checker. Implementations must tolerate concurrent calls.
pub trait Checker: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Ok(Some(_))` to deny, `Ok(None)` to allow. An `Err` is turned
    /// into a permission-denied check error by the caller.
    fn check(&self, request: &CheckRequest) -> Result<Option<CheckError>, AdapterError>;

    /// Releases background resources held by the checker.
    fn unload(&self) {}
}

/// Builds checkers of one kind from decoded typed params.
pub trait CheckerBuilder: Send + Sync {
    /// Shape of the params this kind accepts.
    fn config_schema(&self) -> ConfigSchema;

    fn validate_config(&self, _params: &TypedParams) -> Result<(), AdapterError> {
        Ok(())
    }

    fn build_checker(&self, params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError>;
}
