//! `block` checker: denies every call it is bound to.

use std::sync::Arc;

use crate::adapter::{AdapterError, Checker, CheckerBuilder};
use crate::config::decode::{ConfigSchema, FieldKind, TypedParams, TypedValue};
use crate::control::{CheckError, CheckErrorCode, CheckRequest};

pub const NAME: &str = "block";
pub const DEFAULT_MESSAGE: &str = "Access explicitly blocked";

pub struct BlockChecker {
    message: String,
}

impl BlockChecker {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Checker for BlockChecker {
    fn name(&self) -> &str {
        NAME
    }

    fn check(&self, request: &CheckRequest) -> Result<Option<CheckError>, AdapterError> {
        tracing::debug!(service = %request.service_name, consumer = %request.consumer_id(), "Blocked");
        Ok(Some(CheckError::new(CheckErrorCode::ClientAppBlocked, self.message.clone())))
    }
}

pub struct BlockBuilder;

impl CheckerBuilder for BlockBuilder {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().with_default(
            "Message",
            FieldKind::String,
            TypedValue::String(DEFAULT_MESSAGE.into()),
        )
    }

    fn build_checker(&self, params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
        let message = params.get_str("Message").unwrap_or(DEFAULT_MESSAGE);
        Ok(Arc::new(BlockChecker::new(message)))
    }
}
