//! Per-service adapter bindings.
//!
//! The services configuration is a YAML document keyed by service identity:
//!
//! ```yaml
//! _EVERY_SERVICE_:
//!   serviceid: _EVERY_SERVICE_
//!   ingress:
//!     checkers:
//!     - kind: whitelist
//!       params:
//!         providerurl: http://whitelist.internal/list.yml
//! svc1:
//!   serviceid: svc1
//!   consumers:
//!     c1:
//!       serviceid: c1
//!       checkers:
//!       - kind: block
//! ```
//!
//! A snapshot is built fresh on every fetch, converted once, and then shared
//! immutably behind an `Arc`; reloads replace it wholesale.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;

use crate::config::convert::AdapterBuilder;
use crate::config::decode::TypedParams;

/// Service key whose rules apply to every interaction.
pub const EVERY_SERVICE: &str = "_EVERY_SERVICE_";

/// Top-level map of service identity to its configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicesConfig {
    pub services: BTreeMap<String, ServiceConfig>,
}

impl ServicesConfig {
    /// Parses a YAML document. An empty document yields an empty config.
    pub fn from_yaml(data: &[u8]) -> Result<Self, serde_yaml::Error> {
        let value: Value = serde_yaml::from_slice(data)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value)
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceConfig> {
        self.services.get(service_id)
    }

    pub fn insert(&mut self, service: ServiceConfig) {
        self.services.insert(service.service_id.clone(), service);
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Configuration from one service's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    #[serde(rename = "serviceid")]
    pub service_id: String,

    /// Applies when the service itself issues calls.
    #[serde(rename = "self")]
    pub self_adapters: AdapterConfig,

    /// Applies whenever this service is called, whoever the caller is.
    pub ingress: AdapterConfig,

    /// Applies whenever this service calls out, whoever the callee is.
    pub egress: AdapterConfig,

    /// `consumers[x]`: rules for when `x` calls this service.
    pub consumers: BTreeMap<String, BindingConfig>,

    /// `producers[x]`: rules for when this service calls `x`.
    pub producers: BTreeMap<String, BindingConfig>,
}

impl ServiceConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            ..Self::default()
        }
    }
}

/// Adapter rules for one ordered pair of services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// The peer service.
    #[serde(rename = "serviceid")]
    pub service_id: String,

    #[serde(flatten)]
    pub adapters: AdapterConfig,
}

/// Ordered adapter lists per RPC method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub checkers: Vec<AdapterParams>,
    pub reporters: Vec<AdapterParams>,
}

impl AdapterConfig {
    pub fn for_method(&self, method: RpcMethod) -> &[AdapterParams] {
        match method {
            RpcMethod::Check => &self.checkers,
            RpcMethod::Report => &self.reporters,
        }
    }
}

/// One adapter entry: what to build plus framework-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterParams {
    /// Optional identifier, distinguishing instances of the same kind.
    pub id: String,

    #[serde(flatten)]
    pub constructor: ConstructorParams,

    /// Reserved. Accepted so existing services files load unchanged; consumer
    /// batching is configured per process under `[reports.batching]`.
    #[serde(rename = "batchparams", skip_serializing_if = "BatchParams::is_unset")]
    pub batch_params: BatchParams,
}

impl AdapterParams {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self {
            constructor: ConstructorParams {
                kind: kind.into(),
                params: Params::Raw(params),
            },
            ..Self::default()
        }
    }

    pub fn kind(&self) -> &str {
        &self.constructor.kind
    }

    /// Runtime state, once the conversion pass has run over this entry.
    pub fn runtime(&self) -> Option<&RuntimeAdapterState> {
        match &self.constructor.params {
            Params::Converted(state) => Some(state),
            Params::Raw(_) => None,
        }
    }
}

/// Adapter kind and its params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructorParams {
    pub kind: String,
    #[serde(skip_serializing_if = "Params::is_null")]
    pub params: Params,
}

/// Batching hints carried alongside an adapter entry. Parsed, not acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParams {
    pub size: usize,
    #[serde(rename = "timeoutsec")]
    pub timeout_sec: u64,
}

impl BatchParams {
    fn is_unset(&self) -> bool {
        self.size == 0 && self.timeout_sec == 0
    }
}

/// Adapter params before and after the conversion pass.
///
/// Starts as `Raw` and is replaced in place by `Converted` exactly once.
#[derive(Clone, PartialEq)]
pub enum Params {
    Raw(Value),
    Converted(Box<RuntimeAdapterState>),
}

impl Params {
    /// The untyped value as written in the config.
    pub fn raw(&self) -> &Value {
        match self {
            Params::Raw(v) => v,
            Params::Converted(state) => &state.params,
        }
    }

    fn is_null(&self) -> bool {
        self.raw().is_null()
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::Raw(Value::Null)
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::Raw(v) => f.debug_tuple("Raw").field(v).finish(),
            Params::Converted(state) => f.debug_tuple("Converted").field(state).finish(),
        }
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Params::Raw)
    }
}

/// Result of converting one adapter entry against the registry.
#[derive(Clone)]
pub struct RuntimeAdapterState {
    /// Where the entry lives in the config tree, for diagnostics.
    pub path: String,
    /// The original untyped params.
    pub params: Value,
    pub builder: AdapterBuilder,
    conversion: Result<TypedParams, String>,
}

impl RuntimeAdapterState {
    pub fn converted(path: String, params: Value, builder: AdapterBuilder, typed: TypedParams) -> Self {
        Self {
            path,
            params,
            builder,
            conversion: Ok(typed),
        }
    }

    pub fn failed(path: String, params: Value, builder: AdapterBuilder, error: String) -> Self {
        Self {
            path,
            params,
            builder,
            conversion: Err(error),
        }
    }

    pub fn typed_params(&self) -> Option<&TypedParams> {
        self.conversion.as_ref().ok()
    }

    pub fn conversion_error(&self) -> Option<&str> {
        self.conversion.as_ref().err().map(String::as_str)
    }
}

impl PartialEq for RuntimeAdapterState {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.params == other.params
            && self.conversion == other.conversion
            && self.builder.same_builder(&other.builder)
    }
}

impl fmt::Debug for RuntimeAdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeAdapterState")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("conversion", &self.conversion)
            .finish_non_exhaustive()
    }
}

/// Which adapter list a resolution consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Check,
    Report,
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Check => "CHECK",
            RpcMethod::Report => "REPORT",
        }
    }
}

/// A (source, destination, method) query against a services config.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    pub source: String,
    pub destination: String,
    pub rpc_method: RpcMethod,
}

impl ResolveKey {
    pub fn check(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            rpc_method: RpcMethod::Check,
        }
    }

    pub fn report(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            rpc_method: RpcMethod::Report,
        }
    }
}
