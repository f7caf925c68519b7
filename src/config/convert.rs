//! Conversion pass: binds raw adapter entries to registered builders.
//!
//! # Responsibilities
//! - Look up every entry's kind in the registry matching its list
//!   (checkers → checker builders, reporters → consumer builders)
//! - Decode raw params against the builder's schema and run its validation
//! - Replace `Params::Raw` with `Params::Converted` in place, exactly once
//!
//! # Design Decisions
//! - Unknown kinds are removed from their list; decode or validation failures
//!   stay in place with the error recorded, and the resolver skips them
//! - Errors are collected and returned, never raised; a bad entry only
//!   disables itself

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::adapter::{AdapterError, CheckerBuilder, ConsumerBuilder, Registries};
use crate::config::decode::{decode, ConfigSchema, DecodeError};
use crate::config::services::{
    AdapterConfig, AdapterParams, Params, RpcMethod, RuntimeAdapterState, ServicesConfig,
};

/// The builder an entry was bound to.
#[derive(Clone)]
pub enum AdapterBuilder {
    Checker(Arc<dyn CheckerBuilder>),
    Consumer(Arc<dyn ConsumerBuilder>),
}

impl AdapterBuilder {
    pub fn schema(&self) -> ConfigSchema {
        match self {
            AdapterBuilder::Checker(b) => b.config_schema(),
            AdapterBuilder::Consumer(b) => b.config_schema(),
        }
    }

    pub fn as_checker(&self) -> Option<&Arc<dyn CheckerBuilder>> {
        match self {
            AdapterBuilder::Checker(b) => Some(b),
            AdapterBuilder::Consumer(_) => None,
        }
    }

    /// Pointer identity of the underlying builder.
    pub fn same_builder(&self, other: &AdapterBuilder) -> bool {
        match (self, other) {
            (AdapterBuilder::Checker(a), AdapterBuilder::Checker(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (AdapterBuilder::Consumer(a), AdapterBuilder::Consumer(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for AdapterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterBuilder::Checker(_) => f.write_str("AdapterBuilder::Checker"),
            AdapterBuilder::Consumer(_) => f.write_str("AdapterBuilder::Consumer"),
        }
    }
}

/// A problem found while converting one adapter entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("{path}: Adapter of type '{kind}' is not available")]
    AdapterUnavailable { path: String, kind: String },

    #[error("{path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("{path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: AdapterError,
    },
}

impl ConversionError {
    pub fn path(&self) -> &str {
        match self {
            ConversionError::AdapterUnavailable { path, .. }
            | ConversionError::Decode { path, .. }
            | ConversionError::Invalid { path, .. } => path,
        }
    }
}

/// Converts every raw adapter entry in `cfg` against `registries`.
///
/// Entries that were already converted are left untouched, so running the
/// pass twice is harmless.
pub fn convert_params(cfg: &mut ServicesConfig, registries: &Registries) -> Vec<ConversionError> {
    let mut errors = Vec::new();
    for (service_id, service) in cfg.services.iter_mut() {
        convert_scope(&mut service.ingress, &format!("{service_id}.Ingress"), registries, &mut errors);
        convert_scope(&mut service.egress, &format!("{service_id}.Egress"), registries, &mut errors);
        convert_scope(&mut service.self_adapters, &format!("{service_id}.Self"), registries, &mut errors);
        for (peer, binding) in service.consumers.iter_mut() {
            let scope = format!("{service_id}.Consumers.{peer}");
            convert_scope(&mut binding.adapters, &scope, registries, &mut errors);
        }
        for (peer, binding) in service.producers.iter_mut() {
            let scope = format!("{service_id}.Producers.{peer}");
            convert_scope(&mut binding.adapters, &scope, registries, &mut errors);
        }
    }
    errors
}

fn convert_scope(
    adapters: &mut AdapterConfig,
    scope: &str,
    registries: &Registries,
    errors: &mut Vec<ConversionError>,
) {
    convert_list(&mut adapters.checkers, RpcMethod::Check, &format!("{scope}.Checkers"), registries, errors);
    convert_list(&mut adapters.reporters, RpcMethod::Report, &format!("{scope}.Reporters"), registries, errors);
}

fn convert_list(
    list: &mut Vec<AdapterParams>,
    method: RpcMethod,
    prefix: &str,
    registries: &Registries,
    errors: &mut Vec<ConversionError>,
) {
    let entries = std::mem::take(list);
    for (i, mut entry) in entries.into_iter().enumerate() {
        if entry.runtime().is_some() {
            list.push(entry);
            continue;
        }

        let path = format!("{prefix}[{i}]");
        let kind = entry.kind().to_string();
        let builder = match method {
            RpcMethod::Check => registries.checkers.get(&kind).map(AdapterBuilder::Checker),
            RpcMethod::Report => registries.consumers.get(&kind).map(AdapterBuilder::Consumer),
        };
        let Some(builder) = builder else {
            errors.push(ConversionError::AdapterUnavailable { path, kind });
            continue;
        };

        let raw = entry.constructor.params.raw().clone();
        let state = match decode(&raw, &builder.schema()) {
            Err(source) => {
                let err = ConversionError::Decode { path: path.clone(), source };
                let state = RuntimeAdapterState::failed(path, raw, builder, err.to_string());
                errors.push(err);
                state
            }
            Ok(typed) => {
                let validated = match &builder {
                    AdapterBuilder::Checker(b) => b.validate_config(&typed),
                    AdapterBuilder::Consumer(_) => Ok(()),
                };
                match validated {
                    Ok(()) => RuntimeAdapterState::converted(path, raw, builder, typed),
                    Err(source) => {
                        let err = ConversionError::Invalid { path: path.clone(), source };
                        let state = RuntimeAdapterState::failed(path, raw, builder, err.to_string());
                        errors.push(err);
                        state
                    }
                }
            }
        };
        entry.constructor.params = Params::Converted(Box::new(state));
        list.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Checker;
    use crate::config::decode::{FieldKind, TypedParams};
    use crate::config::services::EVERY_SERVICE;

    struct ListBuilder;

    impl CheckerBuilder for ListBuilder {
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new().required("ProviderURL", FieldKind::String)
        }

        fn validate_config(&self, params: &TypedParams) -> Result<(), AdapterError> {
            match params.get_str("ProviderURL") {
                Some(url) if url.starts_with("http") => Ok(()),
                _ => Err(AdapterError::InvalidConfig("ProviderURL must be http(s)".into())),
            }
        }

        fn build_checker(&self, _params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
            Err(AdapterError::Build("unused".into()))
        }
    }

    fn registries() -> Registries {
        let mut r = Registries::new();
        r.checkers.register("list", Arc::new(ListBuilder)).unwrap();
        r
    }

    fn parse(src: &str) -> ServicesConfig {
        ServicesConfig::from_yaml(src.as_bytes()).unwrap()
    }

    const CFG: &str = r#"
_EVERY_SERVICE_:
  serviceid: _EVERY_SERVICE_
  ingress:
    checkers:
    - kind: list
      params:
        providerurl: http://lists/wl.yml
    - kind: nosuchkind
    - kind: list
      params:
        providerurl: ftp://lists/wl.yml
    - kind: list
"#;

    #[test]
    fn test_convert_marks_each_entry() {
        let mut cfg = parse(CFG);
        let errors = convert_params(&mut cfg, &registries());

        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[0].to_string(),
            "_EVERY_SERVICE_.Ingress.Checkers[1]: Adapter of type 'nosuchkind' is not available"
        );
        assert!(matches!(errors[1], ConversionError::Invalid { .. }));
        match &errors[2] {
            ConversionError::Decode { path, source } => {
                assert_eq!(path, "_EVERY_SERVICE_.Ingress.Checkers[3]");
                assert_eq!(source.missing(), ["ProviderURL".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        // the unknown kind was removed, the rest stay
        let checkers = &cfg.get(EVERY_SERVICE).unwrap().ingress.checkers;
        assert_eq!(checkers.len(), 3);
        let good = checkers[0].runtime().unwrap();
        assert_eq!(good.path, "_EVERY_SERVICE_.Ingress.Checkers[0]");
        assert_eq!(
            good.typed_params().and_then(|p| p.get_str("ProviderURL")),
            Some("http://lists/wl.yml")
        );
        assert!(checkers[1].runtime().unwrap().conversion_error().is_some());
        assert!(checkers[2].runtime().unwrap().typed_params().is_none());
    }

    #[test]
    fn test_convert_is_idempotent() {
        let mut cfg = parse(CFG);
        let registries = registries();
        convert_params(&mut cfg, &registries);
        let once = cfg.clone();

        let errors = convert_params(&mut cfg, &registries);
        assert!(errors.is_empty());
        assert_eq!(cfg, once);
    }

    #[test]
    fn test_reporters_use_consumer_namespace() {
        let mut cfg = parse(
            "svc1:\n  serviceid: svc1\n  ingress:\n    reporters:\n    - kind: list\n",
        );
        let errors = convert_params(&mut cfg, &registries());
        assert!(matches!(errors[0], ConversionError::AdapterUnavailable { .. }));
        assert_eq!(errors[0].path(), "svc1.Ingress.Reporters[0]");
    }

    #[test]
    fn test_binding_paths() {
        let mut cfg = parse(
            "svc1:\n  serviceid: svc1\n  consumers:\n    c1:\n      serviceid: c1\n      checkers:\n      - kind: gone\n",
        );
        let errors = convert_params(&mut cfg, &registries());
        assert_eq!(errors[0].path(), "svc1.Consumers.c1.Checkers[0]");
    }
}
