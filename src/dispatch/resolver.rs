//! Adapter resolution.
//!
//! Turns a `(source, destination, method)` triple into the ordered list of
//! adapter entries that apply. The order is fixed:
//!
//! ```text
//! _EVERY_SERVICE_ ingress, egress, self
//!     → source egress
//!     → destination ingress
//!     → destination consumers[source]
//! ```
//!
//! Only entries converted without error are returned. Anything else is
//! skipped with a debug log.

use crate::config::services::{AdapterParams, ResolveKey, ServicesConfig, EVERY_SERVICE};

pub fn resolve<'a>(cfg: &'a ServicesConfig, key: &ResolveKey) -> Vec<&'a AdapterParams> {
    let method = key.rpc_method;
    let mut out = Vec::new();

    if let Some(every) = cfg.get(EVERY_SERVICE) {
        append(&mut out, every.ingress.for_method(method), key);
        append(&mut out, every.egress.for_method(method), key);
        append(&mut out, every.self_adapters.for_method(method), key);
    }

    if let Some(source) = cfg.get(&key.source) {
        append(&mut out, source.egress.for_method(method), key);
    }

    if let Some(destination) = cfg.get(&key.destination) {
        append(&mut out, destination.ingress.for_method(method), key);
        if let Some(binding) = destination.consumers.get(&key.source) {
            append(&mut out, binding.adapters.for_method(method), key);
        }
    }

    out
}

fn append<'a>(out: &mut Vec<&'a AdapterParams>, entries: &'a [AdapterParams], key: &ResolveKey) {
    for entry in entries {
        match entry.runtime() {
            None => {
                tracing::debug!(
                    kind = entry.kind(),
                    source = %key.source,
                    destination = %key.destination,
                    "Skipping adapter entry that was never converted"
                );
            }
            Some(state) => match state.conversion_error() {
                Some(error) => {
                    tracing::debug!(
                        kind = entry.kind(),
                        path = %state.path,
                        error,
                        "Skipping adapter entry with conversion error"
                    );
                }
                None => out.push(entry),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapter::{AdapterError, Checker, CheckerBuilder, Registries};
    use crate::config::convert::convert_params;
    use crate::config::decode::{ConfigSchema, FieldKind, TypedParams};

    struct TagBuilder;

    impl CheckerBuilder for TagBuilder {
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new().required("Tag", FieldKind::String)
        }

        fn build_checker(&self, _params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
            Err(AdapterError::Build("unused".into()))
        }
    }

    const CFG: &str = r#"
_EVERY_SERVICE_:
  serviceid: _EVERY_SERVICE_
  ingress:
    checkers: [{kind: tag, params: {tag: every-ingress}}]
  egress:
    checkers: [{kind: tag, params: {tag: every-egress}}]
  self:
    checkers: [{kind: tag, params: {tag: every-self}}]
c1:
  serviceid: c1
  egress:
    checkers:
    - {kind: tag, params: {tag: c1-egress}}
    - {kind: tag}
  ingress:
    checkers: [{kind: tag, params: {tag: c1-ingress}}]
svc1:
  serviceid: svc1
  ingress:
    checkers: [{kind: tag, params: {tag: svc1-ingress}}]
    reporters: [{kind: statsd}]
  egress:
    checkers: [{kind: tag, params: {tag: svc1-egress}}]
  consumers:
    c1:
      serviceid: c1
      checkers: [{kind: tag, params: {tag: c1-to-svc1}}]
    c2:
      serviceid: c2
      checkers: [{kind: tag, params: {tag: c2-to-svc1}}]
"#;

    fn converted() -> ServicesConfig {
        let mut registries = Registries::new();
        registries.checkers.register("tag", Arc::new(TagBuilder)).unwrap();
        let mut cfg = ServicesConfig::from_yaml(CFG.as_bytes()).unwrap();
        convert_params(&mut cfg, &registries);
        cfg
    }

    fn tags(entries: &[&AdapterParams]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| e.runtime()?.typed_params()?.get_str("Tag").map(String::from))
            .collect()
    }

    #[test]
    fn test_resolution_order() {
        let cfg = converted();
        let got = resolve(&cfg, &ResolveKey::check("c1", "svc1"));
        assert_eq!(
            tags(&got),
            vec![
                "every-ingress",
                "every-egress",
                "every-self",
                "c1-egress",
                "svc1-ingress",
                "c1-to-svc1",
            ]
        );
    }

    #[test]
    fn test_unknown_services_only_get_global_rules() {
        let cfg = converted();
        let got = resolve(&cfg, &ResolveKey::check("nobody", "nowhere"));
        assert_eq!(tags(&got), vec!["every-ingress", "every-egress", "every-self"]);
    }

    #[test]
    fn test_errored_and_unconverted_entries_are_skipped() {
        let cfg = converted();
        // c1's second egress entry is missing its required Tag
        let got = resolve(&cfg, &ResolveKey::check("c1", "x"));
        assert_eq!(got.len(), 4);

        let raw = ServicesConfig::from_yaml(CFG.as_bytes()).unwrap();
        assert!(resolve(&raw, &ResolveKey::check("c1", "svc1")).is_empty());
    }

    #[test]
    fn test_method_selects_reporters() {
        let cfg = converted();
        // statsd is not registered here, so the reporter list was emptied
        assert!(resolve(&cfg, &ResolveKey::report("c1", "svc1")).is_empty());
    }
}
