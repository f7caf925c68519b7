//! Checker execution with lazily built, cached instances.
//!
//! # Responsibilities
//! - Hold the active services snapshot behind an atomic pointer
//! - Resolve the checkers that apply to a request and run all of them
//! - Build each distinct checker at most once and share it afterwards
//!
//! # Design Decisions
//! - Snapshot reads never block: `ArcSwap::load` on every check
//! - Cache keyed by `(kind, id, typed params)` with structural equality;
//!   a reload that keeps the same params keeps the same instance
//! - Double-checked construction under an `RwLock`; failed builds are not
//!   cached, so the next request retries

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::adapter::Checker;
use crate::config::decode::TypedParams;
use crate::config::services::{AdapterParams, ResolveKey, ServicesConfig};
use crate::control::{CheckError, CheckRequest, CheckResponse};
use crate::dispatch::resolver::resolve;
use crate::observability::metrics;
use crate::reload::ConfigListener;

/// Identity of a built checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckerKey {
    pub kind: String,
    pub id: String,
    pub params: TypedParams,
}

pub struct CheckerManager {
    config: ArcSwap<ServicesConfig>,
    cache: RwLock<HashMap<CheckerKey, Arc<dyn Checker>>>,
}

impl CheckerManager {
    /// `initial` should already have been through the conversion pass.
    pub fn new(initial: Arc<ServicesConfig>) -> Self {
        Self {
            config: ArcSwap::new(initial),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Runs every applicable checker and collects their denials.
    ///
    /// Never fails: a checker that errors contributes a permission-denied
    /// entry, a checker that cannot be built is skipped.
    pub fn check(&self, request: &CheckRequest) -> CheckResponse {
        let start = Instant::now();
        let config = self.config.load();
        let key = ResolveKey::check(request.consumer_id(), request.service_name.as_str());

        let mut check_errors = Vec::new();
        for entry in resolve(&config, &key) {
            let Some(checker) = self.checker_for(entry) else {
                continue;
            };
            match checker.check(request) {
                Ok(None) => {}
                Ok(Some(denial)) => check_errors.push(denial),
                Err(e) => {
                    tracing::warn!(checker = checker.name(), error = %e, "Checker failed");
                    check_errors.push(CheckError::permission_denied(e.to_string()));
                }
            }
        }

        let codes: Vec<_> = check_errors.iter().map(|e| e.code).collect();
        metrics::record_check(start, &codes);

        CheckResponse {
            operation_id: request.operation.operation_id.clone(),
            check_errors,
        }
    }

    fn checker_for(&self, entry: &AdapterParams) -> Option<Arc<dyn Checker>> {
        let state = entry.runtime()?;
        let params = state.typed_params()?;
        let builder = state.builder.as_checker()?;
        let key = CheckerKey {
            kind: entry.kind().to_string(),
            id: entry.id.clone(),
            params: params.clone(),
        };

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(checker) = cache.get(&key) {
                return Some(checker.clone());
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(checker) = cache.get(&key) {
            return Some(checker.clone());
        }

        match builder.build_checker(params) {
            Ok(checker) => {
                tracing::info!(kind = %key.kind, path = %state.path, "Built checker");
                metrics::record_checker_build(&key.kind, true);
                cache.insert(key, checker.clone());
                Some(checker)
            }
            Err(e) => {
                tracing::error!(kind = %key.kind, path = %state.path, error = %e, "Checker build failed");
                metrics::record_checker_build(&key.kind, false);
                None
            }
        }
    }

    /// Swaps in a new snapshot. Cached instances are kept.
    pub fn config_change(&self, config: Arc<ServicesConfig>) {
        self.config.store(config);
    }

    pub fn current_config(&self) -> Arc<ServicesConfig> {
        self.config.load_full()
    }

    /// Number of live cached checkers.
    pub fn cached_checkers(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Empties the cache and unloads every checker in it.
    pub fn unload_all(&self) {
        let drained: Vec<_> = {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.drain().map(|(_, checker)| checker).collect()
        };
        for checker in drained {
            checker.unload();
        }
    }
}

impl ConfigListener for CheckerManager {
    fn config_change(&self, config: Arc<ServicesConfig>) {
        CheckerManager::config_change(self, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::adapter::{AdapterError, CheckerBuilder, Registries};
    use crate::config::convert::convert_params;
    use crate::config::decode::{ConfigSchema, FieldKind};
    use crate::control::{CheckErrorCode, Operation};

    /// Denies with its configured message; `fail` makes `check` error instead.
    struct Fixed {
        message: String,
        fail: bool,
    }

    impl Checker for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn check(&self, _request: &CheckRequest) -> Result<Option<CheckError>, AdapterError> {
            if self.fail {
                return Err(AdapterError::Check(self.message.clone()));
            }
            Ok(Some(CheckError::new(CheckErrorCode::ClientAppBlocked, self.message.clone())))
        }
    }

    #[derive(Default)]
    struct FixedBuilder {
        builds: AtomicUsize,
    }

    impl CheckerBuilder for FixedBuilder {
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new()
                .required("Message", FieldKind::String)
                .field("Fail", FieldKind::Bool)
                .field("Broken", FieldKind::Bool)
        }

        fn build_checker(&self, params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
            if params.get_bool("Broken") == Some(true) {
                return Err(AdapterError::Build("backend unreachable".into()));
            }
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed {
                message: params.get_str("Message").unwrap_or_default().to_string(),
                fail: params.get_bool("Fail").unwrap_or(false),
            }))
        }
    }

    fn manager(yaml: &str) -> (CheckerManager, Arc<FixedBuilder>, Registries) {
        let builder = Arc::new(FixedBuilder::default());
        let mut registries = Registries::new();
        registries.checkers.register("fixed", builder.clone()).unwrap();
        let mut cfg = ServicesConfig::from_yaml(yaml.as_bytes()).unwrap();
        convert_params(&mut cfg, &registries);
        (CheckerManager::new(Arc::new(cfg)), builder, registries)
    }

    fn request(consumer: &str, service: &str) -> CheckRequest {
        CheckRequest {
            service_name: service.into(),
            operation: Operation {
                operation_id: "op-1".into(),
                consumer_id: consumer.into(),
                ..Operation::default()
            },
        }
    }

    #[test]
    fn test_every_checker_runs_and_errors_accumulate() {
        let (mgr, _, _) = manager(
            r#"
svc1:
  serviceid: svc1
  ingress:
    checkers:
    - {kind: fixed, params: {message: first}}
    - {kind: fixed, params: {message: boom, fail: true}}
    - {kind: fixed, params: {message: never, broken: true}}
    - {kind: fixed, params: {message: last}}
"#,
        );
        let resp = mgr.check(&request("c1", "svc1"));

        assert_eq!(resp.operation_id, "op-1");
        let details: Vec<_> = resp.check_errors.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(details, vec!["first", "boom", "last"]);
        assert_eq!(resp.check_errors[1].code, CheckErrorCode::PermissionDenied);
        // the broken build is not cached
        assert_eq!(mgr.cached_checkers(), 3);
    }

    #[test]
    fn test_no_rules_gives_empty_error_list() {
        let (mgr, _, _) = manager("");
        let resp = mgr.check(&request("c1", "svc1"));
        assert_eq!(resp.operation_id, "op-1");
        assert!(resp.check_errors.is_empty());
    }

    #[test]
    fn test_same_params_build_once_across_scopes_and_reloads() {
        let yaml = r#"
_EVERY_SERVICE_:
  serviceid: _EVERY_SERVICE_
  ingress:
    checkers: [{kind: fixed, params: {message: m}}]
svc1:
  serviceid: svc1
  ingress:
    checkers: [{kind: fixed, params: {Message: m, unrelated: 7}}]
"#;
        let (mgr, builder, registries) = manager(yaml);
        mgr.check(&request("c1", "svc1"));
        mgr.check(&request("c2", "svc1"));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);

        let mut reloaded = ServicesConfig::from_yaml(yaml.as_bytes()).unwrap();
        convert_params(&mut reloaded, &registries);
        mgr.config_change(Arc::new(reloaded));
        mgr.check(&request("c1", "svc1"));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_ids_get_distinct_instances() {
        let (mgr, builder, _) = manager(
            r#"
svc1:
  serviceid: svc1
  ingress:
    checkers:
    - {kind: fixed, id: a, params: {message: m}}
    - {kind: fixed, id: b, params: {message: m}}
"#,
        );
        mgr.check(&request("c1", "svc1"));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_checks_build_once() {
        let (mgr, builder, _) = manager(
            "svc1:\n  serviceid: svc1\n  ingress:\n    checkers: [{kind: fixed, params: {message: m}}]\n",
        );
        let mgr = Arc::new(mgr);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mgr = mgr.clone();
                std::thread::spawn(move || mgr.check(&request("c1", "svc1")))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().check_errors.len(), 1);
        }
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_all_empties_cache() {
        let (mgr, _, _) = manager(
            "svc1:\n  serviceid: svc1\n  ingress:\n    checkers: [{kind: fixed, params: {message: m}}]\n",
        );
        mgr.check(&request("c1", "svc1"));
        assert_eq!(mgr.cached_checkers(), 1);
        mgr.unload_all();
        assert_eq!(mgr.cached_checkers(), 0);
    }
}
