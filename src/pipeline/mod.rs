//! Runs the transform chain over every registered module.
//!
//! Each (module, transform) step goes through the same states:
//!
//! 1. The step is keyed by module id, chunk id, transform name and the
//!    code it would start from. A cached result is adopted as is and the
//!    transform is not run.
//! 2. A transform whose name is already in `Module::transformations`, or
//!    that cannot be applied to the module, is skipped.
//! 3. Otherwise it runs inside a log capture. Success is cached; an error
//!    restores the module and is recorded, and the chain goes on.
//!
//! Phases follow the chain: transform N runs over every module (in
//! parallel) before transform N+1 starts.

pub mod bake;

use crate::cache::Cache;
use crate::error::CacheError;
use crate::fetch::Fetcher;
use crate::logging::{self, LogMessage};
use crate::progress::PhaseProgress;
use crate::registry::{Module, ModuleState, Registry, TransformRecord, TransformState};
use crate::transform::{TransformContext, TransformKind, CHAIN};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepKey<'k> {
    id: &'k str,
    chunk: &'k str,
    name: &'k str,
    before_code: &'k str,
}

pub fn cache_namespace(kind: TransformKind) -> String {
    format!("Transformer-{}", kind.name())
}

fn step_key(module: &Module, kind: TransformKind) -> Result<String, CacheError> {
    Cache::hash(&StepKey {
        id: &module.id,
        chunk: &module.chunk_id,
        name: kind.name(),
        before_code: &module.code,
    })
}

/// Run one transform on one module and append its record to the module's
/// transformation log.
pub fn run_step(module: &mut Module, kind: TransformKind, cache: &Cache, ctx: &TransformContext) -> TransformState {
    let name = kind.name();
    let namespace = cache_namespace(kind);
    let started = Instant::now();
    let before_code = module.code.clone();

    let key = match step_key(module, kind) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("No cache key for {} on {}: {}", name, module.name(), e);
            None
        }
    };
    let cached = match &key {
        Some(key) => cache.lookup::<ModuleState>(&namespace, key).unwrap_or_else(|e| {
            warn!("Cache lookup for {} on {} failed: {}", name, module.name(), e);
            None
        }),
        None => None,
    };

    let (state, was_cached, log_messages) = if let Some(cached) = cached {
        debug!("{} on {} restored from cache", name, module.name());
        module.restore(cached);
        (TransformState::Success, true, Vec::new())
    } else if module.transformations.iter().any(|t| t == name) || !kind.can_be_applied(module) {
        (TransformState::Skipped, false, Vec::new())
    } else {
        let snapshot = module.state();
        let (result, mut messages) = logging::capture(|| kind.apply(module, ctx));
        match result {
            Ok(()) => {
                if let Some(key) = &key {
                    if let Err(e) = cache.add(&namespace, key, &module.state()) {
                        warn!("Could not cache {} on {}: {}", name, module.name(), e);
                    }
                }
                (TransformState::Success, false, messages)
            }
            Err(e) => {
                module.restore(snapshot);
                let message = format!("{} failed on {}: {}", name, module.name(), e);
                error!("{}", message);
                messages.push(LogMessage::error(message));
                (TransformState::Error, false, messages)
            }
        }
    };

    module.transformation_log.push(TransformRecord {
        name: name.to_string(),
        state,
        was_cached,
        duration_ms: started.elapsed().as_millis() as u64,
        before_code,
        after_code: module.code.clone(),
        log_messages,
    });
    if !module.transformations.iter().any(|t| t == name) {
        module.transformations.push(name.to_string());
    }
    state
}

/// Outcome counts of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub applied: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PhaseReport {
    fn count(&mut self, module: &Module) {
        let Some(record) = module.transformation_log.last() else {
            return;
        };
        match (record.state, record.was_cached) {
            (TransformState::Success, true) => self.cached += 1,
            (TransformState::Success, false) => self.applied += 1,
            (TransformState::Skipped, _) => self.skipped += 1,
            (TransformState::Error, _) => self.failed += 1,
        }
    }
}

pub struct Pipeline<'p> {
    pub cache: &'p Cache,
    pub fetcher: &'p dyn Fetcher,
    /// Chunk base URL, for asset modules.
    pub base_url: &'p Url,
    pub progress: bool,
}

impl Pipeline<'_> {
    /// Run `kind` over every module. Modules see the locations other
    /// modules had when the phase started.
    pub fn run_phase(&self, registry: &mut Registry, pool: &ThreadPool, kind: TransformKind) -> PhaseReport {
        let directory = registry.directory();
        let ctx = TransformContext {
            directory: &directory,
            fetcher: self.fetcher,
            base_url: self.base_url,
        };
        let modules = registry.modules_mut();
        let bar = PhaseProgress::new(self.progress, kind.name(), modules.len());

        pool.install(|| {
            modules.par_iter_mut().for_each(|module| {
                run_step(module, kind, self.cache, &ctx);
                bar.inc();
            })
        });
        bar.finish();

        let mut report = PhaseReport {
            name: kind.name().to_string(),
            ..PhaseReport::default()
        };
        for module in registry.modules() {
            report.count(module);
        }
        info!(
            "{}: {} applied, {} cached, {} skipped, {} failed",
            report.name, report.applied, report.cached, report.skipped, report.failed
        );
        report
    }

    /// The whole chain, one phase per transform.
    pub fn run(&self, registry: &mut Registry, pool: &ThreadPool) -> Vec<PhaseReport> {
        CHAIN
            .iter()
            .map(|&kind| self.run_phase(registry, pool, kind))
            .collect()
    }
}

/// Register the CSS class maps collected by the chain with the CSS chunks.
/// Returns how many associations were added.
pub fn collect_class_maps(registry: &mut Registry) -> usize {
    let maps: Vec<_> = registry
        .modules()
        .iter()
        .filter(|m| !m.class_map.is_empty())
        .map(|m| m.class_map.clone())
        .collect();
    let css = registry.css_mut();
    let added: usize = maps.iter().map(|map| css.apply_class_map(map)).sum();
    if added > 0 {
        info!("Associated {} CSS class names", added);
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL_SECS;
    use crate::fetch::StaticFetcher;
    use crate::registry::ModuleDirectory;
    use tempfile::TempDir;

    fn with_ctx<R>(f: impl FnOnce(&TransformContext) -> R) -> R {
        let directory = ModuleDirectory::default();
        let fetcher = StaticFetcher::new();
        let base_url = Url::parse("https://cdn.test/").unwrap();
        f(&TransformContext {
            directory: &directory,
            fetcher: &fetcher,
            base_url: &base_url,
        })
    }

    #[test]
    fn test_success_is_recorded_and_cached() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let mut module = Module::new("1", "0", "f(!0);");

        let state = with_ctx(|ctx| run_step(&mut module, TransformKind::UnfurlOptionalChain, &cache, ctx));
        assert_eq!(state, TransformState::Success);
        assert_eq!(module.code, "f(true);");
        let record = &module.transformation_log[0];
        assert_eq!(record.before_code, "f(!0);");
        assert_eq!(record.after_code, "f(true);");
        assert!(!record.was_cached);
        assert_eq!(module.transformations, vec!["UnfurlOptionalChain"]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_skipped_when_not_applicable() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let mut module = Module::new("1", "0", "var a = 1;");

        let state = with_ctx(|ctx| run_step(&mut module, TransformKind::RefactorModuleInit, &cache, ctx));
        assert_eq!(state, TransformState::Skipped);
        assert_eq!(module.transformations, vec!["RefactorModuleInit"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_error_restores_module() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let mut module = Module::new("1", "0", r#"module.exports = JSON.parse("{nope");"#);

        let state = with_ctx(|ctx| run_step(&mut module, TransformKind::ConvertJsonModule, &cache, ctx));
        assert_eq!(state, TransformState::Error);
        assert!(module.is_code());
        assert_eq!(module.code, r#"module.exports = JSON.parse("{nope");"#);
        assert_eq!(module.transformation_log[0].error_count(), 1);
        assert!(cache.is_empty());
    }
}
