//! One decompilation run, phase by phase:
//!
//! ```text
//! page -> manifest script -> chunk URLs -> chunks -> modules
//!      -> transform chain -> CSS class maps -> fingerprints -> output
//! ```
//!
//! Only a missing manifest, or one listing no chunks, ends the run early. Chunks, modules and
//! transforms that fail are logged and left out.

use crate::bundle::{analyze_manifest, find_manifest_script, ChunkDescriptor};
use crate::cache::Cache;
use crate::config::DecompilerConfig;
use crate::error::{DecompilerError, Result};
use crate::fetch::Fetcher;
use crate::fingerprint::{duplicate_groups, fingerprint_modules, Fingerprint};
use crate::logging;
use crate::pipeline::bake;
use crate::pipeline::{collect_class_maps, PhaseReport, Pipeline};
use crate::progress::PhaseProgress;
use crate::registry::{Chunk, CssChunk, Registry};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub chunks: usize,
    pub css_chunks: usize,
    pub modules: usize,
    pub phases: Vec<PhaseReport>,
    pub class_associations: usize,
    pub duplicate_groups: usize,
    pub baked: usize,
    pub elapsed: Duration,
    /// ERROR events logged so far in this process.
    pub errors: u64,
}

pub fn run(config: &DecompilerConfig, fetcher: &dyn Fetcher) -> Result<RunSummary> {
    let started = Instant::now();
    let cache = Cache::open(&config.cache_dir, config.cache_ttl_secs)?;
    let pool = config.thread_pool()?;

    let script = find_manifest_script(&config.target_url, &cache, fetcher)?
        .ok_or_else(|| DecompilerError::ManifestNotFound(config.target_url.clone()))?;
    let manifest = analyze_manifest(&script.document_url, &script.content);
    if manifest.js_chunks.is_empty() {
        return Err(DecompilerError::NoChunks(script.document_url.to_string()));
    }

    let mut js_chunks = manifest.js_chunks;
    if config.chunk_limit > 0 && js_chunks.len() > config.chunk_limit {
        info!("Limiting run to {} of {} chunks", config.chunk_limit, js_chunks.len());
        js_chunks.truncate(config.chunk_limit);
    }

    let mut registry = Registry::new();
    for chunk in load_chunks(config, &pool, &cache, fetcher, &js_chunks) {
        registry.add_chunk(chunk);
    }
    for css in load_css_chunks(config, &pool, &cache, fetcher, &manifest.css_chunks) {
        registry.css_mut().register(css);
    }

    let chunk_ids: Vec<String> = registry.chunks().iter().map(|c| c.id.clone()).collect();
    let bar = PhaseProgress::new(config.progress, "Extracting modules", chunk_ids.len());
    for id in &chunk_ids {
        if let Err(e) = registry.extract_modules(id) {
            error!("Could not extract modules of chunk {}: {}", id, e);
        }
        bar.inc();
    }
    bar.finish();
    info!("Registered {} modules", registry.modules().len());

    let pipeline = Pipeline {
        cache: &cache,
        fetcher,
        base_url: &manifest.base_url,
        progress: config.progress,
    };
    let phases = pipeline.run(&mut registry, &pool);
    let class_associations = collect_class_maps(&mut registry);

    let fingerprints = pool.install(|| fingerprint_modules(registry.modules()));
    let groups = duplicate_groups(registry.modules(), &fingerprints);
    for group in &groups {
        info!("Identical modules {}: {}", group.fingerprint, group.modules.join(", "));
    }

    let baked = bake_all(config, &pool, &registry, &fingerprints);
    if let Err(e) = bake::bake_css(&config.output_dir, registry.css()) {
        error!("Could not write CSS modules: {}", e);
    }
    if config.write_stats {
        if let Err(e) = bake::bake_fingerprints(&config.output_dir, &groups) {
            error!("Could not write fingerprint report: {}", e);
        }
    }

    cache.close()?;
    Ok(RunSummary {
        chunks: registry.chunks().len(),
        css_chunks: registry.css().chunks().len(),
        modules: registry.modules().len(),
        phases,
        class_associations,
        duplicate_groups: groups.len(),
        baked,
        elapsed: started.elapsed(),
        errors: logging::error_count(),
    })
}

fn load_chunks(
    config: &DecompilerConfig,
    pool: &ThreadPool,
    cache: &Cache,
    fetcher: &dyn Fetcher,
    descriptors: &[ChunkDescriptor],
) -> Vec<Chunk> {
    let bar = PhaseProgress::new(config.progress, "Downloading chunks", descriptors.len());
    let loaded: Vec<Option<Chunk>> = pool.install(|| {
        descriptors
            .par_iter()
            .map(|descriptor| {
                let chunk = match Chunk::load(cache, fetcher, descriptor) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("Chunk {} failed to load: {}", descriptor.id, e);
                        None
                    }
                };
                bar.inc();
                chunk
            })
            .collect()
    });
    bar.finish();
    loaded.into_iter().flatten().collect()
}

fn load_css_chunks(
    config: &DecompilerConfig,
    pool: &ThreadPool,
    cache: &Cache,
    fetcher: &dyn Fetcher,
    descriptors: &[ChunkDescriptor],
) -> Vec<CssChunk> {
    let bar = PhaseProgress::new(config.progress, "Downloading CSS", descriptors.len());
    let loaded: Vec<Option<CssChunk>> = pool.install(|| {
        descriptors
            .par_iter()
            .map(|descriptor| {
                let chunk = CssChunk::load(cache, fetcher, descriptor);
                bar.inc();
                chunk
            })
            .collect()
    });
    bar.finish();
    loaded.into_iter().flatten().collect()
}

/// Write every module, plus its stats when enabled. Returns how many
/// modules were written.
fn bake_all(
    config: &DecompilerConfig,
    pool: &ThreadPool,
    registry: &Registry,
    fingerprints: &[Option<Fingerprint>],
) -> usize {
    let output: &Path = &config.output_dir;
    let modules = registry.modules();
    let bar = PhaseProgress::new(config.progress, "Baking", modules.len());

    let baked = pool.install(|| {
        modules
            .par_iter()
            .enumerate()
            .map(|(i, module)| {
                let written = match bake::bake_module(output, module) {
                    Ok(_) => true,
                    Err(e) => {
                        error!("Could not bake {}: {}", module.name(), e);
                        false
                    }
                };
                if config.write_stats {
                    let chunk = registry.get_chunk(&module.chunk_id);
                    let fingerprint = fingerprints.get(i).and_then(Option::as_ref);
                    if let Err(e) = bake::bake_stats(output, module, chunk, fingerprint) {
                        warn!("Could not write stats for {}: {}", module.name(), e);
                    }
                }
                bar.inc();
                written
            })
            .filter(|&written| written)
            .count()
    });
    bar.finish();
    baked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> DecompilerConfig {
        DecompilerConfig {
            target_url: "https://site.test/".to_string(),
            output_dir: dir.path().join("app"),
            cache_dir: dir.path().join("cache"),
            jobs: 2,
            progress: false,
            ..DecompilerConfig::default()
        }
    }

    #[test]
    fn test_missing_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher::new().with("https://site.test/", "<html><script>var a = 1;</script></html>");
        let result = run(&config(&dir), &fetcher);
        assert!(matches!(result, Err(DecompilerError::ManifestNotFound(_))));
    }

    #[test]
    fn test_manifest_without_chunks_is_fatal() {
        let dir = TempDir::new().unwrap();
        let page = r#"<html><script>(() => { throw new Error("Loading chunk " + e); })();</script></html>"#;
        let fetcher = StaticFetcher::new().with("https://site.test/", page);
        let config = config(&dir);

        match run(&config, &fetcher) {
            Err(DecompilerError::NoChunks(url)) => assert_eq!(url, "https://site.test/"),
            other => panic!("expected NoChunks, got {:?}", other.map(|s| s.modules)),
        }
        assert!(!config.output_dir.exists());
    }
}
