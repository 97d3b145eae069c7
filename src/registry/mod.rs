//! Module registry: every chunk and module discovered in a run, indexed
//! for O(1) lookup.
//!
//! The registry is filled sequentially (chunks, then their modules) and is
//! only read while transforms run. Transforms that need to find other
//! modules get a [`ModuleDirectory`] snapshot instead of the registry
//! itself, so modules can be mutated in parallel.

pub mod chunk;
pub mod css;
pub mod module;

pub use chunk::{Chunk, ChunkRecord};
pub use css::{CssChunk, CssRegistry};
pub use module::{Encoding, Module, ModuleState, ModuleType, TransformRecord, TransformState};

use crate::bundle::ChunkDescriptor;
use crate::cache::Cache;
use crate::error::RegistryError;
use crate::fetch::Fetcher;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

/// Where a module lives at the moment the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub chunk_id: String,
    pub current_location: String,
    pub module_type: ModuleType,
}

/// Read-only id -> location index handed to transforms.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectory {
    entries: HashMap<String, ModuleLocation>,
}

impl ModuleDirectory {
    pub fn resolve(&self, id: &str) -> Option<&ModuleLocation> {
        self.entries.get(id)
    }

    /// Same as [`ModuleDirectory::resolve`] for a raw `require` key.
    pub fn resolve_raw(&self, raw: &str) -> Option<&ModuleLocation> {
        self.resolve(&module::normalize_module_id(raw))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First insert wins, matching [`Registry::get_module`].
    pub fn insert(&mut self, id: impl Into<String>, location: ModuleLocation) {
        self.entries.entry(id.into()).or_insert(location);
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    chunks: Vec<Chunk>,
    chunk_index: HashMap<String, usize>,
    modules: Vec<Module>,
    module_index: HashMap<String, usize>,
    module_keys: HashSet<(String, String)>,
    css: CssRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a chunk through the cache and register it. `Ok(None)` when the
    /// chunk could not be downloaded.
    pub fn register_chunk(
        &mut self,
        cache: &Cache,
        fetcher: &dyn Fetcher,
        descriptor: &ChunkDescriptor,
    ) -> Result<Option<&Chunk>, RegistryError> {
        match Chunk::load(cache, fetcher, descriptor)? {
            Some(chunk) => Ok(Some(self.add_chunk(chunk))),
            None => Ok(None),
        }
    }

    /// Register an already loaded chunk. A chunk with the same id is kept
    /// and returned instead.
    pub fn add_chunk(&mut self, chunk: Chunk) -> &Chunk {
        let index = match self.chunk_index.get(&chunk.id) {
            Some(&index) => {
                debug!("Chunk {} already registered", chunk.id);
                index
            }
            None => {
                let index = self.chunks.len();
                self.chunk_index.insert(chunk.id.clone(), index);
                self.chunks.push(chunk);
                index
            }
        };
        &self.chunks[index]
    }

    /// Split a registered chunk into modules. Modules that fail to register
    /// are logged and skipped; returns how many were added.
    pub fn extract_modules(&mut self, chunk_id: &str) -> Result<usize, RegistryError> {
        let chunk = self
            .get_chunk(chunk_id)
            .ok_or_else(|| RegistryError::UnknownChunk(chunk_id.to_string()))?;
        let modules = chunk.unpack();

        let mut added = 0;
        for module in modules {
            match self.add_module(module) {
                Ok(()) => added += 1,
                Err(e) => error!("Failed to register module: {}", e),
            }
        }
        info!("Chunk {}: {} modules", chunk_id, added);
        Ok(added)
    }

    pub fn add_module(&mut self, module: Module) -> Result<(), RegistryError> {
        let key = (module.chunk_id.clone(), module.id.clone());
        if !self.module_keys.insert(key) {
            return Err(RegistryError::DuplicateModule {
                module: module.id,
                chunk: module.chunk_id,
            });
        }
        let index = self.modules.len();
        if self.module_index.contains_key(&module.id) {
            debug!("Module {} also appears in chunk {}", module.id, module.chunk_id);
        } else {
            self.module_index.insert(module.id.clone(), index);
        }
        self.modules.push(module);
        Ok(())
    }

    /// First registered module with this id.
    pub fn get_module(&self, id: &str) -> Option<&Module> {
        self.module_index.get(id).map(|&index| &self.modules[index])
    }

    pub fn get_chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunk_index.get(id).map(|&index| &self.chunks[index])
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [Module] {
        &mut self.modules
    }

    pub fn css(&self) -> &CssRegistry {
        &self.css
    }

    pub fn css_mut(&mut self) -> &mut CssRegistry {
        &mut self.css
    }

    /// Snapshot of every module's current location.
    pub fn directory(&self) -> ModuleDirectory {
        let mut directory = ModuleDirectory::default();
        for module in &self.modules {
            directory.insert(
                module.id.clone(),
                ModuleLocation {
                    chunk_id: module.chunk_id.clone(),
                    current_location: module.current_location.clone(),
                    module_type: module.module_type,
                },
            );
        }
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, code: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            remote_path: format!("{}.js", id),
            remote_url: format!("https://cdn.test/{}.js", id),
            code: code.to_string(),
        }
    }

    #[test]
    fn test_extract_modules_registers_each_body() {
        let mut registry = Registry::new();
        registry.add_chunk(chunk("1", "self.c.push([[1], { 10: (e) => {}, 11: (e) => {} }]);"));
        assert_eq!(registry.extract_modules("1").unwrap(), 2);
        assert_eq!(registry.get_module("11").unwrap().chunk_id, "1");
        assert_eq!(registry.modules().len(), 2);
    }

    #[test]
    fn test_unknown_chunk() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.extract_modules("nope"),
            Err(RegistryError::UnknownChunk(_))
        ));
    }

    #[test]
    fn test_colliding_ids_in_one_chunk_are_rejected() {
        let mut registry = Registry::new();
        registry.add_chunk(chunk(
            "1",
            r#"self.c.push([[1], { "./a/b.js": (e) => {}, "./node_modules/a/b.js": (e) => {} }]);"#,
        ));
        assert_eq!(registry.extract_modules("1").unwrap(), 1);
        assert!(matches!(
            registry.add_module(Module::new("a-b.js", "1", "x")),
            Err(RegistryError::DuplicateModule { .. })
        ));
    }

    #[test]
    fn test_same_id_in_two_chunks_resolves_to_first() {
        let mut registry = Registry::new();
        registry.add_module(Module::new("5", "1", "first")).unwrap();
        registry.add_module(Module::new("5", "2", "second")).unwrap();
        assert_eq!(registry.get_module("5").unwrap().code, "first");

        let directory = registry.directory();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve("5").unwrap().chunk_id, "1");
        assert_eq!(directory.resolve_raw("./5").unwrap().current_location, "chunk-1/module-5.tsx");
    }

    #[test]
    fn test_duplicate_chunk_keeps_first() {
        let mut registry = Registry::new();
        registry.add_chunk(chunk("1", "a"));
        let kept = registry.add_chunk(chunk("1", "b"));
        assert_eq!(kept.code, "a");
        assert_eq!(registry.chunks().len(), 1);
    }
}
