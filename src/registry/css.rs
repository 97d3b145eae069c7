//! CSS chunks and the hashed -> original class-name associations found in
//! CSS-module lookup tables.

use crate::bundle::ChunkDescriptor;
use crate::cache::Cache;
use crate::fetch::{fetch_code, Fetcher};
use crate::format::{format, Dialect};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::{debug, error};

pub const CSS_MODULES_DIR: &str = "css-modules";

lazy_static! {
    static ref SELECTOR: Regex = Regex::new(r"(?P<selector>[^{};]+)\{").unwrap();
    static ref CLASS_NAME: Regex = Regex::new(r"\.(?P<name>-?[_a-zA-Z][\w-]*)").unwrap();
}

#[derive(Debug, Clone)]
pub struct CssChunk {
    pub id: String,
    pub remote_path: String,
    pub remote_url: String,
    pub current_location: String,
    pub code: String,
    /// Class selectors in order of first appearance.
    pub class_names: Vec<String>,
}

impl CssChunk {
    /// `css/34.ff00.css` -> `34`.
    pub fn chunk_id(remote_path: &str) -> String {
        let file = remote_path.rsplit('/').next().unwrap_or(remote_path);
        file.split('.').next().unwrap_or(file).to_string()
    }

    pub fn load(cache: &Cache, fetcher: &dyn Fetcher, descriptor: &ChunkDescriptor) -> Option<CssChunk> {
        let Some(code) = fetch_code(cache, fetcher, descriptor.url.as_str(), true) else {
            error!("CSS chunk {} could not be downloaded, skipping...", descriptor.id);
            return None;
        };
        Some(CssChunk::from_code(
            &descriptor.remote_path,
            descriptor.url.as_str(),
            &format(&code, Dialect::Css),
        ))
    }

    pub fn from_code(remote_path: &str, remote_url: &str, code: &str) -> Self {
        let id = Self::chunk_id(remote_path);
        Self {
            current_location: format!("{}/{}.module.css", CSS_MODULES_DIR, id),
            id,
            remote_path: remote_path.to_string(),
            remote_url: remote_url.to_string(),
            class_names: class_names(code),
            code: code.to_string(),
        }
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.class_names.iter().any(|c| c == name)
    }
}

fn class_names(code: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for selector in SELECTOR.captures_iter(code).filter_map(|c| c.name("selector")) {
        // at-rule preludes like `@media (min-width: 1.5em)` carry no classes
        if selector.as_str().trim_start().starts_with('@') {
            continue;
        }
        for name in CLASS_NAME.captures_iter(selector.as_str()).filter_map(|c| c.name("name")) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

#[derive(Debug, Default)]
pub struct CssRegistry {
    chunks: Vec<CssChunk>,
    /// hashed -> original
    associations: BTreeMap<String, String>,
}

impl CssRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chunk unless one with the same id is already known.
    pub fn register(&mut self, chunk: CssChunk) -> bool {
        if self.chunks.iter().any(|c| c.id == chunk.id) {
            debug!("CSS chunk {} already registered", chunk.id);
            return false;
        }
        self.chunks.push(chunk);
        true
    }

    pub fn chunks(&self) -> &[CssChunk] {
        &self.chunks
    }

    pub fn find_class(&self, class_name: &str) -> Option<&CssChunk> {
        self.chunks.iter().find(|chunk| chunk.has_class(class_name))
    }

    /// Remember that `hashed` was written as `original`. Ignored unless
    /// some registered stylesheet actually declares `hashed`.
    pub fn add_association(&mut self, original: &str, hashed: &str) -> bool {
        if self.find_class(hashed).is_none() {
            return false;
        }
        self.associations
            .entry(hashed.to_string())
            .or_insert_with(|| original.to_string());
        true
    }

    /// Feed a module's class map (original -> hashed). Returns how many
    /// pairs matched a stylesheet.
    pub fn apply_class_map(&mut self, class_map: &BTreeMap<String, String>) -> usize {
        class_map
            .iter()
            .filter(|(original, hashed)| self.add_association(original, hashed))
            .count()
    }

    pub fn original_name(&self, hashed: &str) -> Option<&str> {
        self.associations.get(hashed).map(String::as_str)
    }

    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    /// Stylesheet text with every associated `.hashed` selector renamed.
    pub fn baked_code(&self, chunk: &CssChunk) -> String {
        let renamed = CLASS_NAME.replace_all(&chunk.code, |caps: &Captures| {
            let name = &caps["name"];
            match self.original_name(name) {
                Some(original) => {
                    debug!(".{} -> .{}", name, original);
                    format!(".{}", original)
                }
                None => caps[0].to_string(),
            }
        });
        format(&renamed, Dialect::Css)
    }
}
