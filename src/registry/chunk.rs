//! Downloaded chunks and module-body extraction.

use super::module::{normalize_module_id, Module};
use crate::bundle::static_eval::property_key_name;
use crate::bundle::ChunkDescriptor;
use crate::cache::{Cache, Lookup};
use crate::error::RegistryError;
use crate::fetch::{fetch_code, Fetcher};
use crate::syntax;
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ArrayExpressionElement, Argument, Expression, ObjectExpression, ObjectPropertyKind};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub const CHUNK_NAMESPACE: &str = "WebpackChunk";

lazy_static! {
    // `    "key": ` at four spaces of indentation, as webpack's dev output lays out modules
    static ref MODULE_ENTRY: Regex = Regex::new(r#"(?m)^ {4}"?(?P<id>[^"\n:]+)"?: "#).unwrap();
}

const MODULE_ENTRY_END: &str = "\n    }";

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub remote_path: String,
    pub remote_url: String,
    pub code: String,
}

/// What the cache remembers about a chunk. Code is always fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub remote_path: String,
    pub remote_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBody {
    /// Module key as written in the chunk.
    pub key: String,
    /// `export default <factory>`.
    pub code: String,
}

impl Chunk {
    /// Resolve a chunk through the cache and download its code. `Ok(None)`
    /// when the download fails; the chunk is skipped.
    pub fn load(
        cache: &Cache,
        fetcher: &dyn Fetcher,
        descriptor: &ChunkDescriptor,
    ) -> Result<Option<Chunk>, RegistryError> {
        let record = ChunkRecord {
            id: descriptor.id.clone(),
            remote_path: descriptor.remote_path.clone(),
            remote_url: descriptor.url.to_string(),
        };
        let key = Cache::hash(&record)?;

        let lookup = cache.get_with(
            CHUNK_NAMESPACE,
            &key,
            || Chunk::download(cache, fetcher, &record),
            Chunk::record,
        )?;

        Ok(match lookup {
            Lookup::Computed(chunk) => Some(chunk),
            Lookup::Hit(cached) => {
                debug!("Chunk {} known from a previous run", cached.id);
                Chunk::download(cache, fetcher, &cached)
            }
            Lookup::Absent => None,
        })
    }

    fn download(cache: &Cache, fetcher: &dyn Fetcher, record: &ChunkRecord) -> Option<Chunk> {
        match fetch_code(cache, fetcher, &record.remote_url, true) {
            Some(code) => Some(Chunk {
                id: record.id.clone(),
                remote_path: record.remote_path.clone(),
                remote_url: record.remote_url.clone(),
                code,
            }),
            None => {
                error!("Chunk {} could not be downloaded, skipping...", record.id);
                None
            }
        }
    }

    pub fn record(&self) -> ChunkRecord {
        ChunkRecord {
            id: self.id.clone(),
            remote_path: self.remote_path.clone(),
            remote_url: self.remote_url.clone(),
        }
    }

    /// File stem of the remote path, used in progress messages.
    pub fn display_name(&self) -> &str {
        let file = self.remote_path.rsplit('/').next().unwrap_or(&self.remote_path);
        file.split('.').next().unwrap_or(file)
    }

    /// Every module factory in the chunk, wrapped as `export default <factory>`.
    ///
    /// The module table passed to `.push([[ids], {key: factory}])` is read
    /// from the syntax tree; chunks that do not parse are scanned line by
    /// line for indented `"key": {` entries instead.
    pub fn module_bodies(&self) -> Vec<ModuleBody> {
        let allocator = Allocator::default();
        match syntax::parse(&allocator, &self.code) {
            Ok(program) => {
                let mut finder = ModuleTableFinder {
                    source: &self.code,
                    bodies: None,
                };
                finder.visit_program(&program);
                match finder.bodies {
                    Some(bodies) => bodies,
                    None => {
                        debug!("Chunk {} has no module table, scanning lines", self.id);
                        scan_module_entries(&self.code)
                    }
                }
            }
            Err(e) => {
                warn!("Chunk {} does not parse ({}), scanning lines", self.id, e);
                scan_module_entries(&self.code)
            }
        }
    }

    /// Modules of this chunk, ids normalized. Bodies that cannot be
    /// turned into a module are logged and skipped.
    pub fn unpack(&self) -> Vec<Module> {
        self.module_bodies()
            .into_iter()
            .filter_map(|body| {
                let id = normalize_module_id(&body.key);
                if id.is_empty() {
                    error!("Failed to register module with empty id in chunk {}", self.id);
                    return None;
                }
                Some(Module::new(id, self.id.clone(), body.code))
            })
            .collect()
    }
}

struct ModuleTableFinder<'s> {
    source: &'s str,
    bodies: Option<Vec<ModuleBody>>,
}

impl ModuleTableFinder<'_> {
    fn text(&self, span: oxc_span::Span) -> &str {
        &self.source[span.start as usize..span.end as usize]
    }

    fn from_object(&self, table: &ObjectExpression) -> Vec<ModuleBody> {
        let mut bodies = Vec::new();
        for property in &table.properties {
            let ObjectPropertyKind::ObjectProperty(p) = property else {
                error!("Failed to register module: spread in module table");
                continue;
            };
            let Some(key) = property_key_name(&p.key).filter(|_| !p.computed) else {
                error!("Failed to register module with computed key at {}", p.span.start);
                continue;
            };
            let code = if p.method {
                // `key(e) {..}`: everything after the key is the function tail
                let tail = oxc_span::Span::new(p.key.span().end, p.value.span().end);
                format!("export default function {}", self.text(tail).trim_start())
            } else {
                format!("export default {}", self.text(p.value.span()))
            };
            bodies.push(ModuleBody { key, code });
        }
        bodies
    }

    fn from_array(&self, table: &oxc_ast::ast::ArrayExpression) -> Vec<ModuleBody> {
        table
            .elements
            .iter()
            .enumerate()
            .filter_map(|(index, element)| match element {
                ArrayExpressionElement::Elision(_) => None,
                other => other.as_expression().map(|factory| ModuleBody {
                    key: index.to_string(),
                    code: format!("export default {}", self.text(factory.span())),
                }),
            })
            .collect()
    }
}

impl<'a> Visit<'a> for ModuleTableFinder<'_> {
    fn visit_call_expression(&mut self, call: &oxc_ast::ast::CallExpression<'a>) {
        if self.bodies.is_some() {
            return;
        }
        let is_push = matches!(
            call.callee.without_parentheses(),
            Expression::StaticMemberExpression(member) if member.property.name == "push"
        );
        if is_push {
            if let Some(Argument::ArrayExpression(payload)) = call.arguments.first() {
                match payload.elements.get(1).and_then(|e| e.as_expression()) {
                    Some(Expression::ObjectExpression(table)) => {
                        self.bodies = Some(self.from_object(table));
                        return;
                    }
                    Some(Expression::ArrayExpression(table)) => {
                        self.bodies = Some(self.from_array(table));
                        return;
                    }
                    _ => {}
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// Line-oriented module table scan: an entry starts at `    "key": ` and
/// ends at the next `\n    }`.
pub fn scan_module_entries(code: &str) -> Vec<ModuleBody> {
    let mut bodies = Vec::new();
    let mut resume = 0;
    for caps in MODULE_ENTRY.captures_iter(code) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.name("id")) else {
            continue;
        };
        if whole.start() < resume {
            continue;
        }
        let body_start = whole.end();
        let Some(offset) = code[body_start..].find(MODULE_ENTRY_END) else {
            error!("Failed to register module {}: body is never closed", id.as_str());
            continue;
        };
        let body_end = body_start + offset + MODULE_ENTRY_END.len();
        resume = body_end;
        bodies.push(ModuleBody {
            key: id.as_str().trim().to_string(),
            code: format!("export default {}", &code[body_start..body_end]),
        });
    }
    bodies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL_SECS;
    use crate::fetch::StaticFetcher;
    use tempfile::TempDir;
    use url::Url;

    fn chunk(code: &str) -> Chunk {
        Chunk {
            id: "7".to_string(),
            remote_path: "static/js/7.abc.chunk.js".to_string(),
            remote_url: "https://cdn.test/static/js/7.abc.chunk.js".to_string(),
            code: code.to_string(),
        }
    }

    #[test]
    fn test_webpack5_module_table() {
        let code = r#"(self.webpackChunkapp = self.webpackChunkapp || []).push([[7], {
            123: (e, t, n) => { n.r(t); },
            "./src/App.js": function (e, t) { e.exports = 1; },
            456(e) { e.exports = 2; }
        }]);"#;
        let bodies = chunk(code).module_bodies();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0].key, "123");
        assert_eq!(bodies[0].code, "export default (e, t, n) => { n.r(t); }");
        assert_eq!(bodies[1].key, "./src/App.js");
        assert!(bodies[1].code.starts_with("export default function (e, t)"));
        assert_eq!(bodies[2].key, "456");
        assert!(bodies[2].code.starts_with("export default function (e)"));

        let modules = chunk(code).unpack();
        assert_eq!(modules[1].id, "src-App.js");
        assert_eq!(modules[1].chunk_id, "7");
    }

    #[test]
    fn test_webpack4_array_table() {
        let code = "(window.webpackJsonp = window.webpackJsonp || []).push([[2], [, function (e) { e.exports = 1; }]]);";
        let bodies = chunk(code).module_bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].key, "1");
    }

    #[test]
    fn test_line_scan_for_unparsable_chunk() {
        let code = "push([[1], {\n    \"12\": (e) => {\n        e.exports = 1;\n    },\n    34: (e) => {\n        broken(;\n    }\n}]);";
        let bodies = chunk(code).module_bodies();
        let keys: Vec<_> = bodies.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["12", "34"]);
        assert_eq!(bodies[0].code, "export default (e) => {\n        e.exports = 1;\n    }");
    }

    #[test]
    fn test_load_caches_descriptor_and_refetches_code() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let url = "https://cdn.test/static/js/7.abc.chunk.js";
        let fetcher = StaticFetcher::new().with(url, "var chunk = 1;");
        let descriptor = ChunkDescriptor {
            id: "7".to_string(),
            remote_path: "static/js/7.abc.chunk.js".to_string(),
            url: Url::parse(url).unwrap(),
        };

        let first = Chunk::load(&cache, &fetcher, &descriptor).unwrap().unwrap();
        let second = Chunk::load(&cache, &fetcher, &descriptor).unwrap().unwrap();
        assert_eq!(first.code, "var chunk = 1;");
        assert_eq!(second.code, first.code);
        assert_eq!(second.record(), first.record());
        assert_eq!(first.display_name(), "7");
    }

    #[test]
    fn test_failed_download_is_skipped() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new();
        let descriptor = ChunkDescriptor {
            id: "9".to_string(),
            remote_path: "9.js".to_string(),
            url: Url::parse("https://cdn.test/9.js").unwrap(),
        };
        assert!(Chunk::load(&cache, &fetcher, &descriptor).unwrap().is_none());
    }
}
