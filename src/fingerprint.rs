//! Structural fingerprints of modules.
//!
//! The canonical dump lists every node kind depth first, four spaces per
//! level, with string and numeric literal text inlined. Identifier names,
//! whitespace and import declarations do not appear in it, so two modules
//! that only differ there share a digest.

use crate::cache::sha256_hex;
use crate::error::TransformError;
use crate::registry::Module;
use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclaration, Program};
use oxc_ast::AstKind;
use oxc_ast_visit::Visit;
use oxc_span::GetSpan;
use serde::Serialize;
use std::collections::BTreeMap;

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub canonical_dump: String,
    /// Uppercase hex SHA-256 of `canonical_dump`.
    pub digest: String,
}

impl Fingerprint {
    pub fn of_program(program: &Program, source: &str) -> Self {
        let mut dump = TreeDump {
            source,
            depth: 0,
            lines: Vec::new(),
        };
        dump.visit_program(program);
        let canonical_dump = dump
            .lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            digest: sha256_hex(canonical_dump.as_bytes()),
            canonical_dump,
        }
    }

    pub fn of_code(code: &str) -> Result<Self, TransformError> {
        let allocator = Allocator::default();
        let program = syntax::parse(&allocator, code)?;
        Ok(Self::of_program(&program, code))
    }
}

struct TreeDump<'s> {
    source: &'s str,
    depth: usize,
    lines: Vec<String>,
}

impl TreeDump<'_> {
    fn label(&self, kind: &AstKind) -> String {
        let name = kind.debug_name();
        let name = name.split('(').next().unwrap_or_default().to_string();
        match kind {
            AstKind::StringLiteral(_) | AstKind::NumericLiteral(_) => {
                let span = kind.span();
                let text = self
                    .source
                    .get(span.start as usize..span.end as usize)
                    .unwrap_or_default();
                format!("{}[{}]", name, text)
            }
            _ => name,
        }
    }
}

impl<'a> Visit<'a> for TreeDump<'_> {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        let line = format!("{}{}", INDENT.repeat(self.depth), self.label(&kind));
        self.lines.push(line);
        self.depth += 1;
    }

    fn leave_node(&mut self, _kind: AstKind<'a>) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}
}

/// Modules sharing one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    /// `chunk-<c>/module-<id>` names, in registry order.
    pub modules: Vec<String>,
}

/// Fingerprint every code module that parses. Returns one digest per
/// module (`None` for files and unparsable code) in registry order.
pub fn fingerprint_modules(modules: &[Module]) -> Vec<Option<Fingerprint>> {
    use rayon::prelude::*;

    modules
        .par_iter()
        .map(|module| {
            if !module.is_code() {
                return None;
            }
            Fingerprint::of_code(&module.code).ok()
        })
        .collect()
}

/// Groups of two or more modules with identical fingerprints.
pub fn duplicate_groups(modules: &[Module], fingerprints: &[Option<Fingerprint>]) -> Vec<DuplicateGroup> {
    let mut by_digest: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (module, fingerprint) in modules.iter().zip(fingerprints) {
        if let Some(fingerprint) = fingerprint {
            by_digest
                .entry(fingerprint.digest.as_str())
                .or_default()
                .push(format!("chunk-{}/{}", module.chunk_id, module.name()));
        }
    }
    by_digest
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(digest, modules)| DuplicateGroup {
            fingerprint: digest.to_string(),
            modules,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_and_whitespace_changes_keep_digest() {
        let a = Fingerprint::of_code("const a = f(1, 'x');").unwrap();
        let b = Fingerprint::of_code("const   zz=g( 1,'x' )").unwrap();
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn test_import_declarations_are_ignored() {
        let a = Fingerprint::of_code("import * as A from './one';\nexport const x = 1;").unwrap();
        let b = Fingerprint::of_code("import B from '../other/two';\nexport const x = 1;").unwrap();
        let c = Fingerprint::of_code("export const x = 1;").unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest, c.digest);
    }

    #[test]
    fn test_literals_are_part_of_the_structure() {
        let a = Fingerprint::of_code("f(1)").unwrap();
        let b = Fingerprint::of_code("f(2)").unwrap();
        assert_ne!(a.digest, b.digest);
        assert!(a.canonical_dump.contains("NumericLiteral[1]"));
        assert!(Fingerprint::of_code("f('q')").unwrap().canonical_dump.contains("StringLiteral['q']"));
    }

    #[test]
    fn test_dump_is_indented_and_digest_uppercase() {
        let fp = Fingerprint::of_code("f(1)").unwrap();
        assert!(fp.canonical_dump.starts_with("Program"));
        assert!(fp.canonical_dump.lines().skip(1).all(|line| line.starts_with(INDENT)));
        assert!(!fp.canonical_dump.contains("\n\n"));
        assert_eq!(fp.digest, fp.digest.to_uppercase());
        assert_eq!(fp.digest.len(), 64);
    }

    #[test]
    fn test_duplicate_groups() {
        let modules = vec![
            Module::new("1", "0", "export default (e) => { e.exports = 1; }"),
            Module::new("2", "0", "export default (t) => { t.exports = 1; }"),
            Module::new("3", "1", "export default 2"),
        ];
        let fingerprints = fingerprint_modules(&modules);
        let groups = duplicate_groups(&modules, &fingerprints);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].modules, vec!["chunk-0/module-1", "chunk-0/module-2"]);
    }
}
