//! The deminification chain.
//!
//! Each transform is a `text -> text` rewrite: the module's current code is
//! parsed into a fresh oxc tree, edits are collected as byte-span
//! replacements and applied to the text. Transforms that rewrite nested
//! constructs repeat until a pass produces no edits.
//!
//! Order matters. Later transforms rely on shapes produced by earlier ones,
//! most notably on the canonical `module` / `exports` / `require` names that
//! `RefactorModuleInit` gives the factory parameters.

pub mod edit;
pub mod rename;

mod css_class_map;
mod default_symbol;
mod exports;
mod file_module;
mod imports;
mod json_module;
mod jsx;
mod known_imports;
mod module_init;
mod optional_chain;

pub use edit::Edits;
pub use known_imports::KNOWN_LIBRARIES;

use crate::error::TransformError;
use crate::fetch::Fetcher;
use crate::registry::{Module, ModuleDirectory};
use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use tracing::warn;
use url::Url;

pub const MODULE_PARAM: &str = "module";
pub const EXPORTS_PARAM: &str = "exports";
pub const REQUIRE_PARAM: &str = "require";

const MAX_PASSES: usize = 256;

/// What a transform may look at besides the module it rewrites.
pub struct TransformContext<'c> {
    pub directory: &'c ModuleDirectory,
    pub fetcher: &'c dyn Fetcher,
    /// Chunk base URL; asset paths are resolved against it.
    pub base_url: &'c Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    ReplaceDefaultSymbol,
    RefactorModuleInit,
    ExportsDecompile,
    UnfurlOptionalChain,
    ConvertToJsx,
    ConvertJsonModule,
    ConvertFileModule,
    CssModuleClassMap,
    ImportsDecompile,
    IdentifyKnownImports,
}

pub const CHAIN: [TransformKind; 10] = [
    TransformKind::ReplaceDefaultSymbol,
    TransformKind::RefactorModuleInit,
    TransformKind::ExportsDecompile,
    TransformKind::UnfurlOptionalChain,
    TransformKind::ConvertToJsx,
    TransformKind::ConvertJsonModule,
    TransformKind::ConvertFileModule,
    TransformKind::CssModuleClassMap,
    TransformKind::ImportsDecompile,
    TransformKind::IdentifyKnownImports,
];

impl TransformKind {
    /// Stable name; used as cache namespace and in `Module::transformations`.
    pub fn name(self) -> &'static str {
        match self {
            TransformKind::ReplaceDefaultSymbol => "ReplaceDefaultSymbol",
            TransformKind::RefactorModuleInit => "RefactorModuleInit",
            TransformKind::ExportsDecompile => "ExportsDecompile",
            TransformKind::UnfurlOptionalChain => "UnfurlOptionalChain",
            TransformKind::ConvertToJsx => "ConvertToJSX",
            TransformKind::ConvertJsonModule => "ConvertJsonModule",
            TransformKind::ConvertFileModule => "ConvertFileModule",
            TransformKind::CssModuleClassMap => "CSSModuleTransformer",
            TransformKind::ImportsDecompile => "ImportsDecompile",
            TransformKind::IdentifyKnownImports => "IdentifyKnownImports",
        }
    }

    pub fn can_be_applied(self, module: &Module) -> bool {
        if !module.is_code() {
            return false;
        }
        match self {
            TransformKind::RefactorModuleInit => module_init::can_be_applied(module),
            _ => true,
        }
    }

    pub fn apply(self, module: &mut Module, ctx: &TransformContext) -> Result<(), TransformError> {
        match self {
            TransformKind::ReplaceDefaultSymbol => default_symbol::apply(module),
            TransformKind::RefactorModuleInit => module_init::apply(module),
            TransformKind::ExportsDecompile => exports::apply(module),
            TransformKind::UnfurlOptionalChain => optional_chain::apply(module),
            TransformKind::ConvertToJsx => jsx::apply(module),
            TransformKind::ConvertJsonModule => json_module::apply(module),
            TransformKind::ConvertFileModule => file_module::apply(module, ctx),
            TransformKind::CssModuleClassMap => css_class_map::apply(module),
            TransformKind::ImportsDecompile => imports::apply(module, ctx),
            TransformKind::IdentifyKnownImports => known_imports::apply(module),
        }
    }
}

/// Parse `code`, collect one pass of edits and apply them.
pub fn rewrite(code: &str, pass: impl FnOnce(&Program, &str) -> Edits) -> Result<String, TransformError> {
    let allocator = Allocator::default();
    let program = syntax::parse(&allocator, code)?;
    let edits = pass(&program, code);
    if edits.is_empty() {
        return Ok(code.to_string());
    }
    let rewritten = edits.apply(code);
    let check = Allocator::default();
    if let Err(e) = syntax::parse(&check, &rewritten) {
        return Err(TransformError::Syntax(format!("rewrite produced invalid code ({})", e)));
    }
    Ok(rewritten)
}

/// Run `pass` until it stops producing edits. Every intermediate result
/// must parse.
pub fn rewrite_to_fixpoint(code: &str, pass: impl Fn(&Program, &str) -> Edits) -> Result<String, TransformError> {
    let mut current = code.to_string();
    for _ in 0..MAX_PASSES {
        let allocator = Allocator::default();
        let program = syntax::parse(&allocator, &current)?;
        let edits = pass(&program, &current);
        if edits.is_empty() {
            return Ok(current);
        }
        let next = edits.apply(&current);
        if next == current {
            return Ok(current);
        }
        current = next;
    }
    warn!("Rewrite still changing after {} passes, keeping last result", MAX_PASSES);
    let allocator = Allocator::default();
    syntax::parse(&allocator, &current)?;
    Ok(current)
}

/// Source text of a node.
pub(crate) fn text(source: &str, span: oxc_span::Span) -> &str {
    source.get(span.start as usize..span.end as usize).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_names_are_unique() {
        let mut names: Vec<_> = CHAIN.iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CHAIN.len());
    }

    #[test]
    fn test_file_modules_accept_no_transform() {
        let mut module = Module::new("1", "0", "{}");
        module.module_type = crate::registry::ModuleType::File {
            encoding: crate::registry::Encoding::Utf8,
        };
        assert!(CHAIN.iter().all(|t| !t.can_be_applied(&module)));
    }
}
