//! Identifiers spelled like the `default` keyword (`Default`, `DEFAULT`)
//! are renamed to `_<name>`. Code that does not parse gets a textual pass
//! for the `default` patterns minifiers leave behind instead.

use super::rename::{build_scoping, fresh_name, used_names, Renamer};
use super::rewrite;
use crate::error::TransformError;
use crate::registry::Module;
use crate::syntax;
use lazy_static::lazy_static;
use oxc_ast::ast::{BindingIdentifier, IdentifierReference};
use oxc_ast_visit::Visit;
use oxc_semantic::Scoping;
use oxc_syntax::symbol::SymbolId;
use regex::{Captures, Regex};
use tracing::debug;

lazy_static! {
    static ref GETTER_TO_DEFAULT: Regex = Regex::new(r"\s?\bdefault: ?\(\) ?=> ?default\b,?").unwrap();
    static ref DEFAULT_WORD: Regex = Regex::new(r"\bdefault\b").unwrap();
}

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    if !syntax::is_valid(&module.code) {
        debug!("Module {} does not parse, renaming `default` textually", module.id);
        module.code = replace_textually(&module.code);
        return Ok(());
    }

    module.code = rewrite(&module.code, |program, _| {
        let scoping = build_scoping(program);
        let mut finder = DefaultLike {
            scoping: &scoping,
            bindings: Vec::new(),
            globals: Vec::new(),
        };
        finder.visit_program(program);
        let DefaultLike { bindings, globals, .. } = finder;

        let mut used = used_names(program);
        let mut renamer = Renamer::new(program, &scoping);
        for (symbol, name) in bindings {
            let new_name = fresh_name(&used, &format!("_{}", name));
            used.insert(new_name.clone());
            renamer.rename_symbol(symbol, new_name);
        }
        for name in globals {
            let new_name = fresh_name(&used, &format!("_{}", name));
            used.insert(new_name.clone());
            renamer.rename_unresolved(name, new_name);
        }
        renamer.finish(program)
    })?;
    Ok(())
}

struct DefaultLike<'s> {
    scoping: &'s Scoping,
    bindings: Vec<(SymbolId, String)>,
    globals: Vec<String>,
}

fn is_default_like(name: &str) -> bool {
    name.eq_ignore_ascii_case("default")
}

impl<'a> Visit<'a> for DefaultLike<'_> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        if !is_default_like(&ident.name) {
            return;
        }
        if let Some(symbol) = ident.symbol_id.get() {
            if !self.bindings.iter().any(|(s, _)| *s == symbol) {
                self.bindings.push((symbol, ident.name.to_string()));
            }
        }
    }

    // bound references are renamed through their binding
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if !is_default_like(&ident.name) {
            return;
        }
        let resolved = ident
            .reference_id
            .get()
            .and_then(|id| self.scoping.get_reference(id).symbol_id());
        if resolved.is_none() && !self.globals.iter().any(|g| g == ident.name.as_str()) {
            self.globals.push(ident.name.to_string());
        }
    }
}

/// `default = x` -> `_default = x`, `default.x` -> `_default.x`,
/// `=> default` -> `=> _default`; `default: () => default` getters are
/// dropped. `export default`, `case`/`default:` labels and `.default`
/// member names are left alone.
fn replace_textually(code: &str) -> String {
    let code = GETTER_TO_DEFAULT.replace_all(code, "");
    DEFAULT_WORD
        .replace_all(&code, |caps: &Captures| {
            let Some(found) = caps.get(0) else {
                return String::new();
            };
            let before = code[..found.start()].trim_end();
            let after = code[found.end()..].trim_start();
            let member = before.ends_with('.');
            let exported = before.ends_with("export");
            let assigned = after.starts_with('=') && !after.starts_with("==") && !after.starts_with("=>");
            let returned = before.ends_with("=>");
            let object = after.starts_with('.');
            if !member && !exported && (assigned || returned || object) {
                "_default".to_string()
            } else {
                found.as_str().to_string()
            }
        })
        .into_owned()
}
