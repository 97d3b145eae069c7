//! Scope-aware identifier renaming.
//!
//! Symbols are resolved with `oxc_semantic`, so only the binding and the
//! references that actually point at it are rewritten; shadowing inner
//! bindings keep their names. Shorthand forms are expanded so the visible
//! name (object key, import or export name) does not change.

use super::edit::Edits;
use oxc_ast::ast::{
    AssignmentTargetPropertyIdentifier, BindingIdentifier, BindingPattern, BindingProperty, Declaration,
    ExportSpecifier, Expression, IdentifierReference, ImportSpecifier, ModuleExportName, ObjectProperty, Program,
    Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_syntax::symbol::SymbolId;
use std::collections::{HashMap, HashSet};

pub fn build_scoping(program: &Program) -> Scoping {
    SemanticBuilder::new().build(program).semantic.into_scoping()
}

pub struct Renamer<'s> {
    scoping: &'s Scoping,
    symbols: HashMap<SymbolId, String>,
    unresolved: HashMap<String, String>,
    frozen: HashSet<SymbolId>,
    edits: Edits,
}

impl<'s> Renamer<'s> {
    pub fn new(program: &Program, scoping: &'s Scoping) -> Self {
        Self {
            scoping,
            symbols: HashMap::new(),
            unresolved: HashMap::new(),
            frozen: exported_declarations(program),
            edits: Edits::new(),
        }
    }

    /// Schedule a rename. Symbols exported through their declaration
    /// (`export const a = ..`) keep their name; returns `false` for them.
    pub fn rename_symbol(&mut self, symbol: SymbolId, new_name: impl Into<String>) -> bool {
        if self.frozen.contains(&symbol) {
            return false;
        }
        self.symbols.insert(symbol, new_name.into());
        true
    }

    /// Rename references to a global that has no binding in this program.
    pub fn rename_unresolved(&mut self, name: impl Into<String>, new_name: impl Into<String>) {
        self.unresolved.insert(name.into(), new_name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.unresolved.is_empty()
    }

    pub fn finish(mut self, program: &Program) -> Edits {
        if !self.is_empty() {
            self.visit_program(program);
        }
        self.edits
    }

    fn binding_target(&self, ident: &BindingIdentifier) -> Option<&String> {
        ident.symbol_id.get().and_then(|id| self.symbols.get(&id))
    }

    fn reference_target(&self, ident: &IdentifierReference) -> Option<&String> {
        let symbol = ident
            .reference_id
            .get()
            .and_then(|id| self.scoping.get_reference(id).symbol_id());
        match symbol {
            Some(symbol) => self.symbols.get(&symbol),
            None => self.unresolved.get(ident.name.as_str()),
        }
    }
}

impl<'a> Visit<'a> for Renamer<'_> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        if let Some(new_name) = self.binding_target(ident).cloned() {
            self.edits.replace(ident.span, new_name);
        }
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(new_name) = self.reference_target(ident).cloned() {
            self.edits.replace(ident.span, new_name);
        }
    }

    // `{ a }` -> `{ a: b }`
    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if self.reference_target(ident).is_some() {
                    self.edits.insert(prop.span.start, format!("{}: ", ident.name));
                }
            }
        }
        walk::walk_object_property(self, prop);
    }

    // `const { a } = o` -> `const { a: b } = o`
    fn visit_binding_property(&mut self, prop: &BindingProperty<'a>) {
        if prop.shorthand {
            let ident = match &prop.value {
                BindingPattern::BindingIdentifier(ident) => Some(ident),
                BindingPattern::AssignmentPattern(assign) => match &assign.left {
                    BindingPattern::BindingIdentifier(ident) => Some(ident),
                    _ => None,
                },
                _ => None,
            };
            if let Some(ident) = ident {
                if self.binding_target(ident).is_some() {
                    self.edits.insert(prop.span.start, format!("{}: ", ident.name));
                }
            }
        }
        walk::walk_binding_property(self, prop);
    }

    // `({ a } = o)` -> `({ a: b } = o)`
    fn visit_assignment_target_property_identifier(&mut self, prop: &AssignmentTargetPropertyIdentifier<'a>) {
        if self.reference_target(&prop.binding).is_some() {
            self.edits.insert(prop.span.start, format!("{}: ", prop.binding.name));
        }
        walk::walk_assignment_target_property_identifier(self, prop);
    }

    // `export { a }` -> `export { b as a }`
    fn visit_export_specifier(&mut self, spec: &ExportSpecifier<'a>) {
        if let ModuleExportName::IdentifierReference(local) = &spec.local {
            if let Some(new_name) = self.reference_target(local).cloned() {
                self.edits
                    .replace(spec.span, format!("{} as {}", new_name, export_name(&spec.exported)));
                return;
            }
        }
        walk::walk_export_specifier(self, spec);
    }

    // `import { a } from "x"` -> `import { a as b } from "x"`
    fn visit_import_specifier(&mut self, spec: &ImportSpecifier<'a>) {
        if let Some(new_name) = self.binding_target(&spec.local).cloned() {
            self.edits
                .replace(spec.span, format!("{} as {}", export_name(&spec.imported), new_name));
            return;
        }
        walk::walk_import_specifier(self, spec);
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::StringLiteral(s) => format!("{:?}", s.value.as_str()),
        other => other.name().to_string(),
    }
}

fn exported_declarations(program: &Program) -> HashSet<SymbolId> {
    let mut frozen = HashSet::new();
    for stmt in &program.body {
        let Statement::ExportNamedDeclaration(export) = stmt else {
            continue;
        };
        match &export.declaration {
            Some(Declaration::VariableDeclaration(decl)) => {
                for declarator in &decl.declarations {
                    if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                        frozen.extend(id.symbol_id.get());
                    }
                }
            }
            Some(Declaration::FunctionDeclaration(func)) => {
                if let Some(id) = &func.id {
                    frozen.extend(id.symbol_id.get());
                }
            }
            Some(Declaration::ClassDeclaration(class)) => {
                if let Some(id) = &class.id {
                    frozen.extend(id.symbol_id.get());
                }
            }
            _ => {}
        }
    }
    frozen
}

/// Every identifier name bound or referenced in the program.
pub fn used_names(program: &Program) -> HashSet<String> {
    let mut collector = NameCollector::default();
    collector.visit_program(program);
    collector.names
}

/// `base`, or `base_1`, `base_2`, .. whichever is not in `used`.
pub fn fresh_name(used: &HashSet<String>, base: &str) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[derive(Default)]
struct NameCollector {
    names: HashSet<String>,
}

impl<'a> Visit<'a> for NameCollector {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax;
    use oxc_allocator::Allocator;

    fn rename_root(code: &str, from: &str, to: &str) -> String {
        let allocator = Allocator::default();
        let program = syntax::parse(&allocator, code).unwrap();
        let scoping = build_scoping(&program);
        let mut renamer = Renamer::new(&program, &scoping);
        let symbol = scoping
            .symbol_ids()
            .find(|&id| scoping.symbol_name(id) == from)
            .unwrap();
        renamer.rename_symbol(symbol, to);
        renamer.finish(&program).apply(code)
    }

    #[test]
    fn test_shadowed_binding_is_untouched() {
        let out = rename_root("var e = 1; function f(e) { return e; } g(e);", "e", "module");
        assert_eq!(out, "var module = 1; function f(e) { return e; } g(module);");
    }

    #[test]
    fn test_shorthand_forms_keep_visible_names() {
        let out = rename_root("var a = 1; var o = { a }; export { a };", "a", "b");
        assert_eq!(out, "var b = 1; var o = { a: b }; export { b as a };");
    }

    #[test]
    fn test_import_specifier_gets_alias() {
        let out = rename_root("import { x } from 'lib'; x();", "x", "y");
        assert_eq!(out, "import { x as y } from 'lib'; y();");
    }

    #[test]
    fn test_exported_declaration_is_frozen() {
        let allocator = Allocator::default();
        let code = "export const a = 1;";
        let program = syntax::parse(&allocator, code).unwrap();
        let scoping = build_scoping(&program);
        let mut renamer = Renamer::new(&program, &scoping);
        let symbol = scoping.symbol_ids().next().unwrap();
        assert!(!renamer.rename_symbol(symbol, "b"));
        assert_eq!(renamer.finish(&program).apply(code), code);
    }

    #[test]
    fn test_fresh_name() {
        let used: HashSet<String> = ["module", "module_1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fresh_name(&used, "module"), "module_2");
        assert_eq!(fresh_name(&used, "exports"), "exports");
    }
}
