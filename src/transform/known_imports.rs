//! Names anonymous library imports after what they are used for:
//! `a.useState(..)` marks `a` as React, so `import * as a from "../chunk-1/module-7"`
//! becomes `import * as React from "react"`.

use super::rename::{build_scoping, used_names, Renamer};
use super::{rewrite, Edits};
use crate::error::TransformError;
use crate::registry::Module;
use oxc_ast::ast::{
    CallExpression, Expression, ImportDeclarationSpecifier, JSXElement, JSXFragment, Program, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::Scoping;
use oxc_span::Span;
use oxc_syntax::symbol::SymbolId;
use std::collections::HashMap;
use tracing::debug;

pub struct KnownLibrary {
    /// Package to import from.
    pub package: &'static str,
    /// Conventional namespace binding.
    pub namespace: &'static str,
    pub functions: &'static [&'static str],
}

pub const KNOWN_LIBRARIES: &[KnownLibrary] = &[
    KnownLibrary {
        package: "react-dom",
        namespace: "ReactDom",
        functions: &["createPortal", "render", "hydrate", "findDOMNode"],
    },
    KnownLibrary {
        package: "react-dom/client",
        namespace: "ReactDomClient",
        functions: &["createRoot", "hydrateRoot"],
    },
    KnownLibrary {
        package: "react",
        namespace: "React",
        functions: &[
            "createElement",
            "useRef",
            "useState",
            "cloneElement",
            "forwardRef",
            "useEffect",
            "useMemo",
            "useCallback",
            "useContext",
            "useReducer",
            "useLayoutEffect",
            "createContext",
            "memo",
        ],
    },
];

fn library_for(function: &str) -> Option<&'static KnownLibrary> {
    KNOWN_LIBRARIES.iter().find(|lib| lib.functions.iter().any(|f| *f == function))
}

fn library_named(namespace: &str) -> Option<&'static KnownLibrary> {
    KNOWN_LIBRARIES.iter().find(|lib| lib.namespace == namespace)
}

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    module.code = rewrite(&module.code, identify)?;
    Ok(())
}

fn identify(program: &Program, _source: &str) -> Edits {
    let scoping = build_scoping(program);
    let mut usage = LibraryUsage {
        scoping: &scoping,
        found: Vec::new(),
        has_jsx: false,
    };
    usage.visit_program(program);

    let namespaces = namespace_imports(program);
    // JSX compiles back to `React.createElement`, so a namespace import
    // already named React is the react package
    if usage.has_jsx {
        let react = namespaces
            .keys()
            .copied()
            .find(|&symbol| scoping.symbol_name(symbol) == "React");
        if let (Some(symbol), Some(library)) = (react, library_named("React")) {
            if !usage.found.iter().any(|(s, _)| *s == symbol) {
                usage.found.push((symbol, library));
            }
        }
    }

    let mut used = used_names(program);
    let mut renamer = Renamer::new(program, &scoping);
    let mut sources = Vec::new();
    for (symbol, library) in usage.found {
        let current = scoping.symbol_name(symbol);
        if current != library.namespace {
            if used.contains(library.namespace) {
                debug!("{} is taken, keeping {}", library.namespace, current);
                continue;
            }
            if !renamer.rename_symbol(symbol, library.namespace) {
                continue;
            }
            used.insert(library.namespace.to_string());
        }
        if let Some(&source_span) = namespaces.get(&symbol) {
            sources.push((source_span, library.package));
        }
    }

    let mut edits = renamer.finish(program);
    for (span, package) in sources {
        edits.replace(span, format!("\"{}\"", package));
    }
    edits
}

/// Namespace import binding -> span of its module specifier.
fn namespace_imports(program: &Program) -> HashMap<SymbolId, Span> {
    let mut found = HashMap::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(import) = stmt else {
            continue;
        };
        for specifier in import.specifiers.iter().flatten() {
            if let ImportDeclarationSpecifier::ImportNamespaceSpecifier(ns) = specifier {
                if let Some(symbol) = ns.local.symbol_id.get() {
                    found.insert(symbol, import.source.span);
                }
            }
        }
    }
    found
}

struct LibraryUsage<'s> {
    scoping: &'s Scoping,
    /// First library seen per binding, in source order.
    found: Vec<(SymbolId, &'static KnownLibrary)>,
    has_jsx: bool,
}

impl<'a> Visit<'a> for LibraryUsage<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::StaticMemberExpression(member) = call.callee.without_parentheses() {
            if let Expression::Identifier(object) = &member.object {
                let symbol = object
                    .reference_id
                    .get()
                    .and_then(|id| self.scoping.get_reference(id).symbol_id());
                if let (Some(symbol), Some(library)) = (symbol, library_for(&member.property.name)) {
                    if !self.found.iter().any(|(s, _)| *s == symbol) {
                        self.found.push((symbol, library));
                    }
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_jsx_element(&mut self, element: &JSXElement<'a>) {
        self.has_jsx = true;
        walk::walk_jsx_element(self, element);
    }

    fn visit_jsx_fragment(&mut self, fragment: &JSXFragment<'a>) {
        self.has_jsx = true;
        walk::walk_jsx_fragment(self, fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> String {
        let mut module = Module::new("1", "0", code);
        apply(&mut module).unwrap();
        module.code
    }

    #[test]
    fn test_hook_call_identifies_react() {
        let out = run("import * as a from \"../chunk-1/module-7\";\nvar s = a.useState(0);");
        assert_eq!(out, "import * as React from \"react\";\nvar s = React.useState(0);");
    }

    #[test]
    fn test_portal_identifies_react_dom() {
        let out = run("import * as d from \"./module-2\";\nd.createPortal(x, y);");
        assert!(out.contains("import * as ReactDom from \"react-dom\";"));
        assert!(out.contains("ReactDom.createPortal(x, y);"));
    }

    #[test]
    fn test_jsx_marks_react_import() {
        let out = run("import * as React from \"./module-3\";\nvar el = <div />;");
        assert!(out.contains("import * as React from \"react\";"));
    }

    #[test]
    fn test_taken_name_is_not_reused() {
        let out = run("var React = 1;\nimport * as a from \"./m\";\na.useRef();");
        assert!(out.contains("import * as a from \"./m\";"));
    }

    #[test]
    fn test_unknown_functions_are_ignored() {
        let code = "import * as a from \"./m\";\na.somethingElse();";
        assert_eq!(run(code), code);
    }
}
