//! `var a = require(12)` -> `import * as a from "../chunk-3/module-12"`.
//!
//! Only top-level declarations are rewritten. Ids the directory does not
//! know still get an import, pointing into `../unresolved/`.

use super::file_module::public_path_string;
use super::{rewrite, text, Edits, TransformContext, REQUIRE_PARAM};
use crate::bundle::static_eval::number_to_string;
use crate::error::TransformError;
use crate::registry::module::normalize_module_id;
use crate::registry::{Module, ModuleType};
use oxc_ast::ast::{Argument, BindingPattern, Expression, Program, Statement, VariableDeclarator};
use tracing::{debug, warn};

pub const UNRESOLVED_DIR: &str = "unresolved";

pub fn apply(module: &mut Module, ctx: &TransformContext) -> Result<(), TransformError> {
    let location = module.current_location.clone();
    module.code = rewrite(&module.code, |program, source| decompile(program, source, &location, ctx))?;
    Ok(())
}

/// Key passed to `require(..)`, as written.
fn required_key(declarator: &VariableDeclarator) -> Option<String> {
    let Expression::CallExpression(call) = declarator.init.as_ref()?.without_parentheses() else {
        return None;
    };
    let on_require = matches!(call.callee.without_parentheses(), Expression::Identifier(id) if id.name == REQUIRE_PARAM);
    if !on_require {
        return None;
    }
    match call.arguments.first()? {
        Argument::NumericLiteral(n) => Some(number_to_string(n.value)),
        Argument::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

fn decompile(program: &Program, source: &str, location: &str, ctx: &TransformContext) -> Edits {
    let mut edits = Edits::new();
    let mut imports = String::new();

    for stmt in &program.body {
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        let mut kept = Vec::new();
        for declarator in &decl.declarations {
            if let Some(Expression::BinaryExpression(binary)) = declarator.init.as_ref().map(|e| e.without_parentheses()) {
                if let Some(path) = public_path_string(binary) {
                    debug!("Found static import {}", path);
                }
            }
            let (BindingPattern::BindingIdentifier(name), Some(key)) = (&declarator.id, required_key(declarator)) else {
                kept.push(text(source, declarator.span));
                continue;
            };
            let specifier = import_path(location, &key, ctx);
            imports.push_str(&format!("import * as {} from {};\n", name.name, quote(&specifier)));
        }
        if kept.len() == decl.declarations.len() {
            continue;
        }
        if kept.is_empty() {
            edits.remove(decl.span);
        } else {
            edits.replace(decl.span, format!("{} {};", decl.kind.as_str(), kept.join(", ")));
        }
    }

    if !imports.is_empty() {
        edits.insert(0, imports);
    }
    edits
}

fn quote(specifier: &str) -> String {
    serde_json::to_string(specifier).unwrap_or_else(|_| format!("\"{}\"", specifier))
}

/// Import specifier for `require(key)` seen from the module at `location`.
pub fn import_path(location: &str, key: &str, ctx: &TransformContext) -> String {
    match ctx.directory.resolve_raw(key) {
        Some(target) => {
            let file = match target.module_type {
                ModuleType::Code => target.current_location.strip_suffix(".tsx").unwrap_or(&target.current_location),
                ModuleType::File { .. } => target.current_location.as_str(),
            };
            relative_path(location, file)
        }
        None => {
            warn!("Module {} is not registered, guessing its path", key);
            format!("../{}/module-{}", UNRESOLVED_DIR, normalize_module_id(key))
        }
    }
}

/// Path of `to` relative to the directory holding `from`; both are
/// relative to the output root.
pub fn relative_path(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target: Vec<&str> = to.split('/').collect();
    let (target_dir, file) = target.split_at(target.len().saturating_sub(1));

    let common = from_dir.iter().zip(target_dir).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
    parts.extend(&target_dir[common..]);
    parts.extend(file);

    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}
