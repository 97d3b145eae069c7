//! `require.d(exports, { foo: () => bar })` -> `export { bar as foo };`
//!
//! Getters returning an identifier re-export it; any other returned
//! expression is bound to a fresh constant first. `require.r(exports)`
//! markers are dropped with the registrations. Webpack 4's
//! `require.d(exports, "foo", function () { return bar; })` form is
//! understood too.

use super::rename::{fresh_name, used_names};
use super::{rewrite, text, Edits, EXPORTS_PARAM, REQUIRE_PARAM};
use crate::bundle::static_eval::property_key_name;
use crate::error::TransformError;
use crate::registry::Module;
use crate::syntax::is_identifier_name;
use oxc_ast::ast::{Argument, CallExpression, Expression, ExpressionStatement, FunctionBody, ObjectPropertyKind, Program, Statement};
use oxc_span::GetSpan;
use std::collections::HashSet;
use tracing::warn;

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    module.code = rewrite(&module.code, decompile)?;
    Ok(())
}

enum Exported {
    Local(String),
    Value(String),
}

struct ExportCalls<'s> {
    source: &'s str,
    exports: Vec<(String, Exported)>,
    edits: Edits,
}

fn decompile(program: &Program, source: &str) -> Edits {
    let mut calls = ExportCalls {
        source,
        exports: Vec::new(),
        edits: Edits::new(),
    };
    for stmt in &program.body {
        if let Statement::ExpressionStatement(stmt) = stmt {
            calls.statement(stmt);
        }
    }
    if calls.edits.is_empty() {
        return calls.edits;
    }

    let mut used = used_names(program);
    let mut declarations = Vec::new();
    let mut specifiers = Vec::new();
    let mut exported_names = HashSet::new();
    for (name, exported) in calls.exports {
        if !exported_names.insert(name.clone()) {
            continue;
        }
        let export_name = export_name(&name);
        match exported {
            Exported::Local(local) if local == name => specifiers.push(local),
            Exported::Local(local) => specifiers.push(format!("{} as {}", local, export_name)),
            Exported::Value(value) => {
                let base = if is_identifier_name(&name) && name != "default" {
                    name.clone()
                } else {
                    format!("_{}", sanitize(&name))
                };
                let local = fresh_name(&used, &base);
                used.insert(local.clone());
                declarations.push(format!("const {} = {};", local, value));
                specifiers.push(if local == name {
                    local
                } else {
                    format!("{} as {}", local, export_name)
                });
            }
        }
    }

    let mut edits = calls.edits;
    if !specifiers.is_empty() {
        let mut tail = String::from("\n");
        for declaration in declarations {
            tail.push_str(&declaration);
            tail.push('\n');
        }
        tail.push_str(&format!("export {{ {} }};\n", specifiers.join(", ")));
        edits.insert(source.len() as u32, tail);
    }
    edits
}

fn export_name(name: &str) -> String {
    if is_identifier_name(name) {
        name.to_string()
    } else {
        serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

fn is_require_call(call: &CallExpression, helper: &str) -> bool {
    let Expression::StaticMemberExpression(member) = call.callee.without_parentheses() else {
        return false;
    };
    let on_require = matches!(&member.object, Expression::Identifier(id) if id.name == REQUIRE_PARAM);
    let on_exports = matches!(
        call.arguments.first(),
        Some(Argument::Identifier(id)) if id.name == EXPORTS_PARAM
    );
    on_require && on_exports && member.property.name == helper
}

/// Expression returned by a getter: `() => x`, `() => { return x; }`,
/// `function () { return x; }`.
fn getter_result<'b, 'a>(value: &'b Expression<'a>) -> Option<&'b Expression<'a>> {
    match value.without_parentheses() {
        Expression::ArrowFunctionExpression(arrow) if arrow.expression => {
            match arrow.body.statements.first()? {
                Statement::ExpressionStatement(stmt) => Some(&stmt.expression),
                _ => None,
            }
        }
        Expression::ArrowFunctionExpression(arrow) => returned(&arrow.body),
        Expression::FunctionExpression(func) => returned(func.body.as_deref()?),
        _ => None,
    }
}

fn returned<'b, 'a>(body: &'b FunctionBody<'a>) -> Option<&'b Expression<'a>> {
    body.statements.iter().find_map(|stmt| match stmt {
        Statement::ReturnStatement(ret) => ret.argument.as_ref(),
        _ => None,
    })
}

impl ExportCalls<'_> {
    fn exported(&self, getter: &Expression) -> Option<Exported> {
        let result = getter_result(getter)?;
        Some(match result.without_parentheses() {
            Expression::Identifier(id) => Exported::Local(id.name.to_string()),
            other => Exported::Value(text(self.source, other.span()).to_string()),
        })
    }

    /// Collect a call's exports; `false` when the call is not one we handle.
    fn take(&mut self, call: &CallExpression) -> bool {
        if is_require_call(call, "r") {
            return true;
        }
        if !is_require_call(call, "d") {
            return false;
        }
        match (call.arguments.get(1), call.arguments.get(2)) {
            (Some(Argument::ObjectExpression(table)), None) => {
                for property in &table.properties {
                    let ObjectPropertyKind::ObjectProperty(p) = property else {
                        warn!("Skipping spread in export table");
                        continue;
                    };
                    let name = property_key_name(&p.key).filter(|_| !p.computed);
                    match (name, self.exported(&p.value)) {
                        (Some(name), Some(exported)) => self.exports.push((name, exported)),
                        _ => warn!("Could not decompile export at offset {}", p.span.start),
                    }
                }
                true
            }
            (Some(Argument::StringLiteral(name)), Some(getter)) => {
                match getter.as_expression().and_then(|g| self.exported(g)) {
                    Some(exported) => self.exports.push((name.value.to_string(), exported)),
                    None => warn!("Could not decompile export '{}'", name.value),
                }
                true
            }
            _ => false,
        }
    }
}

impl ExportCalls<'_> {
    /// Registrations only count at program level; nested ones are left
    /// where they are.
    fn statement(&mut self, stmt: &ExpressionStatement) {
        match stmt.expression.without_parentheses() {
            Expression::CallExpression(call) => {
                if self.take(call) {
                    self.edits.remove(stmt.span);
                }
            }
            Expression::SequenceExpression(seq) => {
                let mut kept = Vec::new();
                let mut taken = 0;
                for expr in &seq.expressions {
                    match expr.without_parentheses() {
                        Expression::CallExpression(call) if self.take(call) => taken += 1,
                        _ => kept.push(text(self.source, expr.span())),
                    }
                }
                if taken > 0 {
                    if kept.is_empty() {
                        self.edits.remove(stmt.span);
                    } else {
                        self.edits.replace(seq.span, kept.join(", "));
                    }
                }
            }
            _ => {}
        }
    }
}
