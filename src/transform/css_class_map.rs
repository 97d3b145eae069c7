//! Collects CSS-module lookup tables: object literals made only of string
//! properties, e.g. `var s = { button: "Button_button__x1" }`. The tables go
//! into `Module::class_map`; the code is left as it is. Associations are
//! registered with the CSS chunks after the chain has run.

use super::json_module::is_module_exports;
use crate::bundle::static_eval::property_key_name;
use crate::error::TransformError;
use crate::registry::Module;
use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::{AssignmentExpression, Expression, ObjectExpression, ObjectPropertyKind, VariableDeclarator};
use oxc_ast_visit::{walk, Visit};
use std::collections::BTreeMap;
use tracing::debug;

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    let allocator = Allocator::default();
    let program = syntax::parse(&allocator, &module.code)?;
    let mut tables = ClassTables::default();
    tables.visit_program(&program);
    if !tables.entries.is_empty() {
        debug!("Module {}: {} CSS class names", module.id, tables.entries.len());
    }
    module.class_map.extend(tables.entries);
    Ok(())
}

#[derive(Default)]
struct ClassTables {
    entries: BTreeMap<String, String>,
}

impl ClassTables {
    fn collect(&mut self, object: &ObjectExpression) {
        let mut table = Vec::with_capacity(object.properties.len());
        for property in &object.properties {
            let ObjectPropertyKind::ObjectProperty(p) = property else {
                return;
            };
            if p.computed || p.method {
                return;
            }
            let (Some(original), Expression::StringLiteral(hashed)) = (property_key_name(&p.key), &p.value) else {
                return;
            };
            table.push((original, hashed.value.to_string()));
        }
        self.entries.extend(table);
    }
}

impl<'a> Visit<'a> for ClassTables {
    fn visit_variable_declarator(&mut self, declarator: &VariableDeclarator<'a>) {
        let mut objects = ObjectLiterals::default();
        if let Some(init) = &declarator.init {
            objects.scan(init);
        }
        for object in objects.found {
            self.collect(object);
        }
        walk::walk_variable_declarator(self, declarator);
    }

    fn visit_assignment_expression(&mut self, assign: &AssignmentExpression<'a>) {
        if is_module_exports(&assign.left) {
            if let Expression::ObjectExpression(object) = assign.right.without_parentheses() {
                self.collect(object);
            }
        }
        walk::walk_assignment_expression(self, assign);
    }
}

/// Every object literal below a declarator's initializer.
#[derive(Default)]
struct ObjectLiterals<'b, 'a> {
    found: Vec<&'b ObjectExpression<'a>>,
}

impl<'b, 'a> ObjectLiterals<'b, 'a> {
    fn scan(&mut self, expr: &'b Expression<'a>) {
        match expr.without_parentheses() {
            Expression::ObjectExpression(object) => {
                self.found.push(object);
                for property in &object.properties {
                    if let ObjectPropertyKind::ObjectProperty(p) = property {
                        self.scan(&p.value);
                    }
                }
            }
            Expression::SequenceExpression(seq) => {
                for inner in &seq.expressions {
                    self.scan(inner);
                }
            }
            Expression::ConditionalExpression(cond) => {
                self.scan(&cond.consequent);
                self.scan(&cond.alternate);
            }
            Expression::LogicalExpression(logical) => {
                self.scan(&logical.left);
                self.scan(&logical.right);
            }
            _ => {}
        }
    }
}
