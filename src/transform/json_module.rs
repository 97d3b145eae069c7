//! `module.exports = JSON.parse("...")` modules become `.json` files.

use super::{EXPORTS_PARAM, MODULE_PARAM};
use crate::error::TransformError;
use crate::registry::{Encoding, Module, ModuleType};
use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, AssignmentTarget, Expression, Program, Statement};

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    let allocator = Allocator::default();
    let program = syntax::parse(&allocator, &module.code)?;
    let Some(literal) = embedded_json(&program) else {
        return Ok(());
    };
    let value: serde_json::Value = serde_json::from_str(&literal)?;
    let pretty = serde_json::to_string_pretty(&value)?;

    module.code = pretty;
    module.module_type = ModuleType::File {
        encoding: Encoding::Utf8,
    };
    module.relocate(&format!("{}.json", module.name()));
    Ok(())
}

pub(crate) fn is_module_exports(target: &AssignmentTarget) -> bool {
    match target {
        AssignmentTarget::StaticMemberExpression(member) => {
            member.property.name == EXPORTS_PARAM
                && matches!(&member.object, Expression::Identifier(id) if id.name == MODULE_PARAM)
        }
        _ => false,
    }
}

/// The string handed to `JSON.parse` when it is the module's only statement.
fn embedded_json(program: &Program) -> Option<String> {
    if program.body.len() != 1 {
        return None;
    }
    let Statement::ExpressionStatement(stmt) = &program.body[0] else {
        return None;
    };
    let Expression::AssignmentExpression(assign) = stmt.expression.without_parentheses() else {
        return None;
    };
    if !is_module_exports(&assign.left) {
        return None;
    }
    let Expression::CallExpression(call) = assign.right.without_parentheses() else {
        return None;
    };
    let Expression::StaticMemberExpression(callee) = call.callee.without_parentheses() else {
        return None;
    };
    let on_json = matches!(&callee.object, Expression::Identifier(id) if id.name == "JSON");
    if !on_json || callee.property.name != "parse" || call.arguments.len() != 1 {
        return None;
    }
    match &call.arguments[0] {
        Argument::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_module_becomes_file() {
        let mut module = Module::new("7", "2", r#"module.exports = JSON.parse("{\"a\":1}");"#);
        apply(&mut module).unwrap();
        assert_eq!(module.code, "{\n  \"a\": 1\n}");
        assert_eq!(module.module_type, ModuleType::File { encoding: Encoding::Utf8 });
        assert_eq!(module.current_location, "chunk-2/module-7.json");
    }

    #[test]
    fn test_key_order_is_preserved() {
        let mut module = Module::new("7", "2", r#"module.exports = JSON.parse('{"z":1,"a":[true,null]}')"#);
        apply(&mut module).unwrap();
        assert!(module.code.find("\"z\"").unwrap() < module.code.find("\"a\"").unwrap());
    }

    #[test]
    fn test_other_statements_disqualify() {
        let code = r#"var x = 1; module.exports = JSON.parse("{}");"#;
        let mut module = Module::new("7", "2", code);
        apply(&mut module).unwrap();
        assert_eq!(module.code, code);
        assert!(module.is_code());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut module = Module::new("7", "2", r#"module.exports = JSON.parse("{oops");"#);
        assert!(matches!(apply(&mut module), Err(TransformError::Json(_))));
    }
}
