//! Static Expression Evaluator for chunk filename builders
//!
//! Webpack emits `X.u = (chunkId) => <expr>` where `<expr>` is built from
//! string literals, the chunk id, `+`, `||`, ternaries on the id and
//! `{id: "name"}[chunkId]` lookup tables. This evaluates such an expression
//! for a concrete id with JavaScript semantics, and lists the ids the
//! expression itself knows about.

use oxc_ast::ast::{Expression, ObjectPropertyKind, PropertyKey};
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Undefined,
}

impl JsValue {
    /// Chunk ids are numbers at runtime when they look like canonical numbers.
    pub fn from_chunk_id(id: &str) -> Self {
        match id.parse::<f64>() {
            Ok(n) if n.is_finite() && number_to_string(n) == id => JsValue::Num(n),
            _ => JsValue::Str(id.to_string()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            JsValue::Str(s) => !s.is_empty(),
            JsValue::Num(n) => *n != 0.0 && !n.is_nan(),
            JsValue::Bool(b) => *b,
            JsValue::Null | JsValue::Undefined => false,
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Str(s) => s.clone(),
            JsValue::Num(n) => number_to_string(*n),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Undefined => "undefined".to_string(),
        }
    }

    fn strict_eq(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Num(a), JsValue::Num(b)) => a == b,
            _ => self == other,
        }
    }

    fn loose_eq(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Null | JsValue::Undefined, JsValue::Null | JsValue::Undefined) => true,
            (JsValue::Num(n), JsValue::Str(s)) | (JsValue::Str(s), JsValue::Num(n)) => {
                s.trim().parse::<f64>().map(|parsed| parsed == *n).unwrap_or(false)
            }
            _ => self.strict_eq(other),
        }
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Name of a non-computed object key, as JavaScript would stringify it.
pub fn property_key_name(key: &PropertyKey) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        PropertyKey::NumericLiteral(n) => Some(number_to_string(n.value)),
        _ => None,
    }
}

/// Evaluate `expr` with `param` bound to `id`. Returns `None` for anything
/// outside the supported subset.
pub fn evaluate(expr: &Expression, param: &str, id: &JsValue) -> Option<JsValue> {
    match expr {
        Expression::StringLiteral(s) => Some(JsValue::Str(s.value.to_string())),
        Expression::NumericLiteral(n) => Some(JsValue::Num(n.value)),
        Expression::BooleanLiteral(b) => Some(JsValue::Bool(b.value)),
        Expression::NullLiteral(_) => Some(JsValue::Null),
        Expression::Identifier(ident) if ident.name == param => Some(id.clone()),
        Expression::Identifier(ident) if ident.name == "undefined" => Some(JsValue::Undefined),
        Expression::TemplateLiteral(tpl) => {
            let mut out = String::new();
            for (i, quasi) in tpl.quasis.iter().enumerate() {
                match &quasi.value.cooked {
                    Some(cooked) => out.push_str(cooked.as_str()),
                    None => out.push_str(quasi.value.raw.as_str()),
                }
                if let Some(inner) = tpl.expressions.get(i) {
                    out.push_str(&evaluate(inner, param, id)?.to_js_string());
                }
            }
            Some(JsValue::Str(out))
        }
        // `X.p` is the public path; the base URL already carries it
        Expression::StaticMemberExpression(member) if member.property.name == "p" => {
            Some(JsValue::Str(String::new()))
        }
        Expression::ParenthesizedExpression(paren) => evaluate(&paren.expression, param, id),
        Expression::SequenceExpression(seq) => seq
            .expressions
            .last()
            .and_then(|last| evaluate(last, param, id)),
        Expression::UnaryExpression(unary) => {
            let value = evaluate(&unary.argument, param, id)?;
            match unary.operator {
                UnaryOperator::LogicalNot => Some(JsValue::Bool(!value.truthy())),
                UnaryOperator::Void => Some(JsValue::Undefined),
                _ => None,
            }
        }
        Expression::BinaryExpression(bin) => {
            let left = evaluate(&bin.left, param, id)?;
            let right = evaluate(&bin.right, param, id)?;
            match bin.operator {
                BinaryOperator::Addition => Some(add(left, right)),
                BinaryOperator::Equality => Some(JsValue::Bool(left.loose_eq(&right))),
                BinaryOperator::Inequality => Some(JsValue::Bool(!left.loose_eq(&right))),
                BinaryOperator::StrictEquality => Some(JsValue::Bool(left.strict_eq(&right))),
                BinaryOperator::StrictInequality => Some(JsValue::Bool(!left.strict_eq(&right))),
                _ => None,
            }
        }
        Expression::LogicalExpression(logical) => {
            let left = evaluate(&logical.left, param, id)?;
            match logical.operator {
                LogicalOperator::Or if left.truthy() => Some(left),
                LogicalOperator::And if !left.truthy() => Some(left),
                LogicalOperator::Coalesce if !matches!(left, JsValue::Null | JsValue::Undefined) => {
                    Some(left)
                }
                _ => evaluate(&logical.right, param, id),
            }
        }
        Expression::ConditionalExpression(cond) => {
            if evaluate(&cond.test, param, id)?.truthy() {
                evaluate(&cond.consequent, param, id)
            } else {
                evaluate(&cond.alternate, param, id)
            }
        }
        Expression::ComputedMemberExpression(member) => {
            let Expression::ObjectExpression(table) = member.object.without_parentheses() else {
                return None;
            };
            let key = evaluate(&member.expression, param, id)?.to_js_string();
            for property in &table.properties {
                if let ObjectPropertyKind::ObjectProperty(p) = property {
                    if !p.computed && property_key_name(&p.key).as_deref() == Some(key.as_str()) {
                        return evaluate(&p.value, param, id);
                    }
                }
            }
            Some(JsValue::Undefined)
        }
        _ => None,
    }
}

fn add(left: JsValue, right: JsValue) -> JsValue {
    match (&left, &right) {
        (JsValue::Num(a), JsValue::Num(b)) => JsValue::Num(a + b),
        _ => JsValue::Str(left.to_js_string() + &right.to_js_string()),
    }
}

/// Ids named by the builder: keys of lookup tables indexed by `param`, and
/// literals compared against `param`. Order of first appearance.
pub fn referenced_ids(expr: &Expression, param: &str) -> Vec<String> {
    let mut collector = IdCollector {
        param,
        ids: Vec::new(),
        seen: HashSet::new(),
    };
    collector.visit_expression(expr);
    collector.ids
}

struct IdCollector<'p> {
    param: &'p str,
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl IdCollector<'_> {
    fn push(&mut self, id: String) {
        if self.seen.insert(id.clone()) {
            self.ids.push(id);
        }
    }

    fn is_param(&self, expr: &Expression) -> bool {
        matches!(expr.without_parentheses(), Expression::Identifier(ident) if ident.name == self.param)
    }
}

fn literal_id(expr: &Expression) -> Option<String> {
    match expr.without_parentheses() {
        Expression::StringLiteral(s) => Some(s.value.to_string()),
        Expression::NumericLiteral(n) => Some(number_to_string(n.value)),
        _ => None,
    }
}

impl<'a> Visit<'a> for IdCollector<'_> {
    fn visit_computed_member_expression(&mut self, expr: &oxc_ast::ast::ComputedMemberExpression<'a>) {
        if self.is_param(&expr.expression) {
            if let Expression::ObjectExpression(table) = expr.object.without_parentheses() {
                for property in &table.properties {
                    if let ObjectPropertyKind::ObjectProperty(p) = property {
                        if let Some(name) = property_key_name(&p.key).filter(|_| !p.computed) {
                            self.push(name);
                        }
                    }
                }
            }
        }
        walk::walk_computed_member_expression(self, expr);
    }

    fn visit_binary_expression(&mut self, expr: &oxc_ast::ast::BinaryExpression<'a>) {
        if expr.operator.is_equality() {
            if self.is_param(&expr.left) {
                if let Some(id) = literal_id(&expr.right) {
                    self.push(id);
                }
            } else if self.is_param(&expr.right) {
                if let Some(id) = literal_id(&expr.left) {
                    self.push(id);
                }
            }
        }
        walk::walk_binary_expression(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_ast::ast::Statement;

    fn with_expression<R>(code: &str, f: impl FnOnce(&Expression) -> R) -> R {
        let allocator = Allocator::default();
        let program = crate::syntax::parse(&allocator, code).unwrap();
        match &program.body[0] {
            Statement::ExpressionStatement(stmt) => f(&stmt.expression),
            _ => panic!("expected an expression statement"),
        }
    }

    fn eval_for(code: &str, id: &str) -> Option<String> {
        with_expression(code, |expr| {
            evaluate(expr, "e", &JsValue::from_chunk_id(id)).map(|v| v.to_js_string())
        })
    }

    #[test]
    fn test_concatenation_with_table() {
        let code = r#""static/js/" + e + "." + {12: "ab12", 34: "cd34"}[e] + ".chunk.js""#;
        assert_eq!(eval_for(code, "12").as_deref(), Some("static/js/12.ab12.chunk.js"));
        assert_eq!(eval_for(code, "34").as_deref(), Some("static/js/34.cd34.chunk.js"));
    }

    #[test]
    fn test_name_table_falls_back_to_id() {
        let code = r#"({5: "vendors"}[e] || e) + ".js""#;
        assert_eq!(eval_for(code, "5").as_deref(), Some("vendors.js"));
        assert_eq!(eval_for(code, "7").as_deref(), Some("7.js"));
    }

    #[test]
    fn test_ternary_on_id() {
        let code = r#"e === 99 ? "special.js" : e + ".js""#;
        assert_eq!(eval_for(code, "99").as_deref(), Some("special.js"));
        assert_eq!(eval_for(code, "1").as_deref(), Some("1.js"));
    }

    #[test]
    fn test_template_literal() {
        assert_eq!(eval_for("`chunks/${e}.js`", "3").as_deref(), Some("chunks/3.js"));
    }

    #[test]
    fn test_unsupported_expression() {
        assert_eq!(eval_for("compute(e)", "3"), None);
    }

    #[test]
    fn test_referenced_ids_from_tables_and_comparisons() {
        let code = r#"(e === 99 ? "x" : {1: "a", "vendor-main": "b"}[e]) + {1: "h"}[e]"#;
        let ids = with_expression(code, |expr| referenced_ids(expr, "e"));
        assert_eq!(ids, vec!["99", "1", "vendor-main"]);
    }

    #[test]
    fn test_chunk_id_typing() {
        assert_eq!(JsValue::from_chunk_id("12"), JsValue::Num(12.0));
        assert_eq!(JsValue::from_chunk_id("012"), JsValue::Str("012".to_string()));
        assert_eq!(JsValue::from_chunk_id("main"), JsValue::Str("main".to_string()));
    }
}
