//! `(0, x.y)` -> `x.y`, `!0` -> `true`, `!1` -> `false`.
//!
//! Operands that are not left-hand-side expressions keep their
//! parentheses: `a * (0, b + c)` -> `a * (b + c)`.

use super::{rewrite_to_fixpoint, text, Edits};
use crate::error::TransformError;
use crate::registry::Module;
use oxc_ast::ast::{Expression, ParenthesizedExpression, Program, UnaryExpression};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::operator::UnaryOperator;

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    module.code = rewrite_to_fixpoint(&module.code, unfurl)?;
    Ok(())
}

fn unfurl(program: &Program, source: &str) -> Edits {
    let mut finder = Unfurl {
        source,
        edits: Edits::new(),
    };
    finder.visit_program(program);
    finder.edits
}

struct Unfurl<'s> {
    source: &'s str,
    edits: Edits,
}

impl<'a> Visit<'a> for Unfurl<'_> {
    fn visit_parenthesized_expression(&mut self, paren: &ParenthesizedExpression<'a>) {
        if let Expression::SequenceExpression(seq) = &paren.expression {
            if seq.expressions.len() == 2 {
                if let Expression::NumericLiteral(zero) = &seq.expressions[0] {
                    if zero.value == 0.0 {
                        let operand = &seq.expressions[1];
                        let target = text(self.source, operand.span());
                        if stands_alone(operand) {
                            self.edits.replace(paren.span, target);
                        } else {
                            self.edits.replace(paren.span, format!("({})", target));
                        }
                        return;
                    }
                }
            }
        }
        walk::walk_parenthesized_expression(self, paren);
    }

    fn visit_unary_expression(&mut self, unary: &UnaryExpression<'a>) {
        if unary.operator == UnaryOperator::LogicalNot {
            if let Expression::NumericLiteral(n) = &unary.argument {
                if n.value == 0.0 || n.value == 1.0 {
                    let literal = if n.value == 0.0 { "true" } else { "false" };
                    self.edits.replace(unary.span, literal);
                    return;
                }
            }
        }
        walk::walk_unary_expression(self, unary);
    }
}

/// Operands that bind at least as tightly as a call callee or an operator
/// operand, so dropping the parentheses cannot change the parse.
fn stands_alone(expr: &Expression) -> bool {
    expr.is_member_expression()
        || matches!(
            expr,
            Expression::Identifier(_)
                | Expression::ThisExpression(_)
                | Expression::CallExpression(_)
                | Expression::ParenthesizedExpression(_)
        )
}
