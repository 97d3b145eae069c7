//! `X.createElement(type, props, ...children)` -> JSX.
//!
//! Calls are recognised by shape, not by the name of `X`; the binding
//! behind `X` is renamed to `React` when that name is free. Innermost calls
//! are converted first so parents see their children as JSX.

use super::rename::{build_scoping, used_names, Renamer};
use super::{rewrite, rewrite_to_fixpoint, text, Edits};
use crate::error::TransformError;
use crate::registry::Module;
use lazy_static::lazy_static;
use oxc_ast::ast::{Argument, CallExpression, Expression, ObjectPropertyKind, Program};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::Scoping;
use oxc_span::GetSpan;
use oxc_syntax::symbol::SymbolId;
use regex::Regex;

pub const JSX_FACTORY: &str = "React";

lazy_static! {
    static ref INTRINSIC_TAG: Regex = Regex::new(r"^[a-z][A-Za-z0-9]*(?:-[A-Za-z0-9]+)*$").unwrap();
    static ref ATTRIBUTE_NAME: Regex = Regex::new(r"^[A-Za-z_$][\w$]*(?:[-:][\w$]+)*$").unwrap();
}

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    let named = rewrite(&module.code, name_factory)?;
    module.code = rewrite_to_fixpoint(&named, convert_leaves)?;
    Ok(())
}

fn is_create_element(call: &CallExpression) -> bool {
    !call.arguments.is_empty()
        && matches!(
            call.callee.without_parentheses(),
            Expression::StaticMemberExpression(member) if member.property.name == "createElement"
        )
}

fn name_factory(program: &Program, _source: &str) -> Edits {
    let scoping = build_scoping(program);
    let mut finder = FactoryFinder {
        scoping: &scoping,
        symbol: None,
    };
    finder.visit_program(program);
    let Some(symbol) = finder.symbol else {
        return Edits::new();
    };
    if scoping.symbol_name(symbol) == JSX_FACTORY || used_names(program).contains(JSX_FACTORY) {
        return Edits::new();
    }
    let mut renamer = Renamer::new(program, &scoping);
    renamer.rename_symbol(symbol, JSX_FACTORY);
    renamer.finish(program)
}

struct FactoryFinder<'s> {
    scoping: &'s Scoping,
    symbol: Option<SymbolId>,
}

impl<'a> Visit<'a> for FactoryFinder<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if self.symbol.is_none() && is_create_element(call) {
            if let Expression::StaticMemberExpression(member) = call.callee.without_parentheses() {
                if let Expression::Identifier(object) = &member.object {
                    self.symbol = object
                        .reference_id
                        .get()
                        .and_then(|id| self.scoping.get_reference(id).symbol_id());
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

fn convert_leaves(program: &Program, source: &str) -> Edits {
    let mut converter = Converter {
        source,
        pending: 0,
        edits: Edits::new(),
    };
    converter.visit_program(program);
    converter.edits
}

struct Converter<'s> {
    source: &'s str,
    /// createElement calls converted in this pass, or waiting on a
    /// descendant that was. Calls that cannot become JSX are not counted,
    /// so their parent converts around them.
    pending: usize,
    edits: Edits,
}

impl<'a> Visit<'a> for Converter<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if !is_create_element(call) {
            walk::walk_call_expression(self, call);
            return;
        }
        let before = self.pending;
        walk::walk_call_expression(self, call);
        if self.pending != before {
            self.pending += 1;
        } else if let Some(jsx) = element(call, self.source) {
            self.edits.replace(call.span, jsx);
            self.pending += 1;
        }
    }
}

fn element_name(arg: &Argument, source: &str) -> Option<String> {
    match arg.as_expression()?.without_parentheses() {
        Expression::StringLiteral(tag) if INTRINSIC_TAG.is_match(&tag.value) => Some(tag.value.to_string()),
        // lowercase identifiers would read as intrinsic tags
        Expression::Identifier(id) if !id.name.starts_with(|c: char| c.is_ascii_lowercase()) => {
            Some(id.name.to_string())
        }
        Expression::StaticMemberExpression(member) if is_member_chain(&member.object) => {
            Some(text(source, member.span).to_string())
        }
        _ => None,
    }
}

fn is_member_chain(expr: &Expression) -> bool {
    match expr {
        Expression::Identifier(_) => true,
        Expression::StaticMemberExpression(member) => is_member_chain(&member.object),
        _ => false,
    }
}

fn attributes(arg: Option<&Argument>, source: &str) -> Option<Vec<String>> {
    let Some(arg) = arg else {
        return Some(Vec::new());
    };
    let expr = arg.as_expression()?.without_parentheses();
    match expr {
        Expression::NullLiteral(_) => Some(Vec::new()),
        Expression::Identifier(id) if id.name == "undefined" => Some(Vec::new()),
        Expression::ObjectExpression(props) => props
            .properties
            .iter()
            .map(|property| match property {
                ObjectPropertyKind::SpreadProperty(spread) => {
                    Some(format!("{{...{}}}", text(source, spread.argument.span())))
                }
                ObjectPropertyKind::ObjectProperty(p) => {
                    if p.computed || p.method {
                        return None;
                    }
                    let key = crate::bundle::static_eval::property_key_name(&p.key)?;
                    if !ATTRIBUTE_NAME.is_match(&key) {
                        return None;
                    }
                    Some(format!("{}={{{}}}", key, text(source, p.value.span())))
                }
            })
            .collect(),
        other => Some(vec![format!("{{...{}}}", text(source, other.span()))]),
    }
}

fn children<'b, 'a: 'b>(args: impl Iterator<Item = &'b Argument<'a>>, source: &str) -> Option<Vec<String>> {
    args.map(|arg| match arg.as_expression()?.without_parentheses() {
            jsx @ (Expression::JSXElement(_) | Expression::JSXFragment(_)) => {
                Some(text(source, jsx.span()).to_string())
            }
            other => Some(format!("{{{}}}", text(source, other.span()))),
        })
        .collect()
}

fn element(call: &CallExpression, source: &str) -> Option<String> {
    let name = element_name(call.arguments.first()?, source)?;
    let attrs = attributes(call.arguments.get(1), source)?;
    let kids = children(call.arguments.iter().skip(2), source)?;

    let mut open = name.clone();
    for attr in &attrs {
        open.push(' ');
        open.push_str(attr);
    }
    Some(if kids.is_empty() {
        format!("<{} />", open)
    } else {
        format!("<{}>{}</{}>", open, kids.join("\n"), name)
    })
}
