//! `export default (e, t, n) => { .. }` -> the factory body at top level,
//! with the parameters renamed to `module`, `exports` and `require`.

use super::rename::{build_scoping, fresh_name, used_names, Renamer};
use super::{rewrite, text, Edits, EXPORTS_PARAM, MODULE_PARAM, REQUIRE_PARAM};
use crate::error::TransformError;
use crate::registry::Module;
use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, ExportDefaultDeclarationKind, Expression, FormalParameters, FunctionBody, Program, Statement};
use oxc_span::{GetSpan, Span};
use oxc_syntax::symbol::SymbolId;

const CANONICAL: [&str; 3] = [MODULE_PARAM, EXPORTS_PARAM, REQUIRE_PARAM];

struct Factory<'b, 'a> {
    statement: Span,
    params: &'b FormalParameters<'a>,
    body: &'b FunctionBody<'a>,
    expression_body: bool,
}

fn find_factory<'b, 'a>(program: &'b Program<'a>) -> Option<Factory<'b, 'a>> {
    program.body.iter().find_map(|stmt| {
        let Statement::ExportDefaultDeclaration(export) = stmt else {
            return None;
        };
        let (params, body, expression_body) = match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => (&*func.params, func.body.as_deref()?, false),
            kind => match kind.as_expression()?.without_parentheses() {
                Expression::ArrowFunctionExpression(arrow) => (&*arrow.params, &*arrow.body, arrow.expression),
                Expression::FunctionExpression(func) => (&*func.params, func.body.as_deref()?, false),
                _ => return None,
            },
        };
        let simple = params.rest.is_none()
            && !params.items.is_empty()
            && params
                .items
                .iter()
                .all(|p| matches!(p.pattern, BindingPattern::BindingIdentifier(_)));
        simple.then_some(Factory {
            statement: export.span,
            params,
            body,
            expression_body,
        })
    })
}

pub fn can_be_applied(module: &Module) -> bool {
    let allocator = Allocator::default();
    match syntax::parse(&allocator, &module.code) {
        Ok(program) => find_factory(&program).is_some(),
        Err(_) => false,
    }
}

pub fn apply(module: &mut Module) -> Result<(), TransformError> {
    let renamed = rewrite(&module.code, rename_parameters)?;
    module.code = rewrite(&renamed, hoist_body)?;
    Ok(())
}

fn param_symbol(params: &FormalParameters, index: usize) -> Option<SymbolId> {
    match &params.items.get(index)?.pattern {
        BindingPattern::BindingIdentifier(id) => id.symbol_id.get(),
        _ => None,
    }
}

fn rename_parameters(program: &Program, _source: &str) -> Edits {
    let Some(factory) = find_factory(program) else {
        return Edits::new();
    };
    let scoping = build_scoping(program);
    let mut used = used_names(program);
    let mut renamer = Renamer::new(program, &scoping);

    let params: Vec<Option<SymbolId>> = (0..CANONICAL.len()).map(|i| param_symbol(factory.params, i)).collect();
    for (index, canonical) in CANONICAL.iter().enumerate() {
        let Some(param) = params[index] else {
            continue;
        };
        // other bindings already using the canonical name move aside
        let clashing: Vec<SymbolId> = scoping
            .symbol_ids()
            .filter(|&s| s != param && scoping.symbol_name(s) == *canonical)
            .collect();
        for symbol in clashing {
            if params.contains(&Some(symbol)) {
                continue;
            }
            let aside = fresh_name(&used, &format!("_{}", canonical));
            used.insert(aside.clone());
            renamer.rename_symbol(symbol, aside);
        }
        if scoping.symbol_name(param) != *canonical {
            renamer.rename_symbol(param, *canonical);
        }
    }
    renamer.finish(program)
}

fn hoist_body(program: &Program, source: &str) -> Edits {
    let mut edits = Edits::new();
    let Some(factory) = find_factory(program) else {
        return edits;
    };
    let body = if factory.expression_body {
        factory
            .body
            .statements
            .first()
            .map(|stmt| format!("{};", text(source, stmt.span()).trim_end_matches(';')))
            .unwrap_or_default()
    } else {
        let start = factory
            .body
            .directives
            .first()
            .map(|d| d.span.start)
            .or_else(|| factory.body.statements.first().map(|s| s.span().start));
        let end = factory.body.statements.last().map(|s| s.span().end).or_else(|| factory.body.directives.last().map(|d| d.span.end));
        match (start, end) {
            (Some(start), Some(end)) => text(source, Span::new(start, end)).to_string(),
            _ => String::new(),
        }
    };
    edits.replace(factory.statement, body);
    edits
}
