//! Shared oxc parsing entry point.
//!
//! Module bodies are plain minified JavaScript that may grow JSX once the
//! JSX pass has run, so everything is parsed as an ES module with JSX on
//! and TypeScript off (generic arrows would otherwise be ambiguous).

use crate::error::TransformError;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_span::SourceType;

pub fn source_type() -> SourceType {
    SourceType::default().with_module(true).with_jsx(true)
}

/// Parse `code`, failing on the first syntax error.
pub fn parse<'a>(allocator: &'a Allocator, code: &'a str) -> Result<Program<'a>, TransformError> {
    let ret = Parser::new(allocator, code, source_type()).parse();
    if ret.panicked {
        return Err(TransformError::Syntax("parser aborted".to_string()));
    }
    if let Some(first) = ret.errors.first() {
        return Err(TransformError::Syntax(first.to_string()));
    }
    Ok(ret.program)
}

/// `true` when `code` parses without errors.
pub fn is_valid(code: &str) -> bool {
    let allocator = Allocator::default();
    parse(&allocator, code).is_ok()
}

pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
