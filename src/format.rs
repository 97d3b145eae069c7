//! Tolerant code formatter.
//!
//! Formatting never fails: anything that cannot be parsed in the requested
//! dialect is returned unchanged.

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Code,
    Css,
}

pub fn format(code: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Code => format_code(code),
        Dialect::Css => format_css(code),
    }
}

fn format_code(code: &str) -> String {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, crate::syntax::source_type()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        debug!("Formatter left unparsable code untouched ({} errors)", ret.errors.len());
        return code.to_string();
    }
    Codegen::new().build(&ret.program).code
}

// One declaration per line, one rule per block line. Only applied to
// minified input (no newlines) so hand-written sheets stay as they are.
fn format_css(code: &str) -> String {
    if code.trim().is_empty() || code.trim_end().contains('\n') {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len() + code.len() / 8);
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    for c in code.chars() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            '{' => {
                depth += 1;
                out.push_str(" {\n");
                out.push_str(&"  ".repeat(depth));
            }
            ';' => {
                out.push_str(";\n");
                out.push_str(&"  ".repeat(depth));
            }
            '}' => {
                depth = depth.saturating_sub(1);
                while out.ends_with(' ') {
                    out.pop();
                }
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&"  ".repeat(depth));
                out.push_str("}\n");
                out.push_str(&"  ".repeat(depth));
            }
            _ => out.push(c),
        }
    }
    let mut formatted = out.trim_end().to_string();
    formatted.push('\n');
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_code_is_returned_unchanged() {
        let broken = "function (";
        assert_eq!(format(broken, Dialect::Code), broken);
    }

    #[test]
    fn test_code_is_reprinted() {
        let formatted = format("const a=1;let b=a+2", Dialect::Code);
        assert!(formatted.contains("const a = 1;"));
        assert!(formatted.contains("let b = a + 2;"));
    }

    #[test]
    fn test_minified_css_is_split() {
        let formatted = format(".a{color:red;margin:0}", Dialect::Css);
        assert!(formatted.starts_with(".a {\n  color:red;\n  margin:0\n}"));
    }
}
