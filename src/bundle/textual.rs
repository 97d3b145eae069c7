//! Text-level fallback for bootstrap code oxc cannot parse.
//!
//! Locates the `X.u = (e) => ...` builder by pattern, then walks it left to
//! right collecting static string parts, bare uses of the parameter and
//! `{id: "name"}[e]` tables. A table part resolves to `table[id]`, or the id
//! itself when the table has no entry (which also covers `{..}[e] || e`).

use super::static_eval::number_to_string;
use crate::error::ExtractError;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

lazy_static! {
    static ref JS_BUILDER_START: Regex =
        Regex::new(r"\.u\s*=\s*(?:function\s*)?\(?\s*(?P<param>[A-Za-z_$][\w$]*)\s*\)?\s*(?:=>)?").unwrap();
    static ref CSS_BUILDER_START: Regex =
        Regex::new(r"\.miniCssF\s*=\s*(?:function\s*)?\(?\s*(?P<param>[A-Za-z_$][\w$]*)\s*\)?\s*(?:=>)?").unwrap();
    static ref BUILDER_PART: Regex =
        Regex::new(r#""(?P<string>[^"]*)"|\{(?P<table>[^{}]*)\}|(?P<ident>[A-Za-z_$][\w$]*)"#).unwrap();
    static ref BARE_KEY: Regex =
        Regex::new(r#"(?P<lead>^|[{,]\s*)(?P<key>[A-Za-z0-9_$.\-]+)\s*:"#).unwrap();
    static ref PUBLIC_PATH: Regex = Regex::new(r#"\.p\s*=\s*"(?P<path>[^"]*)""#).unwrap();
}

enum Part {
    Static(String),
    Id,
    Table(Vec<(String, String)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderKind {
    Js,
    Css,
}

/// `(id, remote_path)` pairs for the builder of `kind`, empty when the
/// builder is not found.
pub fn chunk_paths(code: &str, kind: BuilderKind) -> Vec<(String, String)> {
    let start = match kind {
        BuilderKind::Js => &*JS_BUILDER_START,
        BuilderKind::Css => &*CSS_BUILDER_START,
    };
    let Some(found) = start.captures(code) else {
        return Vec::new();
    };
    let (Some(whole), Some(param)) = (found.get(0), found.name("param")) else {
        return Vec::new();
    };
    let param = param.as_str();
    let rest = &code[whole.end()..];
    let builder = &rest[..expression_extent(rest)];
    let Ok(lookup_suffix) = Regex::new(&format!(
        r"^\[\s*{0}\s*\](?:\s*\|\|\s*{0}\b)?",
        regex::escape(param)
    )) else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    let mut ids: Vec<String> = Vec::new();
    let mut skip_until = 0;
    for caps in BUILDER_PART.captures_iter(builder) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < skip_until {
            continue;
        }
        if let Some(text) = caps.name("string") {
            parts.push(Part::Static(text.as_str().to_string()));
        } else if let Some(ident) = caps.name("ident") {
            if ident.as_str() == param {
                parts.push(Part::Id);
            }
        } else if let Some(table) = caps.name("table") {
            if let Some(suffix) = lookup_suffix.find(&builder[whole.end()..]) {
                skip_until = whole.end() + suffix.end();
            }
            match parse_table_literal(table.as_str()) {
                Ok(entries) => {
                    for (id, _) in &entries {
                        if !ids.contains(id) {
                            ids.push(id.clone());
                        }
                    }
                    parts.push(Part::Table(entries));
                }
                Err(e) => warn!("Skipping unreadable chunk table: {}", e),
            }
        }
    }

    ids.into_iter()
        .map(|id| {
            let path: String = parts
                .iter()
                .map(|part| match part {
                    Part::Static(text) => text.clone(),
                    Part::Id => id.clone(),
                    Part::Table(entries) => entries
                        .iter()
                        .find(|(key, _)| *key == id)
                        .map(|(_, value)| value.clone())
                        .unwrap_or_else(|| id.clone()),
                })
                .collect();
            (id, path)
        })
        .collect()
}

pub fn public_path(code: &str) -> Option<String> {
    PUBLIC_PATH
        .captures(code)
        .and_then(|caps| caps.name("path"))
        .map(|m| m.as_str().to_string())
}

/// Parse the inside of a JS object literal mapping ids to file name parts.
/// Unquoted keys are quoted first; numeric values are stringified.
pub fn parse_table_literal(inner: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let trimmed = inner.trim().trim_end_matches(',');
    let normalized = BARE_KEY.replace_all(trimmed, "${lead}\"${key}\":");
    let table: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&format!("{{{}}}", normalized))?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            serde_json::Value::Number(n) => n.as_f64().map(|f| (key, number_to_string(f))),
            _ => None,
        })
        .collect())
}

/// Byte length of the expression at the start of `text`: up to the first
/// `,` or `;` outside brackets and strings, or an unbalanced closer.
fn expression_extent(text: &str) -> usize {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return i;
                }
            }
            ',' | ';' if depth == 0 => return i,
            _ => {}
        }
    }
    text.len()
}
