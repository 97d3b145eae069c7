//! Bundle extraction: from a page URL to the list of chunk URLs.
//!
//! The webpack runtime assigns three things we care about:
//!
//! ```text
//! X.p = "/static/";                                   public path
//! X.u = (e) => "js/" + e + "." + {1: "ab"}[e] + ".js"  JS chunk file names
//! X.miniCssF = (e) => "css/" + e + ".css"             CSS chunk file names
//! ```
//!
//! The builders are evaluated statically for every id they mention. Code
//! that does not parse falls back to a text scan of the same shapes.

pub mod manifest;
pub mod static_eval;
pub mod textual;

pub use manifest::{find_manifest_script, ManifestScript};

use crate::syntax;
use oxc_allocator::Allocator;
use oxc_ast::ast::{AssignmentTarget, BindingPattern, Expression, FormalParameters, FunctionBody, Statement};
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator};
use serde::Serialize;
use static_eval::{evaluate, referenced_ids, JsValue};
use textual::BuilderKind;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub id: String,
    pub remote_path: String,
    pub url: Url,
}

#[derive(Debug, Clone)]
pub struct BundleManifest {
    pub base_url: Url,
    pub js_chunks: Vec<ChunkDescriptor>,
    pub css_chunks: Vec<ChunkDescriptor>,
}

impl BundleManifest {
    pub fn is_empty(&self) -> bool {
        self.js_chunks.is_empty() && self.css_chunks.is_empty()
    }
}

/// Recover chunk descriptors from runtime bootstrap `code`. Relative paths
/// resolve against `document_url`. Never fails; an unrecognised runtime
/// yields an empty manifest.
pub fn analyze_manifest(document_url: &Url, code: &str) -> BundleManifest {
    let allocator = Allocator::default();
    let scan = match syntax::parse(&allocator, code) {
        Ok(program) => {
            let mut scan = BootstrapScan::default();
            scan.visit_program(&program);
            Some(scan)
        }
        Err(e) => {
            warn!("Bootstrap code does not parse ({}), scanning text instead", e);
            None
        }
    };

    let (js_paths, css_paths, public_path) = match scan {
        Some(scan) if scan.js.is_some() => (
            scan.js.unwrap_or_default(),
            scan.css.unwrap_or_default(),
            scan.public_path,
        ),
        _ => (
            textual::chunk_paths(code, BuilderKind::Js),
            textual::chunk_paths(code, BuilderKind::Css),
            textual::public_path(code),
        ),
    };

    let base_url = resolve_base_url(document_url, public_path.as_deref());
    debug!("Chunk base URL is {}", base_url);

    let manifest = BundleManifest {
        js_chunks: descriptors(&base_url, js_paths),
        css_chunks: descriptors(&base_url, css_paths),
        base_url,
    };
    info!(
        "Discovered {} JS chunks and {} CSS chunks",
        manifest.js_chunks.len(),
        manifest.css_chunks.len()
    );
    manifest
}

fn descriptors(base_url: &Url, paths: Vec<(String, String)>) -> Vec<ChunkDescriptor> {
    paths
        .into_iter()
        .filter_map(|(id, remote_path)| match base_url.join(&remote_path) {
            Ok(url) => Some(ChunkDescriptor { id, remote_path, url }),
            Err(e) => {
                warn!("Chunk {} has an unusable path '{}': {}", id, remote_path, e);
                None
            }
        })
        .collect()
}

/// Public path resolved against the document; the document's origin when
/// there is none. Always ends in `/` so chunk paths join beneath it.
pub fn resolve_base_url(document_url: &Url, public_path: Option<&str>) -> Url {
    let origin = document_url.join("/").unwrap_or_else(|_| document_url.clone());
    let mut base = match public_path {
        // "auto" means "next to the runtime script"
        Some("auto") => document_url.join("./").unwrap_or(origin),
        Some(path) if !path.is_empty() => document_url.join(path).unwrap_or(origin),
        _ => origin,
    };
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);
    base
}

#[derive(Default)]
struct BootstrapScan {
    js: Option<Vec<(String, String)>>,
    css: Option<Vec<(String, String)>>,
    public_path: Option<String>,
}

impl BootstrapScan {
    fn record(&mut self, property: &str, params: &FormalParameters, body: &FunctionBody) {
        let slot = match property {
            "u" => &mut self.js,
            "miniCssF" => &mut self.css,
            _ => return,
        };
        if slot.is_some() {
            return;
        }
        if let Some(paths) = builder_paths(params, body) {
            *slot = Some(paths);
        }
    }
}

impl<'a> Visit<'a> for BootstrapScan {
    fn visit_assignment_expression(&mut self, expr: &oxc_ast::ast::AssignmentExpression<'a>) {
        if expr.operator == AssignmentOperator::Assign {
            if let AssignmentTarget::StaticMemberExpression(member) = &expr.left {
                let property = member.property.name.as_str();
                match expr.right.without_parentheses() {
                    Expression::ArrowFunctionExpression(arrow) => {
                        self.record(property, &arrow.params, &arrow.body);
                    }
                    Expression::FunctionExpression(func) => {
                        if let Some(body) = &func.body {
                            self.record(property, &func.params, body);
                        }
                    }
                    Expression::StringLiteral(s) if property == "p" && self.public_path.is_none() => {
                        self.public_path = Some(s.value.to_string());
                    }
                    _ => {}
                }
            }
        }
        walk::walk_assignment_expression(self, expr);
    }

    // webpack 4: function jsonpScriptSrc(e) { return r.p + "" + ... }
    fn visit_function(&mut self, func: &oxc_ast::ast::Function<'a>, flags: oxc_syntax::scope::ScopeFlags) {
        if self.js.is_none() && func.id.is_some() {
            if let Some(body) = &func.body {
                if returned_expression(body).is_some_and(starts_with_public_path) {
                    self.js = builder_paths(&func.params, body);
                }
            }
        }
        walk::walk_function(self, func, flags);
    }
}

fn single_param_name<'b>(params: &'b FormalParameters) -> Option<&'b str> {
    if params.items.len() != 1 || params.rest.is_some() {
        return None;
    }
    match &params.items[0].pattern {
        BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

fn returned_expression<'b, 'a>(body: &'b FunctionBody<'a>) -> Option<&'b Expression<'a>> {
    body.statements.iter().find_map(|stmt| match stmt {
        Statement::ReturnStatement(ret) => ret.argument.as_ref(),
        Statement::ExpressionStatement(expr) if body.statements.len() == 1 => Some(&expr.expression),
        _ => None,
    })
}

fn starts_with_public_path(expr: &Expression) -> bool {
    match expr.without_parentheses() {
        Expression::BinaryExpression(bin) if bin.operator == BinaryOperator::Addition => {
            starts_with_public_path(&bin.left)
        }
        Expression::StaticMemberExpression(member) => member.property.name == "p",
        _ => false,
    }
}

fn builder_paths(params: &FormalParameters, body: &FunctionBody) -> Option<Vec<(String, String)>> {
    let param = single_param_name(params)?;
    let expr = returned_expression(body)?;
    let paths: Vec<(String, String)> = referenced_ids(expr, param)
        .into_iter()
        .filter_map(|id| {
            let value = evaluate(expr, param, &JsValue::from_chunk_id(&id));
            match value {
                Some(JsValue::Str(path)) => Some((id, path)),
                _ => {
                    debug!("Chunk {} name could not be evaluated", id);
                    None
                }
            }
        })
        .collect();
    Some(paths)
}
