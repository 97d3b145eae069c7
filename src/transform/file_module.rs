//! `module.exports = require.p + "static/media/logo.svg"` modules become
//! the asset they point at, downloaded and stored under `assets/`.

use super::json_module::is_module_exports;
use super::{TransformContext, REQUIRE_PARAM};
use crate::error::TransformError;
use crate::registry::{Encoding, Module, ModuleType};
use crate::syntax;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use oxc_allocator::Allocator;
use oxc_ast::ast::{BinaryExpression, Expression, Program, Statement};
use oxc_syntax::operator::BinaryOperator;
use tracing::{debug, error};

pub const ASSETS_DIR: &str = "assets";

pub fn apply(module: &mut Module, ctx: &TransformContext) -> Result<(), TransformError> {
    let allocator = Allocator::default();
    let program = syntax::parse(&allocator, &module.code)?;
    let Some(asset_path) = asset_reference(&program) else {
        return Ok(());
    };
    let url = ctx.base_url.join(&asset_path)?;
    debug!("Module {} is the asset {}", module.id, url);

    let (content, encoding) = match ctx.fetcher.fetch_bytes(url.as_str()) {
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => (text, Encoding::Utf8),
            Err(e) => (STANDARD.encode(e.into_bytes()), Encoding::Base64),
        },
        None => {
            error!("Failed to download asset {} for module {}", url, module.id);
            (String::new(), Encoding::Utf8)
        }
    };

    module.code = content;
    module.module_type = ModuleType::File { encoding };
    module.relocate(&format!("{}/{}{}", ASSETS_DIR, module.name(), extension(url.path())));
    Ok(())
}

/// `.svg` for `/static/media/logo.4f3a.svg`; empty when the last segment
/// has no extension.
fn extension(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rfind('.') {
        Some(dot) if dot > 0 => file[dot..].to_string(),
        _ => String::new(),
    }
}

pub(crate) fn public_path_string(binary: &BinaryExpression) -> Option<String> {
    if binary.operator != BinaryOperator::Addition {
        return None;
    }
    let Expression::StaticMemberExpression(base) = binary.left.without_parentheses() else {
        return None;
    };
    let on_require = matches!(&base.object, Expression::Identifier(id) if id.name == REQUIRE_PARAM);
    if !on_require || base.property.name != "p" {
        return None;
    }
    match binary.right.without_parentheses() {
        Expression::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

fn asset_reference(program: &Program) -> Option<String> {
    program.body.iter().find_map(|stmt| {
        let Statement::ExpressionStatement(stmt) = stmt else {
            return None;
        };
        let Expression::AssignmentExpression(assign) = stmt.expression.without_parentheses() else {
            return None;
        };
        if !is_module_exports(&assign.left) {
            return None;
        }
        match assign.right.without_parentheses() {
            Expression::BinaryExpression(binary) => public_path_string(binary),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use crate::registry::ModuleDirectory;
    use url::Url;

    fn run(code: &str, fetcher: &StaticFetcher) -> Module {
        let directory = ModuleDirectory::default();
        let base_url = Url::parse("https://cdn.test/_next/").unwrap();
        let ctx = TransformContext {
            directory: &directory,
            fetcher,
            base_url: &base_url,
        };
        let mut module = Module::new("12", "4", code);
        apply(&mut module, &ctx).unwrap();
        module
    }

    #[test]
    fn test_text_asset() {
        let fetcher = StaticFetcher::new().with("https://cdn.test/_next/static/logo.svg", "<svg/>");
        let module = run(r#"module.exports = require.p + "static/logo.svg";"#, &fetcher);
        assert_eq!(module.code, "<svg/>");
        assert_eq!(module.module_type, ModuleType::File { encoding: Encoding::Utf8 });
        assert_eq!(module.current_location, "chunk-4/assets/module-12.svg");
    }

    #[test]
    fn test_binary_asset_is_base64() {
        let fetcher = StaticFetcher::new().with("https://cdn.test/_next/a.png", vec![0x89u8, 0x50, 0xff]);
        let module = run(r#"module.exports = require.p + "a.png";"#, &fetcher);
        assert_eq!(module.code, STANDARD.encode([0x89u8, 0x50, 0xff]));
        assert_eq!(module.module_type, ModuleType::File { encoding: Encoding::Base64 });
    }

    #[test]
    fn test_missing_asset_is_empty() {
        let module = run(r#"module.exports = require.p + "gone.woff2";"#, &StaticFetcher::new());
        assert_eq!(module.code, "");
        assert_eq!(module.current_location, "chunk-4/assets/module-12.woff2");
    }

    #[test]
    fn test_other_modules_are_untouched() {
        let module = run("module.exports = a + \"b\";", &StaticFetcher::new());
        assert!(module.is_code());
    }
}
