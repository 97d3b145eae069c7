//! Locating the webpack runtime inside a deployed page.

use crate::cache::Cache;
use crate::error::ExtractError;
use crate::fetch::{fetch_code, Fetcher};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tracing::{debug, info};
use url::Url;

/// Marker string every webpack JSONP runtime carries in its chunk error path.
const LOADING_CHUNK_MARKERS: [&str; 2] = ["\"Loading chunk \"", "'Loading chunk '"];

#[derive(Debug, Clone)]
pub struct ManifestScript {
    /// `None` when the runtime is inlined into the page.
    pub url: Option<Url>,
    /// URL relative paths in the runtime resolve against.
    pub document_url: Url,
    pub content: String,
}

impl ManifestScript {
    pub fn is_inline(&self) -> bool {
        self.url.is_none()
    }
}

#[derive(Debug)]
struct ScriptTag {
    src: Option<String>,
    text: String,
}

pub fn contains_runtime_marker(code: &str) -> bool {
    LOADING_CHUNK_MARKERS.iter().any(|marker| code.contains(marker))
}

/// Fetch `page_url` and return the first `<script>` (external or inline, in
/// document order) that contains the webpack runtime.
pub fn find_manifest_script(
    page_url: &str,
    cache: &Cache,
    fetcher: &dyn Fetcher,
) -> Result<Option<ManifestScript>, ExtractError> {
    let page = Url::parse(page_url).map_err(|source| ExtractError::InvalidUrl {
        url: page_url.to_string(),
        source,
    })?;

    let Some(html) = fetch_code(cache, fetcher, page.as_str(), true) else {
        return Ok(None);
    };

    for script in scripts_in(&html)? {
        match script.src {
            Some(src) => {
                let script_url = match page.join(src.trim()) {
                    Ok(url) => url,
                    Err(e) => {
                        debug!("Skipping script with unusable src '{}': {}", src, e);
                        continue;
                    }
                };
                let Some(content) = fetch_code(cache, fetcher, script_url.as_str(), true) else {
                    continue;
                };
                if contains_runtime_marker(&content) {
                    info!("Found webpack manifest at {}", script_url);
                    return Ok(Some(ManifestScript {
                        document_url: script_url.clone(),
                        url: Some(script_url),
                        content,
                    }));
                }
            }
            None => {
                if contains_runtime_marker(&script.text) {
                    info!("Found webpack manifest embedded in DOM");
                    return Ok(Some(ManifestScript {
                        url: None,
                        document_url: page,
                        content: script.text,
                    }));
                }
            }
        }
    }
    Ok(None)
}

fn scripts_in(html: &str) -> Result<Vec<ScriptTag>, ExtractError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;

    let mut scripts = Vec::new();
    collect_scripts(&dom.document, &mut scripts);
    Ok(scripts)
}

fn collect_scripts(handle: &Handle, scripts: &mut Vec<ScriptTag>) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        if name.local.to_string() == "script" {
            let src = attrs
                .borrow()
                .iter()
                .find(|attr| attr.name.local.to_string() == "src")
                .map(|attr| attr.value.to_string());
            let mut text = String::new();
            for child in handle.children.borrow().iter() {
                if let NodeData::Text { contents } = &child.data {
                    text.push_str(&contents.borrow());
                }
            }
            scripts.push(ScriptTag { src, text });
            return;
        }
    }
    for child in handle.children.borrow().iter() {
        collect_scripts(child, scripts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL_SECS;
    use crate::fetch::StaticFetcher;
    use tempfile::TempDir;

    const RUNTIME: &str = r#"(()=>{var r={};r.u=e=>e+".js";throw new Error("Loading chunk "+e)})()"#;

    #[test]
    fn test_finds_external_runtime_in_document_order() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let page = r#"<html><head>
            <script src="/static/vendor.js"></script>
            <script src="//cdn.test/runtime.js"></script>
        </head><body></body></html>"#;
        let fetcher = StaticFetcher::new()
            .with("https://site.test/learn", page)
            .with("https://site.test/static/vendor.js", "var vendor = 1;")
            .with("https://cdn.test/runtime.js", RUNTIME);

        let script = find_manifest_script("https://site.test/learn", &cache, &fetcher)
            .unwrap()
            .unwrap();
        assert_eq!(script.url.as_ref().map(Url::as_str), Some("https://cdn.test/runtime.js"));
        assert_eq!(script.document_url.as_str(), "https://cdn.test/runtime.js");
        assert!(!script.is_inline());
    }

    #[test]
    fn test_finds_inline_runtime() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let page = format!("<html><body><script>{}</script></body></html>", RUNTIME);
        let fetcher = StaticFetcher::new().with("https://site.test/", page);

        let script = find_manifest_script("https://site.test/", &cache, &fetcher)
            .unwrap()
            .unwrap();
        assert!(script.is_inline());
        assert_eq!(script.document_url.as_str(), "https://site.test/");
        assert!(script.content.contains("Loading chunk"));
    }

    #[test]
    fn test_page_without_runtime() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new().with("https://site.test/", "<p>hello</p>");
        let script = find_manifest_script("https://site.test/", &cache, &fetcher).unwrap();
        assert!(script.is_none());
    }

    #[test]
    fn test_invalid_page_url() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new();
        let err = find_manifest_script("not a url", &cache, &fetcher).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUrl { .. }));
    }
}
