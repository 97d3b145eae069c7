//! Whole runs against an in-memory site.

use crate::config::DecompilerConfig;
use crate::decompiler::run;
use crate::fetch::StaticFetcher;
use std::fs;
use tempfile::TempDir;

const PAGE_URL: &str = "https://site.test/";

const RUNTIME: &str = r#"
(() => {
    var r = {};
    r.p = "/static/";
    r.u = (e) => "js/" + e + "." + { 1: "aa", 2: "bb" }[e] + ".js";
    r.miniCssF = (e) => "css/" + e + "." + { 2: "cc" }[e] + ".css";
    throw new Error("Loading chunk " + e);
})();
"#;

const APP_CHUNK: &str = r#"(self.webpackChunkapp = self.webpackChunkapp || []).push([[1], {
    10: (e, t, n) => {
        "use strict";
        n.r(t), n.d(t, { default: () => a });
        var r = n(99), s = n(11), l = n(20);
        var st = { wrap: "w_1" };
        function a() {
            return (0, r.createElement)("img", { src: l, alt: s.x, className: st.wrap });
        }
    },
    11: (e) => {
        e.exports = JSON.parse("{\"x\":1}");
    }
}]);"#;

const ASSET_CHUNK: &str = r#"(self.webpackChunkapp = self.webpackChunkapp || []).push([[2], {
    20: (e, t, n) => {
        e.exports = n.p + "media/logo.svg";
    }
}]);"#;

fn site() -> StaticFetcher {
    StaticFetcher::new()
        .with(PAGE_URL, format!("<html><head><script>{}</script></head><body></body></html>", RUNTIME))
        .with("https://site.test/static/js/1.aa.js", APP_CHUNK)
        .with("https://site.test/static/js/2.bb.js", ASSET_CHUNK)
        .with("https://site.test/static/css/2.cc.css", ".w_1{color:red}")
        .with("https://site.test/static/media/logo.svg", "<svg/>")
}

fn config(dir: &TempDir) -> DecompilerConfig {
    DecompilerConfig {
        target_url: PAGE_URL.to_string(),
        output_dir: dir.path().join("app"),
        cache_dir: dir.path().join("cache"),
        jobs: 2,
        progress: false,
        ..DecompilerConfig::default()
    }
}

#[test]
fn test_full_run_bakes_every_module() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let summary = run(&config, &site()).unwrap();

    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.css_chunks, 1);
    assert_eq!(summary.modules, 3);
    assert_eq!(summary.baked, 3);
    assert_eq!(summary.phases.len(), 10);
    assert_eq!(summary.class_associations, 1);

    let out = &config.output_dir;
    assert_eq!(fs::read_to_string(out.join("chunk-1/module-11.json")).unwrap(), "{\n  \"x\": 1\n}");
    assert_eq!(fs::read_to_string(out.join("chunk-2/assets/module-20.svg")).unwrap(), "<svg/>");

    let component = fs::read_to_string(out.join("chunk-1/module-10.tsx")).unwrap();
    assert!(component.contains("from \"react\""), "{}", component);
    assert!(component.contains("from \"./module-11.json\""), "{}", component);
    assert!(component.contains("from \"../chunk-2/assets/module-20.svg\""), "{}", component);
    assert!(component.contains("<img"), "{}", component);
    assert!(!component.contains("require"), "{}", component);

    let css = fs::read_to_string(out.join("css-modules/2.module.css")).unwrap();
    assert!(css.contains(".wrap"), "{}", css);
    assert!(!css.contains(".w_1"), "{}", css);
}

#[test]
fn test_stats_are_written_per_module() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    run(&config, &site()).unwrap();

    let stats = config.output_dir.join(".stats/chunk-1/module-10");
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(stats.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["module"]["currentLocation"], "chunk-1/module-10.tsx");
    assert_eq!(manifest["chunk"]["remoteUrl"], "https://site.test/static/js/1.aa.js");
    assert_eq!(manifest["transforms"].as_array().unwrap().len(), 10);
    assert_eq!(manifest["transforms"][1]["name"], "RefactorModuleInit");
    assert!(stats.join("transforms/4_convertToJSX/after.code").exists());
    assert!(config.output_dir.join(".stats/fingerprints.json").exists());
}

#[test]
fn test_second_run_replays_the_cache() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    run(&config, &site()).unwrap();
    let first = fs::read_to_string(config.output_dir.join("chunk-1/module-10.tsx")).unwrap();

    let summary = run(&config, &site()).unwrap();
    for phase in &summary.phases {
        assert_eq!(phase.applied, 0, "{} applied again", phase.name);
    }
    assert!(summary.phases.iter().any(|p| p.cached > 0));
    let second = fs::read_to_string(config.output_dir.join("chunk-1/module-10.tsx")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_chunk_limit_leaves_other_chunks_unresolved() {
    let dir = TempDir::new().unwrap();
    let config = DecompilerConfig {
        chunk_limit: 1,
        write_stats: false,
        ..config(&dir)
    };
    let summary = run(&config, &site()).unwrap();

    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.modules, 2);
    let component = fs::read_to_string(config.output_dir.join("chunk-1/module-10.tsx")).unwrap();
    assert!(component.contains("from \"../unresolved/module-20\""), "{}", component);
    assert!(!config.output_dir.join(".stats").exists());
}

#[test]
fn test_missing_chunk_is_skipped() {
    let dir = TempDir::new().unwrap();
    let fetcher = StaticFetcher::new()
        .with(PAGE_URL, format!("<script>{}</script>", RUNTIME))
        .with("https://site.test/static/js/1.aa.js", APP_CHUNK);
    let summary = run(&config(&dir), &fetcher).unwrap();

    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.css_chunks, 0);
    assert_eq!(summary.modules, 2);
}
