//! Writing results to the output directory.
//!
//! ```text
//! <output>/chunk-3/module-17.tsx                 formatted code
//! <output>/chunk-3/assets/module-18.svg          file modules, decoded
//! <output>/css-modules/34.module.css             CSS chunks, class names restored
//! <output>/.stats/chunk-3/module-17/manifest.json
//! <output>/.stats/chunk-3/module-17/transforms/0_replaceDefaultSymbol/{before.code,after.code,console.log}
//! <output>/.stats/fingerprints.json
//! ```

use crate::error::DecompilerError;
use crate::fingerprint::{DuplicateGroup, Fingerprint};
use crate::format::{format, Dialect};
use crate::registry::{Chunk, CssRegistry, Encoding, Module, ModuleType, TransformState};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATS_DIR: &str = ".stats";

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), DecompilerError> {
    let output_error = |source| DecompilerError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(output_error)?;
    }
    fs::write(path, contents).map_err(output_error)
}

/// Bytes a module is baked as.
pub fn module_contents(module: &Module) -> Vec<u8> {
    match module.module_type {
        ModuleType::Code => format(&module.code, Dialect::Code).into_bytes(),
        ModuleType::File {
            encoding: Encoding::Utf8,
        } => module.code.clone().into_bytes(),
        ModuleType::File {
            encoding: Encoding::Base64,
        } => match STANDARD.decode(module.code.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{} is not valid base64 ({}), writing it as text", module.name(), e);
                module.code.clone().into_bytes()
            }
        },
    }
}

pub fn bake_module(output: &Path, module: &Module) -> Result<PathBuf, DecompilerError> {
    let path = output.join(&module.current_location);
    write(&path, module_contents(module))?;
    debug!("Baked {}", path.display());
    Ok(path)
}

pub fn bake_css(output: &Path, css: &CssRegistry) -> Result<usize, DecompilerError> {
    for chunk in css.chunks() {
        write(&output.join(&chunk.current_location), css.baked_code(chunk))?;
    }
    Ok(css.chunks().len())
}

/// `ConvertToJSX` -> `convertToJSX`.
fn camelize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModuleManifest<'m> {
    module: ModuleInfo<'m>,
    chunk: ChunkInfo<'m>,
    transforms: Vec<TransformInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModuleInfo<'m> {
    id: &'m str,
    name: String,
    current_location: &'m str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'m str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkInfo<'m> {
    id: &'m str,
    name: String,
    remote_path: &'m str,
    remote_url: &'m str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransformFiles {
    before_code: String,
    after_code: String,
    console_log: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransformInfo {
    name: String,
    files: TransformFiles,
    duration: u64,
    state: TransformState,
    was_cached: bool,
    error_count: usize,
}

/// Stats directory of a module, relative to the output root.
pub fn stats_dir(module: &Module) -> PathBuf {
    Path::new(STATS_DIR)
        .join(format!("chunk-{}", module.chunk_id))
        .join(module.name())
}

/// Write a module's manifest and the before/after/log files of every
/// transform it went through. Paths in the manifest are relative to the
/// output root.
pub fn bake_stats(
    output: &Path,
    module: &Module,
    chunk: Option<&Chunk>,
    fingerprint: Option<&Fingerprint>,
) -> Result<PathBuf, DecompilerError> {
    let dir = stats_dir(module);
    let mut transforms = Vec::with_capacity(module.transformation_log.len());

    for (i, record) in module.transformation_log.iter().enumerate() {
        let step_dir = dir.join("transforms").join(format!("{}_{}", i, camelize(&record.name)));
        let files = TransformFiles {
            before_code: step_dir.join("before.code").to_string_lossy().into_owned(),
            after_code: step_dir.join("after.code").to_string_lossy().into_owned(),
            console_log: step_dir.join("console.log").to_string_lossy().into_owned(),
        };
        let console: Vec<String> = record.log_messages.iter().map(|m| m.to_line()).collect();
        write(&output.join(&files.before_code), &record.before_code)?;
        write(&output.join(&files.after_code), &record.after_code)?;
        write(&output.join(&files.console_log), console.join("\n"))?;

        transforms.push(TransformInfo {
            name: record.name.clone(),
            files,
            duration: record.duration_ms,
            state: record.state,
            was_cached: record.was_cached,
            error_count: record.error_count(),
        });
    }

    let manifest = ModuleManifest {
        module: ModuleInfo {
            id: &module.id,
            name: module.name(),
            current_location: &module.current_location,
            fingerprint: fingerprint.map(|f| f.digest.as_str()),
        },
        chunk: ChunkInfo {
            id: &module.chunk_id,
            name: chunk.map(|c| c.display_name().to_string()).unwrap_or_default(),
            remote_path: chunk.map(|c| c.remote_path.as_str()).unwrap_or_default(),
            remote_url: chunk.map(|c| c.remote_url.as_str()).unwrap_or_default(),
        },
        transforms,
    };
    let path = output.join(&dir).join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest).map_err(|e| DecompilerError::Output {
        path: path.clone(),
        source: e.into(),
    })?;
    write(&path, json)?;
    Ok(path)
}

pub fn bake_fingerprints(output: &Path, groups: &[DuplicateGroup]) -> Result<PathBuf, DecompilerError> {
    let path = output.join(STATS_DIR).join("fingerprints.json");
    let json = serde_json::to_string_pretty(groups).map_err(|e| DecompilerError::Output {
        path: path.clone(),
        source: e.into(),
    })?;
    write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogMessage;
    use crate::registry::TransformRecord;
    use tempfile::TempDir;

    #[test]
    fn test_code_module_is_formatted() {
        let dir = TempDir::new().unwrap();
        let module = Module::new("5", "1", "var a=1");
        let path = bake_module(dir.path(), &module).unwrap();
        assert_eq!(path, dir.path().join("chunk-1/module-5.tsx"));
        assert!(fs::read_to_string(path).unwrap().contains("var a = 1;"));
    }

    #[test]
    fn test_base64_file_is_decoded() {
        let dir = TempDir::new().unwrap();
        let mut module = Module::new("5", "1", STANDARD.encode([0u8, 159, 146, 150]));
        module.module_type = ModuleType::File {
            encoding: Encoding::Base64,
        };
        module.relocate("assets/module-5.png");
        let path = bake_module(dir.path(), &module).unwrap();
        assert_eq!(fs::read(path).unwrap(), vec![0u8, 159, 146, 150]);
    }

    #[test]
    fn test_stats_manifest_layout() {
        let dir = TempDir::new().unwrap();
        let mut module = Module::new("5", "1", "b");
        module.transformation_log.push(TransformRecord {
            name: "ConvertToJSX".to_string(),
            state: TransformState::Error,
            was_cached: false,
            duration_ms: 3,
            before_code: "a".to_string(),
            after_code: "b".to_string(),
            log_messages: vec![LogMessage::error("boom")],
        });
        let chunk = Chunk {
            id: "1".to_string(),
            remote_path: "static/chunks/1.abc.js".to_string(),
            remote_url: "https://cdn.test/static/chunks/1.abc.js".to_string(),
            code: String::new(),
        };

        let path = bake_stats(dir.path(), &module, Some(&chunk), None).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(manifest["module"]["id"], "5");
        assert_eq!(manifest["chunk"]["remotePath"], "static/chunks/1.abc.js");
        let transform = &manifest["transforms"][0];
        assert_eq!(transform["state"], "error");
        assert_eq!(transform["errorCount"], 1);
        assert_eq!(
            transform["files"]["beforeCode"],
            ".stats/chunk-1/module-5/transforms/0_convertToJSX/before.code"
        );

        let step = dir.path().join(".stats/chunk-1/module-5/transforms/0_convertToJSX");
        assert_eq!(fs::read_to_string(step.join("before.code")).unwrap(), "a");
        assert!(fs::read_to_string(step.join("console.log")).unwrap().contains("boom"));
    }

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("CSSModuleTransformer"), "cSSModuleTransformer");
        assert_eq!(camelize("ImportsDecompile"), "importsDecompile");
    }
}
