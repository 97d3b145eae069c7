use crate::cache::sha256_hex;
use crate::logging::LogMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encoding {
    Utf8,
    Base64,
}

/// What a module's `code` holds: source to be reformatted, or file content
/// baked verbatim (decoded first when base64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum ModuleType {
    Code,
    File { encoding: Encoding },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformState {
    Success,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRecord {
    pub name: String,
    pub state: TransformState,
    pub was_cached: bool,
    pub duration_ms: u64,
    pub before_code: String,
    pub after_code: String,
    pub log_messages: Vec<LogMessage>,
}

impl TransformRecord {
    pub fn error_count(&self) -> usize {
        self.log_messages.iter().filter(|m| m.is_error()).count()
    }
}

/// The part of a module a transform may change. This is what the pipeline
/// caches per (module, transform, input code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub code: String,
    pub current_location: String,
    pub module_type: ModuleType,
    #[serde(default)]
    pub class_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: String,
    pub chunk_id: String,
    /// Output-relative path, e.g. `chunk-3/module-17.tsx`.
    pub current_location: String,
    pub code: String,
    /// SHA-256 of the code the module was registered with.
    pub code_hash: String,
    pub module_type: ModuleType,
    /// Original CSS class name -> hashed class name.
    pub class_map: BTreeMap<String, String>,
    pub transformations: Vec<String>,
    pub transformation_log: Vec<TransformRecord>,
}

impl Module {
    pub fn new(id: impl Into<String>, chunk_id: impl Into<String>, code: impl Into<String>) -> Self {
        let id = id.into();
        let chunk_id = chunk_id.into();
        let code = code.into();
        Self {
            current_location: format!("{}/module-{}.tsx", chunk_dir(&chunk_id), id),
            code_hash: sha256_hex(code.as_bytes()),
            id,
            chunk_id,
            code,
            module_type: ModuleType::Code,
            class_map: BTreeMap::new(),
            transformations: Vec::new(),
            transformation_log: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        format!("module-{}", self.id)
    }

    pub fn is_code(&self) -> bool {
        self.module_type == ModuleType::Code
    }

    pub fn state(&self) -> ModuleState {
        ModuleState {
            code: self.code.clone(),
            current_location: self.current_location.clone(),
            module_type: self.module_type,
            class_map: self.class_map.clone(),
        }
    }

    pub fn restore(&mut self, state: ModuleState) {
        self.code = state.code;
        self.current_location = state.current_location;
        self.module_type = state.module_type;
        self.class_map = state.class_map;
    }

    /// Move the module next to its chunk under a new file name, keeping
    /// the chunk directory: `chunk-3/<file_name>`.
    pub fn relocate(&mut self, file_name: &str) {
        self.current_location = format!("{}/{}", chunk_dir(&self.chunk_id), file_name);
    }
}

pub fn chunk_dir(chunk_id: &str) -> String {
    format!("chunk-{}", chunk_id)
}

/// Webpack module keys are numbers or request paths; paths are flattened
/// into a file-name-safe id.
pub fn normalize_module_id(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".." | "node_modules"))
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_module_location_and_hash() {
        let module = Module::new("17", "3", "export default 1");
        assert_eq!(module.current_location, "chunk-3/module-17.tsx");
        assert_eq!(module.code_hash, sha256_hex(b"export default 1"));
        assert!(module.is_code());
    }

    #[test]
    fn test_normalize_module_id() {
        assert_eq!(normalize_module_id("123"), "123");
        assert_eq!(normalize_module_id("./node_modules/react/index.js"), "react-index.js");
        assert_eq!(normalize_module_id("./src/App.tsx"), "src-App.tsx");
        assert_eq!(normalize_module_id("../x"), "x");
        assert_eq!(normalize_module_id("../../lib/.env.js"), "lib-.env.js");
    }

    #[test]
    fn test_module_type_serialization() {
        let json = serde_json::to_string(&ModuleType::File { encoding: Encoding::Base64 }).unwrap();
        assert_eq!(json, r#"{"kind":"FILE","encoding":"BASE64"}"#);
        let code: ModuleType = serde_json::from_str(r#"{"kind":"CODE"}"#).unwrap();
        assert_eq!(code, ModuleType::Code);
    }

    #[test]
    fn test_restore_keeps_original_hash() {
        let mut module = Module::new("1", "0", "a");
        let mut state = module.state();
        state.code = "b".to_string();
        state.current_location = "chunk-0/module-1.json".to_string();
        state.module_type = ModuleType::File { encoding: Encoding::Utf8 };
        module.restore(state.clone());
        assert_eq!(module.state(), state);
        assert_eq!(module.code_hash, sha256_hex(b"a"));
    }
}
