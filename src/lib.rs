//! # webpack-decompiler
//!
//! Recovers readable module sources from a deployed webpack bundle.
//!
//! ## Run Invariants
//!
//! 1. **At most once**: a transform runs at most once for a given
//!    `(module id, chunk id, transform, input code)`. Results live in the
//!    content-addressed [`cache::Cache`] and are replayed on later runs.
//!
//! 2. **Chain order**: every module goes through [`transform::CHAIN`] in
//!    order. Modules are independent of each other, so each phase runs
//!    them in parallel.
//!
//! 3. **Isolation**: a failing chunk, module or transform is logged and
//!    skipped. Only a page without a webpack runtime, or with a runtime
//!    that lists no chunks, ends the run.
//!
//! 4. **Text in, text out**: transforms re-parse the module's current code,
//!    collect span edits and apply them. No syntax tree outlives a pass.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod decompiler;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod format;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod syntax;
pub mod transform;

#[cfg(test)]
mod pipeline_tests;

pub use config::DecompilerConfig;
pub use decompiler::{run, RunSummary};
pub use error::DecompilerError;
