//! Run configuration.
//!
//! `Args` is the command-line surface; `DecompilerConfig` is what the
//! library consumes, so tests and embedders can build one directly.

use crate::cache::DEFAULT_TTL_SECS;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_TARGET_URL: &str = "https://www.duolingo.com/learn";

#[derive(Parser, Debug)]
#[command(name = "webpack-decompiler")]
#[command(about = "Recover readable sources from a deployed webpack bundle")]
#[command(version)]
pub struct Args {
    /// Page whose webpack manifest script should be followed
    #[arg(env = "DECOMPILER_URL", default_value = DEFAULT_TARGET_URL)]
    pub url: String,

    /// Directory baked modules are written to
    #[arg(short, long, default_value = "app")]
    pub output: PathBuf,

    /// Cache directory
    #[arg(long, default_value = ".cache")]
    pub cache_dir: PathBuf,

    /// Only process the first N chunks (0 = all)
    #[arg(long, default_value_t = 0)]
    pub chunk_limit: usize,

    /// Worker threads per phase (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Skip the per-module .stats tree
    #[arg(long)]
    pub no_stats: bool,

    /// Plain-text log file, appended to
    #[arg(long, default_value = "output.log")]
    pub log_file: PathBuf,

    /// TTL for new cache entries, in seconds
    #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
    pub cache_ttl: u64,

    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct DecompilerConfig {
    pub target_url: String,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub chunk_limit: usize,
    pub jobs: usize,
    pub write_stats: bool,
    pub log_file: PathBuf,
    pub cache_ttl_secs: u64,
    pub progress: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            output_dir: PathBuf::from("app"),
            cache_dir: PathBuf::from(".cache"),
            chunk_limit: 0,
            jobs: 0,
            write_stats: true,
            log_file: PathBuf::from("output.log"),
            cache_ttl_secs: DEFAULT_TTL_SECS,
            progress: true,
        }
    }
}

impl From<Args> for DecompilerConfig {
    fn from(args: Args) -> Self {
        Self {
            target_url: args.url,
            output_dir: args.output,
            cache_dir: args.cache_dir,
            chunk_limit: args.chunk_limit,
            jobs: args.jobs,
            write_stats: !args.no_stats,
            log_file: args.log_file,
            cache_ttl_secs: args.cache_ttl,
            progress: !args.quiet,
        }
    }
}

impl DecompilerConfig {
    /// Build a rayon pool sized by `jobs`.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build()
    }
}
