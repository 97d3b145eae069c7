use clap::Parser;
use tracing::{error, info};
use webpack_decompiler::config::Args;
use webpack_decompiler::fetch::HttpFetcher;
use webpack_decompiler::{logging, DecompilerConfig, DecompilerError};

fn main() -> anyhow::Result<()> {
    let config = DecompilerConfig::from(Args::parse());
    logging::init(&config.log_file)?;
    info!("Decompiling {}", config.target_url);

    let fetcher = HttpFetcher::new()?;
    match webpack_decompiler::run(&config, &fetcher) {
        Ok(summary) => {
            info!(
                "{} chunks, {} modules, {} baked, {} duplicate groups",
                summary.chunks, summary.modules, summary.baked, summary.duplicate_groups
            );
            info!(
                "Finished in {:.2} seconds, {} error(s)",
                summary.elapsed.as_secs_f64(),
                summary.errors
            );
            Ok(())
        }
        Err(DecompilerError::ManifestNotFound(url)) => {
            error!("Could not find the webpack manifest script at {}", url);
            Ok(())
        }
        Err(DecompilerError::NoChunks(url)) => {
            error!("The webpack manifest at {} lists no chunks, nothing to decompile", url);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
