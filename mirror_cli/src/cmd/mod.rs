use std::path::PathBuf;

use anyhow::Result;
use mirror_remote_local::LocalRemote;
use mirror_sync::Mirror;

use crate::config::CliConfig;

mod cat;
mod tree;
mod watch;

pub use cat::run_cat;
pub use tree::run_tree;
pub use watch::run_watch;

pub async fn run_command(
    config_file: PathBuf,
    root: Option<PathBuf>,
    cmd: crate::Commands,
) -> Result<()> {
    if let crate::Commands::Config { cmd } = cmd {
        return cmd.run(&config_file);
    }

    let mut config = CliConfig::load(&config_file)?;
    if let Some(root) = root {
        config.remote.base_path = root;
    }
    tracing::debug!(root = %config.remote.base_path.display(), "mirroring local directory");
    let mirror = Mirror::new(LocalRemote::new(config.remote), config.engine)?;

    let result = match cmd {
        crate::Commands::Watch {
            path,
            depth,
            unbounded,
            blobs,
        } => run_watch(&mirror, &path, watch::options(depth, unbounded, blobs)).await,
        crate::Commands::Tree { path, settle_ms } => run_tree(&mirror, &path, settle_ms).await,
        crate::Commands::Cat { path, json } => run_cat(&mirror, &path, json).await,
        crate::Commands::Config { .. } => Ok(()),
    };
    mirror.shutdown();
    result
}
