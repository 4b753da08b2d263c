use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// config file to use instead of ~/.config/mirror/config.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// directory to mirror, overrides `remote.base_path`
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Mirror a path and print every change until Ctrl-C
    Watch {
        /// Path inside the mirrored root ("" for the root itself)
        #[arg(default_value = "")]
        path: String,
        /// How many levels of subdirectories to follow
        #[arg(short, long, value_name = "LEVELS", conflicts_with = "unbounded")]
        depth: Option<u32>,
        /// Follow subdirectories at any depth
        #[arg(short, long, action = ArgAction::SetTrue)]
        unbounded: bool,
        /// Also download file contents
        #[arg(short, long, action = ArgAction::SetTrue)]
        blobs: bool,
    },
    /// Mirror a path recursively and print its tree once it settles
    Tree {
        #[arg(default_value = "")]
        path: String,
        /// Quiet period after which the mirror counts as settled
        #[arg(long, value_name = "MS", default_value_t = 500)]
        settle_ms: u64,
    },
    /// Read one file straight from the remote
    Cat {
        path: String,
        /// Pretty-print the file as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Config lives at ~/.config/mirror/config.toml unless --config is given.
    let config_file = match cli.config {
        Some(file) => file,
        None => ProjectDirs::from("", "", "mirror")
            .context("failed to determine config directory path")?
            .config_dir()
            .join("config.toml"),
    };

    cmd::run_command(config_file, cli.root, cli.cmd).await
}
