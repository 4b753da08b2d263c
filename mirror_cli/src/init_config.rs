use std::{fs, path::Path};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and fills in missing defaults
    Init,
    /// Prints the effective config
    Show,
}

impl CmdConfig {
    pub fn run(self, config_file: &Path) -> anyhow::Result<()> {
        match self {
            Self::Init => init(config_file),
            Self::Show => {
                let config = CliConfig::load(config_file)?;
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        }
    }
}

/// Adds every missing default key to `config_file`, keeping existing values
/// and comments.
fn init(config_file: &Path) -> anyhow::Result<()> {
    let mut doc = if config_file.exists() {
        fs::read_to_string(config_file)?
    } else {
        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        String::new()
    }
    .parse::<DocumentMut>()
    .context("could not parse config file")?;

    merge_defaults(&mut doc)?;

    fs::write(config_file, doc.to_string())?;
    info!("config written to {}", config_file.display());
    Ok(())
}

fn merge_defaults(doc: &mut DocumentMut) -> anyhow::Result<()> {
    let defaults = toml::to_string(&CliConfig::default())?
        .parse::<DocumentMut>()
        .context("could not render default config")?;

    for (name, item) in defaults.iter() {
        let Some(default_table) = item.as_table() else {
            continue;
        };
        let table = doc
            .entry(name)
            .or_insert(Item::Table(Table::new()))
            .as_table_mut()
            .with_context(|| format!("`{name}` in the config file must be a table"))?;
        for (key, value) in default_table.iter() {
            if !table.contains_key(key) {
                table.insert(key, value.clone());
            }
        }
    }
    Ok(())
}
