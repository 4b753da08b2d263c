use anyhow::Context;
use mirror_remote_local::LocalRemoteConfig;
use mirror_sync::MirrorConfig;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

/// Contents of `config.toml`.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    pub engine: MirrorConfig,
    pub remote: LocalRemoteConfig,
}

impl CliConfig {
    /// Reads `file`; a missing file yields the defaults.
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(file = %file.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("could not read {}", file.display()));
            }
        };
        toml::from_str(&content).with_context(|| format!("could not parse {}", file.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let config = CliConfig::load(&tmp.path().join("config.toml"))?;
        assert_eq!(config, CliConfig::default());
        Ok(())
    }

    #[test]
    fn partial_tables_keep_other_defaults() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("config.toml");
        fs::write(
            &file,
            "[engine]\ncascade_unsubscribe = true\n\n[remote]\nbase_path = \"/srv/data\"\n",
        )?;

        let config = CliConfig::load(&file)?;
        assert!(config.engine.cascade_unsubscribe);
        assert_eq!(config.engine.memo_capacity, MirrorConfig::default().memo_capacity);
        assert_eq!(config.remote.base_path, Path::new("/srv/data"));
        assert_eq!(config.remote.poll_interval_ms, 1000);
        Ok(())
    }

    #[test]
    fn invalid_toml_is_an_error() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("config.toml");
        fs::write(&file, "[engine\n")?;
        assert!(CliConfig::load(&file).is_err());
        Ok(())
    }
}
