use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use directories::ProjectDirs;
use iso::config::GameConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `config.json` in the platform config directory, e.g.
/// `~/.config/isoquest/config.json` on Linux.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "isoquest").map(|dirs| dirs.config_dir().join("config.json"))
}

/// Reads a config file. `Ok(None)` when the file does not exist.
pub fn read_config(path: &Path) -> Result<Option<GameConfig>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// The user's config, or the defaults if there is none or it is broken.
pub fn load_game_config() -> GameConfig {
    let Some(path) = config_path() else {
        warn!("no home directory, using the default config");
        return GameConfig::default();
    };
    match read_config(&path) {
        Ok(Some(config)) => {
            info!("loaded config from {}", path.display());
            config
        }
        Ok(None) => GameConfig::default(),
        Err(err) => {
            warn!("{err}; using the default config");
            GameConfig::default()
        }
    }
}
