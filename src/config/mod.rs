pub mod detection;
pub mod gateway;

pub use detection::*;
pub use gateway::*;

use std::path::PathBuf;

/// Returns the global config directory path: `~/.config/maskgate/`
pub fn dirs_global() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("maskgate")
}

/// Default config file: `~/.config/maskgate/config.yml`
pub fn default_config_path() -> PathBuf {
    dirs_global().join("config.yml")
}
