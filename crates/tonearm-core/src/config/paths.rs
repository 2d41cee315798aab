//! Standard locations of Tonearm files

use std::path::PathBuf;

/// Name of the player configuration file
pub const PLAYER_CONFIG_FILE: &str = "player.yaml";

/// Configuration directory
///
/// Returns: `~/.config/tonearm` (or the platform equivalent)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tonearm")
}

/// Path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_tonearm() {
        assert!(default_config_dir().ends_with("tonearm"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path(PLAYER_CONFIG_FILE);
        assert!(path.ends_with("tonearm/player.yaml"));
    }
}
