//! Configuration
//!
//! - [`load_config`]: YAML loading with fallback to defaults, [`read_config`]
//!   for callers that want errors
//! - [`PlayerConfig`]: audio output, timing, sound field and stream options
//! - default file locations under `~/.config/tonearm`
//!
//! Settings are read at startup only; nothing is written back.

mod io;
mod paths;
mod player;

pub use io::{load_config, read_config, ConfigError};
pub use paths::{default_config_dir, default_config_path, PLAYER_CONFIG_FILE};
pub use player::{PlayerConfig, SoundFieldConfig, StreamConfig, TimingConfig};
