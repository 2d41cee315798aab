//! Tonearm Player - headless playback through the tonearm engine
//!
//! Plays one file or http(s) URL with the chosen sound field preset,
//! equalizer and volume, printing the position until playback stops.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tonearm_core::audio::{output_devices, OutputTarget};
use tonearm_core::config::{
    default_config_path, load_config, read_config, PlayerConfig, PLAYER_CONFIG_FILE,
};
use tonearm_core::sound_field::preset_names;
use tonearm_core::{PlaybackState, Player};

/// How often the position display refreshes
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "tonearm-player")]
#[command(about = "Play an audio file or stream through the tonearm engine", long_about = None)]
struct Cli {
    /// Audio file path or http(s) URL
    #[arg(required_unless_present_any = ["list_presets", "list_devices"])]
    source: Option<String>,

    /// Sound field preset (see --list-presets)
    #[arg(short, long)]
    preset: Option<String>,

    /// Master volume (linear, 1.0 = unity)
    #[arg(short, long)]
    volume: Option<f32>,

    /// Equalizer band gain as INDEX=DB, repeatable (bands 0-9, ±12 dB)
    #[arg(long = "eq", value_parser = parse_band_gain)]
    eq: Vec<(usize, f32)>,

    /// Start position in seconds
    #[arg(short, long)]
    seek: Option<f64>,

    /// Config file (default: ~/.config/tonearm/player.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List sound field presets and exit
    #[arg(long)]
    list_presets: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn parse_band_gain(value: &str) -> Result<(usize, f32), String> {
    let (index, gain) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=DB, got '{}'", value))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad band index '{}': {}", index, e))?;
    let gain = gain
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad gain '{}': {}", gain, e))?;
    Ok((index, gain))
}

fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_presets {
        for name in preset_names() {
            println!("{}", name);
        }
        return Ok(());
    }
    if cli.list_devices {
        for device in output_devices().context("Failed to enumerate output devices")? {
            println!("{}", device);
        }
        return Ok(());
    }
    let Some(source) = cli.source else {
        bail!("No source given");
    };

    // An explicitly named config must exist and parse
    let config: PlayerConfig = match &cli.config {
        Some(path) => read_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .with_context(|| format!("Config {} does not exist", path.display()))?,
        None => load_config(&default_config_path(PLAYER_CONFIG_FILE)),
    };
    let offline = config.audio.output == OutputTarget::Offline;
    let player = Player::new(config);

    if let Some(preset) = &cli.preset {
        if !player.apply_preset(preset) {
            bail!("Unknown preset '{}' (see --list-presets)", preset);
        }
    }
    if let Some(volume) = cli.volume {
        player.set_volume(volume).context("Invalid --volume")?;
    }
    for (index, gain) in &cli.eq {
        player
            .set_band_gain(*index, *gain)
            .with_context(|| format!("Invalid --eq {}={}", index, gain))?;
    }

    let loaded = if is_url(&source) {
        player.load_url(&source).await
    } else {
        let bytes = std::fs::read(&source).with_context(|| format!("Failed to read {}", source))?;
        player.load(bytes).await
    };
    let duration = loaded.with_context(|| format!("Failed to load {}", source))?;
    log::info!("Playing {} ({})", source, format_time(duration));

    if let Some(seconds) = cli.seek {
        player.seek_to(seconds);
    }
    if !player.play() {
        player.destroy();
        bail!("Playback did not start");
    }

    let frames_per_tick = player
        .sample_rate()
        .map_or(0, |rate| (rate as f64 * POLL_INTERVAL.as_secs_f64()) as usize);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        if offline {
            player.render(frames_per_tick)?;
        }
        let state = player.state();
        print!(
            "\r{} / {}  [{}]   ",
            format_time(player.current_time()),
            format_time(player.duration()),
            state
        );
        std::io::stdout().flush().ok();
        if state != PlaybackState::Playing {
            break;
        }
    }
    println!();

    player.destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_band_gain() {
        assert_eq!(parse_band_gain("3=-4.5"), Ok((3, -4.5)));
        assert_eq!(parse_band_gain(" 9 = 12 "), Ok((9, 12.0)));
        assert!(parse_band_gain("3").is_err());
        assert!(parse_band_gain("x=1").is_err());
        assert!(parse_band_gain("1=loud").is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(75.9), "1:15");
        assert_eq!(format_time(f64::NAN), "--:--");
    }

    #[test]
    fn test_cli_requires_source() {
        assert!(Cli::try_parse_from(["tonearm-player"]).is_err());
        assert!(Cli::try_parse_from(["tonearm-player", "--list-presets"]).is_ok());
        let cli = Cli::try_parse_from(["tonearm-player", "a.flac", "--eq", "0=3", "--eq", "9=-2"]).unwrap();
        assert_eq!(cli.eq, vec![(0, 3.0), (9, -2.0)]);
    }
}
