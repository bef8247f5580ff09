use crate::converter::{RenderSettings, CELL_ASPECT, DEFAULT_WIDTH};
use crate::luminance::Normalization;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video file to play
    #[arg(required = true)]
    pub file_path: PathBuf,

    /// Output width in character columns
    #[arg(short, long, default_value_t = DEFAULT_WIDTH)]
    pub width: u16,

    /// Render without color
    #[arg(short, long)]
    pub grayscale: bool,

    /// Play the video's audio track
    #[arg(short, long)]
    pub sound: bool,

    /// Disable audio even if --sound is set
    #[arg(short, long)]
    pub mute: bool,

    /// Width-to-height ratio of a terminal character cell
    #[arg(long, value_name = "RATIO", default_value_t = CELL_ASPECT)]
    pub cell_aspect: f64,

    /// Map luminance over the fixed 0-255 range instead of stretching each frame
    #[arg(long)]
    pub fixed_range: bool,

    /// Clear the screen before the first frame
    #[arg(long)]
    pub clear: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show video information only (don't play)
    #[arg(long)]
    pub info_only: bool,

    /// Print --info-only output as JSON
    #[arg(long, requires = "info_only")]
    pub json: bool,
}

/// Resolved playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub render: RenderSettings,
    pub audio: bool,
    pub clear_screen: bool,
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        // Check if file exists
        if !self.file_path.exists() {
            return Err(format!("Video file does not exist: {}", self.file_path.display()));
        }

        if self.width == 0 {
            return Err("Width must be greater than 0".to_string());
        }

        if !self.cell_aspect.is_finite() || self.cell_aspect <= 0.0 {
            return Err("Cell aspect must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Audio plays only with --sound and without --mute
    pub fn audio_enabled(&self) -> bool {
        self.sound && !self.mute
    }

    pub fn config(&self) -> PlayerConfig {
        PlayerConfig {
            render: RenderSettings {
                width: self.width,
                grayscale: self.grayscale,
                normalization: if self.fixed_range {
                    Normalization::FixedRange
                } else {
                    Normalization::PerFrame
                },
                cell_aspect: self.cell_aspect,
            },
            audio: self.audio_enabled(),
            clear_screen: self.clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ascii-reel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["clip.mp4"]);
        assert_eq!(cli.width, 80);
        assert!(!cli.grayscale);
        assert!(!cli.audio_enabled());
        assert!((cli.cell_aspect - 11.0 / 24.0).abs() < 1e-12);

        let config = cli.config();
        assert_eq!(config.render.normalization, Normalization::PerFrame);
        assert!(!config.clear_screen);
    }

    #[test]
    fn test_mute_overrides_sound() {
        assert!(parse(&["clip.mp4", "--sound"]).audio_enabled());
        assert!(!parse(&["clip.mp4", "--sound", "--mute"]).audio_enabled());
        assert!(!parse(&["clip.mp4", "--mute"]).audio_enabled());
    }

    #[test]
    fn test_render_flags() {
        let config = parse(&["clip.mp4", "-w", "120", "-g", "--fixed-range", "--cell-aspect", "0.5"]).config();
        assert_eq!(config.render.width, 120);
        assert!(config.render.grayscale);
        assert_eq!(config.render.normalization, Normalization::FixedRange);
        assert_eq!(config.render.cell_aspect, 0.5);
    }

    #[test]
    fn test_validation() {
        let cli = parse(&["definitely-missing.mp4"]);
        assert!(cli.validate().unwrap_err().contains("does not exist"));

        let mut cli = parse(&["Cargo.toml", "--cell-aspect", "0"]);
        assert!(cli.validate().unwrap_err().contains("Cell aspect"));

        cli.cell_aspect = CELL_ASPECT;
        cli.width = 0;
        assert!(cli.validate().unwrap_err().contains("Width"));
    }

    #[test]
    fn test_json_requires_info_only() {
        assert!(Cli::try_parse_from(["ascii-reel", "clip.mp4", "--json"]).is_err());
        assert!(Cli::try_parse_from(["ascii-reel", "clip.mp4", "--info-only", "--json"]).is_ok());
    }
}
