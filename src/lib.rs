//! ASCII Reel - A real-time, color-enabled ASCII video player for the terminal
//!
//! This crate decodes a video file up front, converts every displayed frame into
//! a grid of luminance-mapped glyphs, and paces the output against the wall clock
//! so playback stays in step with the video's native frame rate and, optionally,
//! with its audio track.

pub mod audio;
pub mod cli;
pub mod converter;
pub mod decoder;
pub mod glyph;
pub mod luminance;
pub mod renderer;
pub mod scheduler;

pub use audio::{AudioControl, AudioCoordinator, AudioSession, AudioTrack, extract_audio};
pub use cli::{Cli, PlayerConfig};
pub use converter::{FrameConverter, RenderSettings, RenderedFrame, StyledGlyph, CELL_ASPECT};
pub use decoder::{DecodedVideo, VideoDecoder, VideoFrame, VideoInfo, load_video};
pub use glyph::CharacterRamp;
pub use luminance::{Normalization, LuminanceMap};
pub use renderer::{RawModeGuard, TerminalRenderer};
pub use scheduler::{CancelToken, FrameSlot, PlaybackClock, PlaybackReport, PlaybackScheduler, PlaybackState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Invalid frame: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("Video decoding failed: {0}")]
    DecodeFailure(String),

    #[error("Audio unavailable: {0}")]
    AudioStartFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Calculate aspect ratio from dimensions
    pub fn calculate_aspect_ratio(width: u32, height: u32) -> f64 {
        width as f64 / height as f64
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Cli, PlayerConfig,
        VideoDecoder, VideoFrame, VideoInfo, DecodedVideo, load_video,
        CharacterRamp, Normalization, LuminanceMap,
        FrameConverter, RenderSettings, RenderedFrame, StyledGlyph,
        TerminalRenderer,
        AudioControl, AudioCoordinator, AudioSession, AudioTrack,
        CancelToken, FrameSlot, PlaybackClock, PlaybackReport, PlaybackScheduler, PlaybackState,
        PlayerError, Result,
        utils::*,
    };
}
