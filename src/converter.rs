use crate::decoder::VideoFrame;
use crate::glyph::CharacterRamp;
use crate::luminance::{LuminanceMap, Normalization};
use crate::{PlayerError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

/// Width-to-height ratio of a terminal character cell
pub const CELL_ASPECT: f64 = 11.0 / 24.0;

/// Default output width in character columns
pub const DEFAULT_WIDTH: u16 = 80;

/// One output cell: a glyph and, in color mode, the sample's RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyledGlyph {
    pub glyph: char,
    pub color: Option<(u8, u8, u8)>,
}

/// Text-art rendition of one video frame, one entry per output row
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    rows: Vec<Vec<StyledGlyph>>,
    /// Source frame number
    pub frame_number: u64,
}

/// Frame conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Output width in character columns
    pub width: u16,
    /// Render without color escapes
    pub grayscale: bool,
    pub normalization: Normalization,
    /// Width-to-height ratio of a character cell
    pub cell_aspect: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            grayscale: false,
            normalization: Normalization::PerFrame,
            cell_aspect: CELL_ASPECT,
        }
    }
}

impl RenderedFrame {
    pub fn new(rows: Vec<Vec<StyledGlyph>>, frame_number: u64) -> Self {
        Self { rows, frame_number }
    }

    pub fn rows(&self) -> &[Vec<StyledGlyph>] {
        &self.rows
    }

    /// Columns per row
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Glyphs only, one string per row
    pub fn plain_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.glyph).collect())
            .collect()
    }
}

/// Video frame to text-art converter
pub struct FrameConverter {
    settings: RenderSettings,
    ramp: CharacterRamp,
}

impl FrameConverter {
    /// Create a new frame converter with the given settings
    pub fn new(settings: RenderSettings) -> Self {
        let ramp = CharacterRamp::for_mode(settings.grayscale);
        Self { settings, ramp }
    }

    pub fn ramp(&self) -> CharacterRamp {
        self.ramp
    }

    /// Number of output rows for a source of the given size.
    ///
    /// `rows = width / (src_width / src_height) * cell_aspect`, floored and at
    /// least one.
    pub fn target_rows(&self, src_width: u32, src_height: u32) -> u32 {
        let aspect = crate::utils::calculate_aspect_ratio(src_width, src_height);
        let rows = (self.settings.width as f64 / aspect * self.settings.cell_aspect).floor();
        (rows as u32).max(1)
    }

    /// Convert a video frame to its text-art representation
    pub fn convert_frame(&self, frame: &VideoFrame) -> Result<RenderedFrame> {
        let (pixel_width, pixel_height) = frame.image.dimensions();
        if pixel_width == 0 || pixel_height == 0 {
            return Err(PlayerError::InvalidFrame {
                width: pixel_width,
                height: pixel_height,
            });
        }

        // The grid shape comes from the stream's own size, not the decode-scaled pixels
        let (src_width, src_height) = frame.source_size;
        if src_width == 0 || src_height == 0 {
            return Err(PlayerError::InvalidFrame {
                width: src_width,
                height: src_height,
            });
        }

        let width = u32::from(self.settings.width);
        let height = self.target_rows(src_width, src_height);
        let samples = downsample(&frame.image, width, height);

        // Bounds span the whole grid, so this must finish before any glyph is chosen
        let luminance = LuminanceMap::from_image(&samples, self.settings.normalization);

        let rows = (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| {
                        let glyph = self.ramp.glyph_for(luminance.get(x, y));
                        let color = if self.settings.grayscale {
                            None
                        } else {
                            let px = samples.get_pixel(x, y);
                            Some((px[0], px[1], px[2]))
                        };
                        StyledGlyph { glyph, color }
                    })
                    .collect()
            })
            .collect();

        debug!(
            "Converted frame {} ({}x{}) to {}x{} cells",
            frame.frame_number, src_width, src_height, width, height
        );

        Ok(RenderedFrame::new(rows, frame.frame_number))
    }
}

/// Resample to exactly `width` x `height`, box-averaging when shrinking
fn downsample(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else if width <= image.width() && height <= image.height() {
        imageops::thumbnail(image, width, height)
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    }
}
