use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Gamma applied after normalization; below 1.0 it lifts midtones
pub const GAMMA: f32 = 0.85;

/// How the luminance range of a frame is stretched before gamma
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Stretch the darkest sample of the frame to 0 and the brightest to 255
    #[default]
    PerFrame,
    /// Keep the full 0..=255 range regardless of frame content
    FixedRange,
}

/// Gamma-adjusted luminance for every sample of one frame, row-major
#[derive(Debug, Clone)]
pub struct LuminanceMap {
    values: Vec<f32>,
    width: u32,
}

impl LuminanceMap {
    /// Compute the adjusted luminance of every pixel of `image`.
    ///
    /// Bounds are gathered over the whole image before any value is
    /// normalized, so the result depends on the full frame.
    pub fn from_image(image: &RgbImage, mode: Normalization) -> Self {
        let raw: Vec<f32> = image
            .pixels()
            .map(|p| raw_luminance(p[0], p[1], p[2]))
            .collect();

        let (min, max) = match mode {
            Normalization::PerFrame => bounds(&raw),
            Normalization::FixedRange => (0.0, 255.0),
        };

        let values = raw
            .into_iter()
            .map(|lum| adjust_gamma(normalize(lum, min, max)))
            .collect();

        Self {
            values,
            width: image.width(),
        }
    }

    /// Adjusted luminance at a sample position
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// ITU-R BT.709 relative luminance in 0..=255
pub fn raw_luminance(r: u8, g: u8, b: u8) -> f32 {
    0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32
}

/// Rescale `lum` so `min` maps to 0 and `max` to 255.
///
/// A range narrower than one level is treated as one level wide, which sends
/// a flat frame to the bottom of the scale instead of dividing by zero.
pub fn normalize(lum: f32, min: f32, max: f32) -> f32 {
    let range = (max - min).max(1.0);
    ((lum - min) / range * 255.0).clamp(0.0, 255.0)
}

/// Apply [`GAMMA`] to a value in 0..=255
pub fn adjust_gamma(lum: f32) -> f32 {
    let unit = (lum / 255.0).clamp(0.0, 1.0);
    (255.0 * unit.powf(GAMMA)).clamp(0.0, 255.0)
}

fn bounds(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0))
}
