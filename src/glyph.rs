use serde::{Deserialize, Serialize};

/// Grayscale ramp, darkest to brightest
pub const GRAYSCALE_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', 'o', 'O', '#', '@'];

/// Color ramp; shorter because the color itself carries brightness
pub const COLOR_RAMP: &[char] = &[' ', '.', ':', '+', '*', 'o', 'O', '#', '@'];

/// Brightness ramp variant used to pick glyphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharacterRamp {
    Grayscale,
    Color,
}

impl CharacterRamp {
    /// Ramp for a render mode
    pub fn for_mode(grayscale: bool) -> Self {
        if grayscale {
            CharacterRamp::Grayscale
        } else {
            CharacterRamp::Color
        }
    }

    pub fn glyphs(&self) -> &'static [char] {
        match self {
            CharacterRamp::Grayscale => GRAYSCALE_RAMP,
            CharacterRamp::Color => COLOR_RAMP,
        }
    }

    pub fn len(&self) -> usize {
        self.glyphs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs().is_empty()
    }

    /// Ramp index for a luminance in 0..=255.
    ///
    /// The range is split into `len` equal buckets; 255 lands in the last one.
    pub fn index_for(&self, luminance: f32) -> usize {
        let len = self.len();
        let scaled = (luminance.clamp(0.0, 255.0) / 256.0 * len as f32).floor() as usize;
        scaled.min(len - 1)
    }

    /// Glyph for a luminance in 0..=255
    pub fn glyph_for(&self, luminance: f32) -> char {
        self.glyphs()[self.index_for(luminance)]
    }

    pub fn darkest(&self) -> char {
        self.glyphs()[0]
    }

    pub fn brightest(&self) -> char {
        self.glyphs()[self.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes() {
        for ramp in [CharacterRamp::Grayscale, CharacterRamp::Color] {
            assert_eq!(ramp.glyph_for(0.0), ' ');
            assert_eq!(ramp.glyph_for(255.0), '@');
            assert_eq!(ramp.index_for(255.0), ramp.len() - 1);
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let ramp = CharacterRamp::Grayscale;
        assert_eq!(ramp.index_for(-12.0), 0);
        assert_eq!(ramp.index_for(1000.0), ramp.len() - 1);
    }

    #[test]
    fn test_monotonic() {
        for ramp in [CharacterRamp::Grayscale, CharacterRamp::Color] {
            let mut last = 0;
            for step in 0..=2550 {
                let index = ramp.index_for(step as f32 / 10.0);
                assert!(index >= last, "index dropped at luminance {}", step as f32 / 10.0);
                last = index;
            }
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        // 11 glyphs: each bucket is 256/11 ≈ 23.27 levels wide
        let ramp = CharacterRamp::Grayscale;
        assert_eq!(ramp.index_for(23.0), 0);
        assert_eq!(ramp.index_for(24.0), 1);
        assert_eq!(ramp.index_for(128.0), 5);
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(CharacterRamp::for_mode(true), CharacterRamp::Grayscale);
        assert_eq!(CharacterRamp::for_mode(false), CharacterRamp::Color);
        assert!(CharacterRamp::Grayscale.len() > CharacterRamp::Color.len());
    }
}
