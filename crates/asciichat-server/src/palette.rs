//! ASCII palette selection: the glyph ramps a recipient's frames are
//! rendered with, darkest to brightest. Each slot caches its resolved
//! ramp so the render tick never re-parses configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteKind {
    #[default]
    Standard,
    Blocks,
    Digital,
    Minimal,
    Cool,
    Custom,
}

/// A resolved glyph ramp. Index 0 is darkest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    chars: Vec<char>,
}

impl GlyphRamp {
    pub fn resolve(kind: PaletteKind, custom: Option<&str>) -> Self {
        let chars: Vec<char> = match kind {
            PaletteKind::Standard => "   ...',;:clodxkO0KXNWM".chars().collect(),
            PaletteKind::Blocks => " \u{2591}\u{2592}\u{2593}\u{2588}".chars().collect(),
            PaletteKind::Digital => " .:-=+*#%@".chars().collect(),
            PaletteKind::Minimal => " .:*#".chars().collect(),
            PaletteKind::Cool => " .oO@".chars().collect(),
            PaletteKind::Custom => custom
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().collect())
                .unwrap_or_else(|| " .:*#".chars().collect()),
        };
        Self { chars }
    }

    /// Map an 8-bit luminance to a glyph.
    pub fn glyph(&self, luma: u8) -> char {
        let idx = (luma as usize * (self.chars.len() - 1)) / 255;
        self.chars[idx]
    }

    /// True when the ramp needs a terminal that can draw non-ASCII glyphs.
    pub fn needs_unicode(&self) -> bool {
        self.chars.iter().any(|c| !c.is_ascii())
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_map_to_ramp_ends() {
        let ramp = GlyphRamp::resolve(PaletteKind::Standard, None);
        assert_eq!(ramp.glyph(0), ' ');
        assert_eq!(ramp.glyph(255), 'M');
    }

    #[test]
    fn blocks_is_unicode() {
        assert!(GlyphRamp::resolve(PaletteKind::Blocks, None).needs_unicode());
        assert!(!GlyphRamp::resolve(PaletteKind::Digital, None).needs_unicode());
    }

    #[test]
    fn custom_ramp_used() {
        let ramp = GlyphRamp::resolve(PaletteKind::Custom, Some("ab"));
        assert_eq!(ramp.glyph(0), 'a');
        assert_eq!(ramp.glyph(255), 'b');
    }

    #[test]
    fn empty_custom_falls_back() {
        let ramp = GlyphRamp::resolve(PaletteKind::Custom, Some(""));
        assert!(!ramp.is_empty());
    }

    #[test]
    fn monotonic_mapping() {
        let ramp = GlyphRamp::resolve(PaletteKind::Digital, None);
        let mut last_idx = 0;
        for luma in 0..=255u8 {
            let g = ramp.glyph(luma);
            let idx = " .:-=+*#%@".chars().position(|c| c == g).unwrap();
            assert!(idx >= last_idx);
            last_idx = idx;
        }
    }
}
