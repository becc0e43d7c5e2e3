// Shared types module - Color types used by the panel, the settings document and the server

use anyhow::Result;
use colorgrad::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

// The bridge's hue circle is rotated against the picker's; shifting by 40 degrees lines them up
pub const HUE_OFFSET: f64 = 40.0;

// HSL color as reported by the color picker (h: 0..360, s/l: 0..100)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn new(h: f64, s: f64, l: f64) -> Self {
        Hsl { h, s, l }
    }

    pub fn key(&self) -> ColorKey {
        ColorKey::from_hsl(self)
    }

    // "#rrggbb" for this color
    pub fn to_hex(&self) -> String {
        let h = self.h.rem_euclid(360.0);
        let s = (self.s / 100.0).clamp(0.0, 1.0);
        let l = (self.l / 100.0).clamp(0.0, 1.0);
        Color::from_hsla(h, s, l, 1.0).to_hex_string()
    }

    // Same hue, rotated by `delta` degrees and wrapped into 0..360
    pub fn rotate(&self, delta: f64) -> Self {
        Hsl { h: (self.h + delta).rem_euclid(360.0), ..*self }
    }
}

impl Default for Hsl {
    fn default() -> Self {
        // Picker starts at #ff0000
        Hsl { h: 0.0, s: 100.0, l: 50.0 }
    }
}

/// Identifier of a custom color, derived from its h/s/l triple.
///
/// Components are separated by '/', so (1, 23, 4) and (12, 3, 4) stay distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorKey(String);

impl ColorKey {
    pub fn from_hsl(hsl: &Hsl) -> Self {
        // f64 Display drops a trailing ".0", so 10.0 and 10 give the same key
        ColorKey(format!("{}/{}/{}", hsl.h, hsl.s, hsl.l))
    }
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts a picker hue into the bridge's 8 bit color value.
///
/// `round(((h + 40) mod 360) * 256 / 360)`, rounding half away from zero. The
/// single out-of-range result 256 wraps to 0, the same point on the hue circle.
pub fn encode_hue(hue: f64) -> u8 {
    let adjusted = (hue + HUE_OFFSET).rem_euclid(360.0);
    ((adjusted * (256.0 / 360.0)).round() as u32 % 256) as u8
}

// RGB color representation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 {
            anyhow::bail!("Invalid hex color: {}", hex);
        }
        Ok(Rgb {
            r: u8::from_str_radix(&hex[0..2], 16)?,
            g: u8::from_str_radix(&hex[2..4], 16)?,
            b: u8::from_str_radix(&hex[4..6], 16)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hue_literal_cases() {
        assert_eq!(encode_hue(0.0), 28);
        assert_eq!(encode_hue(340.0), 14);
        assert_eq!(encode_hue(360.0), 28);
        // 320 + 40 wraps to exactly 0
        assert_eq!(encode_hue(320.0), 0);
        // 319.9 + 40 = 359.9 -> 255.93 rounds to 256, which wraps
        assert_eq!(encode_hue(319.9), 0);
        assert_eq!(encode_hue(180.0), 156);
    }

    #[test]
    fn test_encode_hue_is_deterministic() {
        for h in 0..=360 {
            assert_eq!(encode_hue(h as f64), encode_hue(h as f64));
        }
    }

    #[test]
    fn test_color_key_is_delimited() {
        let a = Hsl::new(1.0, 23.0, 4.0).key();
        let b = Hsl::new(12.0, 3.0, 4.0).key();
        assert_ne!(a, b);
        assert_eq!(Hsl::new(10.0, 50.0, 50.0).key().to_string(), "10/50/50");
        assert_eq!(Hsl::new(10.5, 50.0, 50.0).key().to_string(), "10.5/50/50");
    }

    #[test]
    fn test_hsl_to_hex() {
        assert_eq!(Hsl::new(0.0, 100.0, 50.0).to_hex(), "#ff0000");
        assert_eq!(Hsl::new(120.0, 100.0, 50.0).to_hex(), "#00ff00");
        assert_eq!(Hsl::new(240.0, 100.0, 50.0).to_hex(), "#0000ff");
    }

    #[test]
    fn test_rotate_wraps() {
        let hsl = Hsl::new(350.0, 100.0, 50.0).rotate(20.0);
        assert_eq!(hsl.h, 10.0);
        let hsl = Hsl::new(5.0, 100.0, 50.0).rotate(-10.0);
        assert_eq!(hsl.h, 355.0);
    }

    #[test]
    fn test_rgb_from_hex() {
        let rgb = Rgb::from_hex("#ff8000").unwrap();
        assert_eq!(rgb, Rgb { r: 255, g: 128, b: 0 });
        assert!(Rgb::from_hex("fff").is_err());
    }
}
