// THEORY:
// The colour signature is a cheap appearance descriptor used by the tracker to
// tell apart two objects of similar size and position. It quantises the RGB cube
// into a few bins per channel, tallies a 3-D histogram of the crop, and reports
// which of eight coarse categories hold a noticeable share of the pixels.
//
// Categories, always reported in this order:
//   R, G, B   - one channel dominates the sum of the other two, which are balanced
//   C, M, Y   - one channel is clearly below the other two, which are balanced
//   W, K      - the all-high and all-low corners of the cube
//
// When a mask is supplied, pixels flagged 255 in it are left out of both the
// numerator and the denominator, so the signature describes only the pixels
// that remain.

use crate::config::ColorConfig;
use image::{GrayImage, RgbImage};
use std::fmt;

/// The eight colour categories, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorCategory {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    White,
    Black,
}

impl ColorCategory {
    pub const ALL: [ColorCategory; 8] = [
        ColorCategory::Red,
        ColorCategory::Green,
        ColorCategory::Blue,
        ColorCategory::Cyan,
        ColorCategory::Magenta,
        ColorCategory::Yellow,
        ColorCategory::White,
        ColorCategory::Black,
    ];

    pub fn letter(self) -> char {
        match self {
            ColorCategory::Red => 'R',
            ColorCategory::Green => 'G',
            ColorCategory::Blue => 'B',
            ColorCategory::Cyan => 'C',
            ColorCategory::Magenta => 'M',
            ColorCategory::Yellow => 'Y',
            ColorCategory::White => 'W',
            ColorCategory::Black => 'K',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.letter() == letter)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    fn is_neutral(self) -> bool {
        matches!(self, ColorCategory::White | ColorCategory::Black)
    }

    /// Whether the histogram cell `(r, g, b)` belongs to this category.
    fn contains(self, r: i32, g: i32, b: i32, bins: i32, min_diff: i32, max_diff: i32) -> bool {
        let balanced = |p: i32, q: i32| (p - q).abs() <= max_diff;
        let grey = balanced(r, g) && balanced(g, b) && balanced(r, b);
        match self {
            ColorCategory::Red => r >= g + b + min_diff && balanced(g, b),
            ColorCategory::Green => g >= r + b + min_diff && balanced(r, b),
            ColorCategory::Blue => b >= r + g + min_diff && balanced(r, g),
            ColorCategory::Cyan => r <= g + b - bins - min_diff + 1 && balanced(g, b),
            ColorCategory::Magenta => g <= r + b - bins - min_diff + 1 && balanced(r, b),
            ColorCategory::Yellow => b <= r + g - bins - min_diff + 1 && balanced(r, g),
            ColorCategory::White => r + g + b >= 3 * (bins - 1) - 2 * max_diff && grey,
            ColorCategory::Black => r + g + b <= 2 * max_diff && grey,
        }
    }
}

/// A set of colour categories. Displays as the concatenated letters, e.g. `"RK"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signature(u8);

impl Signature {
    pub fn contains(&self, category: ColorCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn insert(&mut self, category: ColorCategory) {
        self.0 |= category.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of categories present in exactly one of the two signatures.
    pub fn hamming(&self, other: &Signature) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Parses a letter string; unknown letters are ignored.
    pub fn from_letters(letters: &str) -> Self {
        let mut signature = Signature::default();
        for category in letters.chars().filter_map(ColorCategory::from_letter) {
            signature.insert(category);
        }
        signature
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for category in ColorCategory::ALL {
            if self.contains(category) {
                write!(f, "{}", category.letter())?;
            }
        }
        Ok(())
    }
}

/// Classifies crops into colour signatures with a fixed configuration.
#[derive(Debug, Clone)]
pub struct ColorSignature {
    config: ColorConfig,
}

impl ColorSignature {
    pub fn new(config: &ColorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ColorConfig {
        &self.config
    }

    /// Computes the signature of `pixels`. When masking is enabled, pixels whose
    /// counterpart in `exclude` is 255 are ignored.
    pub fn classify(&self, pixels: &RgbImage, exclude: Option<&GrayImage>) -> Signature {
        let bins = self.config.bins as usize;
        let mut histogram = vec![0u32; bins * bins * bins];
        let mut eligible = 0u64;
        let exclude = if self.config.masked { exclude } else { None };

        for (x, y, pixel) in pixels.enumerate_pixels() {
            let excluded = exclude
                .and_then(|mask| mask.get_pixel_checked(x, y))
                .is_some_and(|m| m[0] == 255);
            if excluded {
                continue;
            }
            let [r, g, b] = pixel.0;
            let index = (quantize(r, bins) * bins + quantize(g, bins)) * bins + quantize(b, bins);
            histogram[index] += 1;
            eligible += 1;
        }

        let mut signature = Signature::default();
        if eligible == 0 {
            return signature;
        }

        let n = bins as i32;
        for category in ColorCategory::ALL {
            if category.is_neutral() && !self.config.include_neutrals {
                continue;
            }
            let mut count = 0u64;
            for r in 0..n {
                for g in 0..n {
                    for b in 0..n {
                        if category.contains(r, g, b, n, self.config.min_diff, self.config.max_diff) {
                            count += histogram[((r * n + g) * n + b) as usize] as u64;
                        }
                    }
                }
            }
            if count as f64 / eligible as f64 > self.config.threshold {
                signature.insert(category);
            }
        }
        signature
    }
}

/// Uniform binning of `0..256` into `bins` cells.
fn quantize(value: u8, bins: usize) -> usize {
    value as usize * bins / 256
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn solid(color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(10, 10, Rgb(color))
    }

    #[test]
    fn pure_corners_map_to_their_letters() {
        let classifier = ColorSignature::new(&ColorConfig::default());
        let cases = [
            ([255, 0, 0], "R"),
            ([0, 255, 0], "G"),
            ([0, 0, 255], "B"),
            ([0, 255, 255], "C"),
            ([255, 0, 255], "M"),
            ([255, 255, 0], "Y"),
            ([255, 255, 255], "W"),
            ([0, 0, 0], "K"),
        ];
        for (color, expected) in cases {
            assert_eq!(classifier.classify(&solid(color), None).to_string(), expected);
        }
    }

    #[test]
    fn letters_come_out_in_fixed_order() {
        let mut image = solid([0, 0, 0]);
        for x in 0..5 {
            for y in 0..10 {
                image.put_pixel(x, y, Rgb([250, 10, 10]));
            }
        }
        let classifier = ColorSignature::new(&ColorConfig::default());
        assert_eq!(classifier.classify(&image, None).to_string(), "RK");
    }

    #[test]
    fn minor_colours_below_two_percent_are_dropped() {
        // 1 red pixel out of 100 is exactly 1%.
        let mut image = solid([255, 255, 255]);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        let classifier = ColorSignature::new(&ColorConfig::default());
        assert_eq!(classifier.classify(&image, None).to_string(), "W");
    }

    #[test]
    fn masked_pixels_leave_numerator_and_denominator() {
        let mut image = solid([0, 0, 0]);
        for x in 0..2 {
            image.put_pixel(x, 0, Rgb([0, 200, 0]));
        }
        // Exclude every black pixel: only the two green ones remain.
        let mut mask = GrayImage::from_pixel(10, 10, Luma([255]));
        mask.put_pixel(0, 0, Luma([0]));
        mask.put_pixel(1, 0, Luma([0]));

        let classifier = ColorSignature::new(&ColorConfig::default());
        assert_eq!(classifier.classify(&image, Some(&mask)).to_string(), "G");
        assert_eq!(classifier.classify(&image, None).to_string(), "K");
    }

    #[test]
    fn fully_masked_crop_has_empty_signature() {
        let image = solid([255, 0, 0]);
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));
        let classifier = ColorSignature::new(&ColorConfig::default());
        assert!(classifier.classify(&image, Some(&mask)).is_empty());
    }

    #[test]
    fn coarse_hues_ignore_mask_and_neutrals() {
        let image = solid([0, 0, 0]);
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));
        let classifier = ColorSignature::new(&ColorConfig::coarse_hues());
        assert!(classifier.classify(&image, Some(&mask)).is_empty());

        let red = solid([250, 0, 0]);
        assert_eq!(classifier.classify(&red, Some(&mask)).to_string(), "R");
    }

    #[test]
    fn hamming_counts_differing_letters() {
        let a = Signature::from_letters("RGK");
        let b = Signature::from_letters("GW");
        assert_eq!(a.hamming(&b), 3);
        assert_eq!(a.hamming(&a), 0);
    }
}
