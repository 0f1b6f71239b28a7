//! 64-bit average perceptual hash for duplicate frame detection.
//!
//! A frame is downscaled to 8x8 grayscale, and each pixel is compared
//! against the mean luminance: above-mean bits are set. Two frames whose
//! hashes differ in at most `hash_threshold` bits are treated as duplicates.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;

/// Side length of the downscaled grid. 8x8 = 64 bits.
const HASH_SIZE: u32 = 8;

/// A 64-bit average perceptual hash of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    /// Compute the average hash of an image.
    pub fn of_image(img: &DynamicImage) -> Self {
        let small = img
            .resize_exact(HASH_SIZE, HASH_SIZE, FilterType::Triangle)
            .to_luma8();

        let pixels: Vec<u64> = small.pixels().map(|p| u64::from(p.0[0])).collect();
        let mean = pixels.iter().sum::<u64>() / pixels.len() as u64;

        let mut bits = 0u64;
        for (i, &px) in pixels.iter().enumerate() {
            if px > mean {
                bits |= 1 << i;
            }
        }
        Self(bits)
    }

    /// Number of differing bits between two hashes.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// True if the hashes differ in at most `threshold` bits.
    pub fn is_near(&self, other: &PerceptualHash, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }

    /// The top 16 bits as a 4-hex-digit bucket key. Near-duplicate frames
    /// usually share a prefix, so duplicate lookups scan one bucket instead
    /// of the whole table.
    pub fn prefix_key(&self) -> String {
        format!("{:04x}", self.0 >> 48)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bits = u64::from_str_radix(s, 16)
            .with_context(|| format!("invalid perceptual hash: {s:?}"))?;
        Ok(Self(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_image(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([r, g, b])))
    }

    fn gradient_image() -> DynamicImage {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn hash_is_deterministic() {
        let img = gradient_image();
        assert_eq!(PerceptualHash::of_image(&img), PerceptualHash::of_image(&img));
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let a = PerceptualHash::of_image(&gradient_image());
        let b = PerceptualHash::of_image(&gradient_image());
        assert_eq!(a.distance(&b), 0);
        assert!(a.is_near(&b, 0));
    }

    #[test]
    fn different_images_have_large_distance() {
        // A gradient sets the right half of each row; its inverse sets the left.
        let left = RgbImage::from_fn(64, 64, |x, _| {
            let v = (255 - x * 4) as u8;
            Rgb([v, v, v])
        });
        let a = PerceptualHash::of_image(&gradient_image());
        let b = PerceptualHash::of_image(&DynamicImage::ImageRgb8(left));
        assert!(a.distance(&b) > 30, "distance was {}", a.distance(&b));
    }

    #[test]
    fn solid_images_hash_to_zero_bits() {
        // No pixel is strictly above the mean in a flat image.
        let h = PerceptualHash::of_image(&solid_image(128, 128, 128));
        assert_eq!(h.as_u64(), 0);
    }

    #[test]
    fn hex_round_trip() {
        let h = PerceptualHash::of_image(&gradient_image());
        let parsed: PerceptualHash = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
        assert_eq!(h.to_string().len(), 16);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-a-hash".parse::<PerceptualHash>().is_err());
        assert!("".parse::<PerceptualHash>().is_err());
    }

    #[test]
    fn prefix_key_is_top_16_bits() {
        let h = PerceptualHash(0xabcd_1234_5678_9def);
        assert_eq!(h.prefix_key(), "abcd");
    }

    #[test]
    fn two_bit_flip_is_within_default_threshold() {
        let a = PerceptualHash(0b1111_0000);
        let b = PerceptualHash(0b1111_0011);
        assert_eq!(a.distance(&b), 2);
        assert!(a.is_near(&b, 5));
        assert!(!a.is_near(&b, 1));
    }
}
