//! Perceptual image hashing for content-addressed uploads.
//!
//! Implements the DCT-based "pHash": the image is reduced to a grayscale
//! thumbnail, transformed with a 2-D DCT-II, and every low-frequency
//! coefficient is compared against their median. Visually similar images
//! map to the same (or a nearby) hash, so re-uploading a near-identical
//! sketch lands on the file the backend already holds.

use std::f64::consts::PI;
use std::fmt;

use image::imageops::FilterType;
use image::DynamicImage;

/// Side length of the low-frequency block; the hash has
/// `HASH_SIZE * HASH_SIZE` bits.
pub const HASH_SIZE: usize = 16;

/// The thumbnail is `HASH_SIZE * HIGHFREQ_FACTOR` pixels square.
const HIGHFREQ_FACTOR: usize = 4;

/// A 256-bit perceptual hash, stored row-major over the DCT block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualHash {
    bits: Vec<bool>,
}

impl PerceptualHash {
    /// Number of differing bits between two hashes.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        self.bits
            .iter()
            .zip(&other.bits)
            .filter(|(a, b)| a != b)
            .count() as u32
    }

    /// Lowercase hex rendering, most significant bit first
    /// (`HASH_SIZE * HASH_SIZE / 4` characters).
    pub fn to_hex(&self) -> String {
        self.bits
            .chunks(4)
            .map(|nibble| {
                let value = nibble
                    .iter()
                    .fold(0u32, |acc, &bit| (acc << 1) | u32::from(bit));
                char::from_digit(value, 16).unwrap_or('0')
            })
            .collect()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the perceptual hash of an image.
pub fn perceptual_hash(image: &DynamicImage) -> PerceptualHash {
    let side = HASH_SIZE * HIGHFREQ_FACTOR;
    let thumb = image::imageops::resize(
        &image.to_luma8(),
        side as u32,
        side as u32,
        FilterType::Lanczos3,
    );
    let pixels: Vec<f64> = thumb.pixels().map(|p| f64::from(p.0[0])).collect();

    let cosines = cosine_table(side);

    // DCT along columns, keeping only the first HASH_SIZE frequencies.
    let mut column_pass = vec![0.0; HASH_SIZE * side];
    for k in 0..HASH_SIZE {
        for x in 0..side {
            column_pass[k * side + x] = (0..side)
                .map(|y| pixels[y * side + x] * cosines[k * side + y])
                .sum();
        }
    }

    // DCT along rows of the reduced block.
    let mut block = Vec::with_capacity(HASH_SIZE * HASH_SIZE);
    for row in 0..HASH_SIZE {
        for k in 0..HASH_SIZE {
            block.push(
                (0..side)
                    .map(|x| column_pass[row * side + x] * cosines[k * side + x])
                    .sum::<f64>(),
            );
        }
    }

    let median = median(&block);
    PerceptualHash {
        bits: block.iter().map(|&c| c > median).collect(),
    }
}

/// Convenience wrapper returning the hex form used for upload filenames.
pub fn perceptual_hash_hex(image: &DynamicImage) -> String {
    perceptual_hash(image).to_hex()
}

/// `cos(pi * k * (2n + 1) / 2N)` for `k < HASH_SIZE`, `n < side`.
fn cosine_table(side: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(HASH_SIZE * side);
    for k in 0..HASH_SIZE {
        for n in 0..side {
            table.push((PI * k as f64 * (2 * n + 1) as f64 / (2 * side) as f64).cos());
        }
    }
    table
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
