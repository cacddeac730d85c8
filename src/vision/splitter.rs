use image::{Rgb, RgbImage};

use crate::core::model::CardSplit;

/// Cuts a card into the dense left text block and the narrow right column.
#[derive(Debug, Clone)]
pub struct CardSplitter {
    /// Split column as `numerator / denominator` of the card width.
    numerator: u32,
    denominator: u32,
    sharpness: f32,
}

impl Default for CardSplitter {
    fn default() -> Self {
        Self {
            numerator: 7,
            denominator: 10,
            sharpness: 2.5,
        }
    }
}

impl CardSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn split_column(&self, width: u32) -> u32 {
        (width as u64 * self.numerator as u64 / self.denominator as u64) as u32
    }

    pub fn split(&self, card: &RgbImage) -> CardSplit {
        let (width, height) = card.dimensions();
        let split_x = self.split_column(width);
        let primary = image::imageops::crop_imm(card, 0, 0, split_x, height).to_image();
        let secondary =
            image::imageops::crop_imm(card, split_x, 0, width - split_x, height).to_image();
        CardSplit {
            primary: sharpen(&primary, self.sharpness),
            secondary,
            split_x,
        }
    }
}

// 3x3 smoothing kernel, weights sum to 13
const SMOOTH: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
const SMOOTH_WEIGHT: u32 = 13;

/// Sharpness enhancement: extrapolates away from a smoothed copy.
///
/// `factor` 1.0 returns the input, larger values sharpen. The one-pixel border
/// has no full neighbourhood and is left as is.
pub fn sharpen(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut blurred = [0u32; 3];
            for (ky, row) in SMOOTH.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let px = image.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for c in 0..3 {
                        blurred[c] += px[c] as u32 * weight;
                    }
                }
            }

            let original = image.get_pixel(x, y);
            let mut sharpened = [0u8; 3];
            for c in 0..3 {
                let smooth = (blurred[c] as f32 / SMOOTH_WEIGHT as f32).round();
                let value = smooth + factor * (original[c] as f32 - smooth);
                sharpened[c] = value.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(sharpened));
        }
    }
    out
}
