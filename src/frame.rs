// frame.rs — One input frame and the weight map derived from it.
//
// A `Frame` is plain RGB in [0, 1], row-major, no padding. Stages never look
// at the color directly except the passthrough render mode; the assignment
// stage reads only the weight map, which is quantized once per frame:
//
//   RGB (f32) ──WeightMode──▶ w ∈ [0,1] ──encode_weight──▶ u8 code
//
// Both backends and the CPU reference consume the same `Image<u8>` of codes,
// so a weight is never computed twice in two different precisions.

use rayon::prelude::*;

use crate::config::WeightMode;
use crate::error::FrameError;
use crate::fixed::encode_weight;
use crate::image::Image;

/// An RGB frame with channels in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgb: Vec<[f32; 3]>,
}

impl Frame {
    /// # Panics
    /// Panics if `rgb.len() != width * height`.
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<[f32; 3]>) -> Self {
        assert_eq!(
            rgb.len(),
            width as usize * height as usize,
            "rgb length ({}) must equal width * height ({})",
            rgb.len(),
            width as usize * height as usize,
        );
        Frame { width, height, rgb }
    }

    /// Build a frame by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [f32; 3]) -> Self {
        let rgb = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Frame { width, height, rgb }
    }

    /// A frame of one flat color.
    pub fn uniform(width: u32, height: u32, rgb: [f32; 3]) -> Self {
        Frame {
            width,
            height,
            rgb: vec![rgb; width as usize * height as usize],
        }
    }

    /// Convert a decoded image of any pixel format.
    pub fn from_dynamic_image(img: &image::DynamicImage) -> Self {
        let rgb32 = img.to_rgb32f();
        let (width, height) = rgb32.dimensions();
        let rgb = rgb32.pixels().map(|p| p.0).collect();
        Frame { width, height, rgb }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [f32; 3] {
        self.rgb[(y * self.width + x) as usize]
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.rgb
    }

    /// Quantized weight codes for every pixel.
    pub fn weight_map(&self, mode: WeightMode) -> Image<u8> {
        let codes: Vec<u8> = self
            .rgb
            .par_iter()
            .map(|&px| encode_weight(mode.weight(px)))
            .collect();
        Image::from_vec(self.width as usize, self.height as usize, codes)
    }

    /// RGBA8 bytes (alpha 255), packed rows.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.rgb
            .par_iter()
            .flat_map_iter(|px| {
                let [r, g, b] = (*px).map(unit_to_u8);
                [r, g, b, 255]
            })
            .collect()
    }

    /// Fail with a transient error unless this frame is `width × height`.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), FrameError> {
        if self.width == width && self.height == height {
            Ok(())
        } else {
            Err(FrameError::DimensionMismatch {
                expected_w: width,
                expected_h: height,
                actual_w: self.width,
                actual_h: self.height,
            })
        }
    }
}

/// Quantize a channel in [0, 1] the way WGSL `pack4x8unorm` does:
/// `floor(0.5 + 255 · clamp(v, 0, 1))`.
#[inline]
pub fn unit_to_u8(v: f32) -> u8 {
    (0.5 + 255.0 * v.clamp(0.0, 1.0)).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fn_is_row_major() {
        let f = Frame::from_fn(3, 2, |x, y| [x as f32 / 10.0, y as f32 / 10.0, 0.0]);
        assert_eq!(f.rgb(2, 0), [0.2, 0.0, 0.0]);
        assert_eq!(f.rgb(1, 1), [0.1, 0.1, 0.0]);
        assert_eq!(f.pixels().len(), 6);
    }

    #[test]
    fn darkness_weights_black_fully() {
        let f = Frame::from_fn(2, 1, |x, _| if x == 0 { [0.0; 3] } else { [1.0; 3] });
        let w = f.weight_map(WeightMode::Darkness);
        assert_eq!(w.get(0, 0), 255);
        assert_eq!(w.get(1, 0), 0);

        let w = f.weight_map(WeightMode::Brightness);
        assert_eq!(w.get(0, 0), 0);
        assert_eq!(w.get(1, 0), 255);
    }

    #[test]
    fn mid_gray_weight_code() {
        let f = Frame::uniform(1, 1, [0.5, 0.5, 0.5]);
        assert_eq!(f.weight_map(WeightMode::Darkness).get(0, 0), 128);
    }

    #[test]
    fn rgba8_has_opaque_alpha() {
        let f = Frame::uniform(2, 2, [1.0, 0.0, 0.5]);
        let bytes = f.to_rgba8();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &[255, 0, 128, 255]);
    }

    #[test]
    fn dimension_check() {
        let f = Frame::uniform(4, 3, [0.0; 3]);
        assert!(f.check_dimensions(4, 3).is_ok());
        assert!(matches!(
            f.check_dimensions(3, 4),
            Err(FrameError::DimensionMismatch { actual_w: 4, actual_h: 3, .. })
        ));
    }

    #[test]
    fn dynamic_image_conversion() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(1, 0, image::Rgb([255, 0, 0]));
        let f = Frame::from_dynamic_image(&image::DynamicImage::ImageRgb8(img));
        assert_eq!(f.width(), 2);
        assert_eq!(f.rgb(0, 0), [0.0, 0.0, 0.0]);
        assert_eq!(f.rgb(1, 0), [1.0, 0.0, 0.0]);
    }
}
