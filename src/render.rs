// render.rs — Render stage: one falloff disc per site, drawn per pixel.
//
// Each output pixel looks up its owning site in the index map and measures
// its distance to that site's current position. The disc radius scales with
// the site's average weight relative to the frame's heaviest site:
//
//   threshold  = K · avg_weight[i] / max(GlobalMax, ε)
//   brightness = 1 − (dist / threshold)³    if dist < threshold, else 0
//
// An idle site (avg_weight 0) has threshold 0 and therefore no disc, and the
// ε clamp keeps the first frame (GlobalMax 0) finite.

use image::RgbaImage;
use rayon::prelude::*;

use crate::config::RenderMode;
use crate::frame::{unit_to_u8, Frame};
use crate::image::Image;

/// Lower bound on the GlobalMax divisor.
pub const GLOBAL_MAX_EPSILON: f32 = 1e-6;

/// Disc radius for a site of average weight `avg_weight`.
#[inline]
pub fn threshold(falloff: f32, avg_weight: f32, global_max: f32) -> f32 {
    falloff * avg_weight / global_max.max(GLOBAL_MAX_EPSILON)
}

/// Cubic falloff: 1 at the site, 0 at and beyond `threshold`.
#[inline]
pub fn brightness(dist: f32, threshold: f32) -> f32 {
    if dist < threshold {
        let d = dist / threshold;
        1.0 - d * d * d
    } else {
        0.0
    }
}

/// Read-only inputs of one render pass.
#[derive(Clone, Copy)]
pub struct RenderInputs<'a> {
    pub frame: &'a Frame,
    pub positions: &'a [[f32; 2]],
    pub avg_weights: &'a [f32],
    pub global_max: f32,
    pub index_map: &'a Image<u32>,
    pub falloff: f32,
    pub mode: RenderMode,
}

/// Color of one output pixel, channels in [0, 1].
#[inline]
fn shade(inputs: &RenderInputs<'_>, x: u32, y: u32) -> [f32; 4] {
    let i = inputs.index_map.get(x as usize, y as usize) as usize;
    let p = inputs.positions[i];
    let dx = p[0] - x as f32;
    let dy = p[1] - y as f32;
    let dist = (dx * dx + dy * dy).sqrt();
    let t = threshold(inputs.falloff, inputs.avg_weights[i], inputs.global_max);
    let b = brightness(dist, t);

    match inputs.mode {
        RenderMode::Grayscale => [b, b, b, 1.0],
        RenderMode::Passthrough => {
            if dist < t {
                [b, b, b, 1.0]
            } else {
                let [r, g, bl] = inputs.frame.rgb(x, y);
                [r, g, bl, 1.0]
            }
        }
        RenderMode::Tinted { color } => [color[0] * b, color[1] * b, color[2] * b, 1.0],
    }
}

/// Run the render stage.
///
/// # Panics
/// Panics if the frame and index map differ in size, or if an index-map
/// entry is out of range for `positions`.
pub fn render(inputs: &RenderInputs<'_>) -> RgbaImage {
    let w = inputs.frame.width();
    let h = inputs.frame.height();
    assert!(
        inputs.index_map.width() == w as usize && inputs.index_map.height() == h as usize,
        "index map does not match frame size"
    );

    let mut out = RgbaImage::new(w, h);
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(w as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let c = shade(inputs, x as u32, y as u32);
                for (dst, v) in px.iter_mut().zip(c) {
                    *dst = unit_to_u8(v);
                }
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falloff_is_one_at_site_and_zero_at_threshold() {
        assert_eq!(brightness(0.0, 4.0), 1.0);
        assert_eq!(brightness(4.0, 4.0), 0.0);
        assert_eq!(brightness(5.0, 4.0), 0.0);
        assert!((brightness(2.0, 4.0) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn zero_global_max_stays_finite() {
        let t = threshold(3.125, 0.0, 0.0);
        assert_eq!(t, 0.0);
        assert_eq!(brightness(0.0, t), 0.0);
        assert!(threshold(3.125, 0.5, 0.0).is_finite());
    }

    fn one_site(mode: RenderMode) -> RgbaImage {
        let frame = Frame::uniform(5, 1, [0.2, 0.4, 0.6]);
        let map = Image::<u32>::new(5, 1);
        render(&RenderInputs {
            frame: &frame,
            positions: &[[0.0, 0.0]],
            avg_weights: &[1.0],
            global_max: 1.0,
            index_map: &map,
            falloff: 2.0,
            mode,
        })
    }

    #[test]
    fn grayscale_disc() {
        let img = one_site(RenderMode::Grayscale);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        // d = 0.5 → 0.875
        assert_eq!(img.get_pixel(1, 0).0, [223, 223, 223, 255]);
        assert_eq!(img.get_pixel(2, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn passthrough_shows_frame_outside_disc() {
        let img = one_site(RenderMode::Passthrough);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(4, 0).0, [51, 102, 153, 255]);
    }

    #[test]
    fn tinted_disc_on_black() {
        let img = one_site(RenderMode::Tinted { color: [1.0, 0.0, 0.5] });
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 128, 255]);
        assert_eq!(img.get_pixel(3, 0).0, [0, 0, 0, 255]);
    }
}
