// reference.rs — Sequential f64 weighted Lloyd relaxation.
//
// A deliberately plain reimplementation of one assign+reduce step: no
// atomics, no fixed point, no parallelism. Tests compare both backends
// against it. It consumes the same quantized weight map as the backends, so
// the only differences left are fixed-point rounding and f32 arithmetic.

use crate::image::Image;

/// Weight of one pixel as every backend sees it.
#[inline]
fn weight(code: u8) -> f64 {
    code as f64 / 255.0
}

/// Nearest site in f64, lowest index on ties.
pub fn nearest(positions: &[[f64; 2]], x: f64, y: f64) -> usize {
    let mut best = 0;
    let mut best_d2 = f64::INFINITY;
    for (i, p) in positions.iter().enumerate() {
        let d2 = (p[0] - x).powi(2) + (p[1] - y).powi(2);
        if d2 < best_d2 {
            best_d2 = d2;
            best = i;
        }
    }
    best
}

/// One weighted Lloyd step. Sites with no weight keep their position.
pub fn lloyd_step(weights: &Image<u8>, positions: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let n = positions.len();
    let mut sx = vec![0.0f64; n];
    let mut sy = vec![0.0f64; n];
    let mut sw = vec![0.0f64; n];

    for (x, y, code) in weights.pixels() {
        let (xf, yf) = (x as f64, y as f64);
        let i = nearest(positions, xf, yf);
        let w = weight(code);
        sx[i] += xf * w;
        sy[i] += yf * w;
        sw[i] += w;
    }

    (0..n)
        .map(|i| {
            if sw[i] > 0.0 {
                [sx[i] / sw[i], sy[i] / sw[i]]
            } else {
                positions[i]
            }
        })
        .collect()
}

/// `iterations` Lloyd steps from `initial`.
pub fn lloyd(weights: &Image<u8>, initial: &[[f32; 2]], iterations: usize) -> Vec<[f64; 2]> {
    let mut p: Vec<[f64; 2]> = initial.iter().map(|&[x, y]| [x as f64, y as f64]).collect();
    for _ in 0..iterations {
        p = lloyd_step(weights, &p);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_site_moves_to_weighted_mean() {
        // Full weight at x=0 and x=3 of a 4×1 strip, weight 1/3 at x=1.
        let weights = Image::<u8>::from_vec(4, 1, vec![255, 85, 0, 255]);
        let p = lloyd(&weights, &[[2.0, 0.0]], 1);
        let expected = (0.0 + 1.0 / 3.0 + 3.0) / (1.0 + 1.0 / 3.0 + 1.0);
        assert!((p[0][0] - expected).abs() < 1e-12);
        assert_eq!(p[0][1], 0.0);
    }

    #[test]
    fn weightless_site_stays() {
        let weights = Image::<u8>::from_vec(4, 1, vec![255, 0, 0, 0]);
        let p = lloyd(&weights, &[[0.0, 0.0], [3.0, 0.0]], 3);
        assert_eq!(p[1], [3.0, 0.0]);
        assert_eq!(p[0], [0.0, 0.0]);
    }
}
