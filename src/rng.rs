//! Deterministic seeding of the initial site layout.
//!
//! A seed string is hashed to 128 bits with cyrb128 over its UTF-16 code
//! units, and the first hash word drives a splitmix32 stream. Each site takes
//! two draws, x then y, truncated to whole pixels.

/// Hash `seed` into four 32-bit words.
pub fn cyrb128(seed: &str) -> [u32; 4] {
    let mut h1: u32 = 1_779_033_703;
    let mut h2: u32 = 3_144_134_277;
    let mut h3: u32 = 1_013_904_242;
    let mut h4: u32 = 2_773_480_762;
    for k in seed.encode_utf16().map(u32::from) {
        h1 = h2 ^ (h1 ^ k).wrapping_mul(597_399_067);
        h2 = h3 ^ (h2 ^ k).wrapping_mul(2_869_860_233);
        h3 = h4 ^ (h3 ^ k).wrapping_mul(951_274_213);
        h4 = h1 ^ (h4 ^ k).wrapping_mul(2_716_044_179);
    }
    h1 = (h3 ^ (h1 >> 18)).wrapping_mul(597_399_067);
    h2 = (h4 ^ (h2 >> 22)).wrapping_mul(2_869_860_233);
    h3 = (h1 ^ (h3 >> 17)).wrapping_mul(951_274_213);
    h4 = (h2 ^ (h4 >> 19)).wrapping_mul(2_716_044_179);
    h1 ^= h2 ^ h3 ^ h4;
    h2 ^= h1;
    h3 ^= h1;
    h4 ^= h1;
    [h1, h2, h3, h4]
}

/// splitmix32 generator.
#[derive(Debug, Clone)]
pub struct SplitMix32 {
    state: u32,
}

impl SplitMix32 {
    pub fn new(state: u32) -> Self {
        SplitMix32 { state }
    }

    /// Seed from a string via [`cyrb128`].
    pub fn from_seed_str(seed: &str) -> Self {
        Self::new(cyrb128(seed)[0])
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x9e37_79b9);
        let mut t = self.state ^ (self.state >> 16);
        t = t.wrapping_mul(0x21f0_aaad);
        t ^= t >> 15;
        t = t.wrapping_mul(0x735a_2d97);
        t ^ (t >> 15)
    }

    /// Uniform draw in [0, 1).
    pub fn next_unit(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }
}

/// Seed `count` integer-aligned positions inside a `width × height` frame.
pub fn seed_positions(seed: &str, count: usize, width: u32, height: u32) -> Vec<[f32; 2]> {
    let mut rng = SplitMix32::from_seed_str(seed);
    (0..count)
        .map(|_| {
            let x = (rng.next_unit() * width as f64).floor() as f32;
            let y = (rng.next_unit() * height as f64).floor() as f32;
            [x, y]
        })
        .collect()
}
