// Small seeded PRNG for latent sampling (no external crates).
//
// Not cryptographically secure. Seeded so a "random latent" can be reproduced.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
    spare_normal: Option<f32>,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // xorshift must not start at zero.
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self {
            state,
            spare_normal: None,
        }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // 24 mantissa bits.
        ((self.next_u64() >> 40) as f32) / ((1u32 << 24) as f32)
    }

    /// Standard normal sample (Box–Muller; the second value is kept for the next call).
    pub fn next_standard_normal(&mut self) -> f32 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        let u1 = self.next_f32_01().max(1e-8);
        let u2 = self.next_f32_01();
        let r = (-2.0 * u1.ln()).sqrt();
        let (s, c) = (2.0 * std::f32::consts::PI * u2).sin_cos();
        self.spare_normal = Some(r * s);
        r * c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Prng::new(42);
        let mut b = Prng::new(42);
        for _ in 0..32 {
            assert_eq!(a.next_standard_normal().to_bits(), b.next_standard_normal().to_bits());
        }
    }

    #[test]
    fn normal_samples_are_roughly_standard() {
        let mut rng = Prng::new(7);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| rng.next_standard_normal()).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.1, "var {var}");
        assert!(samples.iter().all(|v| v.is_finite()));
    }
}
