//! Multi-octave simplex noise.

use ::noise::{NoiseFn, Simplex};

use crate::{TerrainParams, WorldSeed};

/// Deterministic fractal noise evaluator.
///
/// Sums `octaves` layers of 2D simplex noise. Layer `k` is scaled in amplitude
/// by `persistence^k` and in input coordinates by `frequency * lacunarity^k`,
/// so samples lie in `[-amplitude(), amplitude()]`.
#[derive(Clone)]
pub struct NoiseGenerator {
    seed: WorldSeed,
    simplex: Simplex,
    params: TerrainParams,
}

impl NoiseGenerator {
    /// Create a generator with default parameters.
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            seed,
            simplex: Simplex::new(seed),
            params: TerrainParams::default(),
        }
    }

    /// Seed used for the permutation table.
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// Current parameters.
    pub const fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Set evaluation parameters. Zero octaves are treated as one.
    pub fn configure(&mut self, octaves: u32, persistence: f64, frequency: f64, lacunarity: f64) {
        self.params = TerrainParams {
            octaves: octaves.max(1),
            persistence,
            frequency,
            lacunarity,
        };
    }

    /// Set evaluation parameters from a parameter block.
    pub fn configure_with(&mut self, params: &TerrainParams) {
        self.configure(
            params.octaves,
            params.persistence,
            params.frequency,
            params.lacunarity,
        );
    }

    /// Theoretical maximum magnitude of a sample: the sum of `persistence^k`.
    pub fn amplitude(&self) -> f64 {
        let mut amplitude = 0.0;
        let mut layer = 1.0;
        for _ in 0..self.params.octaves {
            amplitude += layer;
            layer *= self.params.persistence;
        }
        amplitude
    }

    /// Evaluate the noise at `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.params.frequency;

        for _ in 0..self.params.octaves {
            total += self.simplex.get([x * frequency, y * frequency]) * amplitude;
            amplitude *= self.params.persistence;
            frequency *= self.params.lacunarity;
        }

        total
    }
}

impl std::fmt::Debug for NoiseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseGenerator")
            .field("seed", &self.seed)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn noise_deterministic() {
        let a = NoiseGenerator::new(7);
        let b = NoiseGenerator::new(7);

        for i in 0..64 {
            let x = f64::from(i) * 0.173;
            let y = f64::from(i) * 0.041;
            assert_eq!(a.sample(x, y).to_bits(), b.sample(x, y).to_bits());
        }
    }

    #[test]
    fn different_seeds_different_noise() {
        let a = NoiseGenerator::new(1);
        let b = NoiseGenerator::new(2);

        let differences = (0..100)
            .filter(|&i| {
                let x = f64::from(i) * 0.137 + 0.05;
                let y = f64::from(i) * 0.071 + 0.05;
                a.sample(x, y) != b.sample(x, y)
            })
            .count();
        assert!(differences > 50, "Seeds should produce different noise");
    }

    #[test]
    fn amplitude_sums_persistence_powers() {
        let mut noise = NoiseGenerator::new(0);
        noise.configure(3, 0.5, 1.0, 2.0);
        assert_relative_eq!(noise.amplitude(), 1.75);

        noise.configure(1, 0.5, 1.0, 2.0);
        assert_relative_eq!(noise.amplitude(), 1.0);
    }

    #[test]
    fn zero_octaves_clamped_to_one() {
        let mut noise = NoiseGenerator::new(0);
        noise.configure(0, 0.5, 1.0, 2.0);
        assert_eq!(noise.params().octaves, 1);
    }

    #[test]
    fn samples_bounded_by_amplitude() {
        let mut noise = NoiseGenerator::new(99);
        noise.configure(6, 0.5, 1.0, 2.0);
        // Simplex may overshoot its nominal range by a hair.
        let bound = noise.amplitude() * 1.05;

        for i in 0..40 {
            for j in 0..40 {
                let value = noise.sample(f64::from(i) * 0.05, f64::from(j) * 0.05);
                assert!(value.abs() <= bound, "{value} exceeds {bound}");
            }
        }
    }
}
