//! Island height field synthesis.

use islet_core::constants::{HEIGHT_MULTIPLIER, HEIGHT_OFFSET};
use islet_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{NoiseGenerator, TerrainParams, WorldSeed};

/// Height field configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightFieldConfig {
    /// Edge length of the square grid in cells.
    pub side: usize,
    /// Seed for the noise permutation table.
    pub seed: WorldSeed,
    /// Baseline height added to every sample.
    pub offset: u8,
    /// Height range spanned by the shaped noise.
    pub multiplier: f64,
    /// Exponent applied to the normalized noise before scaling.
    pub contrast: f64,
}

impl Default for HeightFieldConfig {
    fn default() -> Self {
        Self {
            side: 1024,
            seed: 0,
            offset: HEIGHT_OFFSET,
            multiplier: HEIGHT_MULTIPLIER,
            contrast: 2.2,
        }
    }
}

impl HeightFieldConfig {
    /// Set the grid side length.
    #[must_use]
    pub const fn with_side(mut self, side: usize) -> Self {
        self.side = side;
        self
    }

    /// Set the noise seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: WorldSeed) -> Self {
        self.seed = seed;
        self
    }
}

/// Square grid of terrain heights.
///
/// Samples are stored row by row (`y * side + x`). Reads outside the grid
/// return 0 so neighbour queries at the border see open sea.
#[derive(Debug, Clone)]
pub struct HeightField {
    config: HeightFieldConfig,
    noise: NoiseGenerator,
    samples: Vec<u8>,
}

impl HeightField {
    /// Create a flat (all zero) height field.
    pub fn new(config: HeightFieldConfig) -> Self {
        Self {
            noise: NoiseGenerator::new(config.seed),
            samples: vec![0; config.side * config.side],
            config,
        }
    }

    /// Create a flat height field with default settings and the given side.
    pub fn with_side(side: usize) -> Self {
        Self::new(HeightFieldConfig::default().with_side(side))
    }

    /// Build a height field from explicit samples (row-major).
    pub fn from_samples(side: usize, samples: Vec<u8>) -> Result<Self> {
        if samples.len() != side * side {
            return Err(Error::InvalidData(format!(
                "expected {} samples for side {side}, got {}",
                side * side,
                samples.len()
            )));
        }
        let config = HeightFieldConfig::default().with_side(side);
        Ok(Self {
            noise: NoiseGenerator::new(config.seed),
            samples,
            config,
        })
    }

    /// Grid side length.
    #[inline]
    pub const fn side(&self) -> usize {
        self.config.side
    }

    /// Configuration the field was created with.
    pub const fn config(&self) -> &HeightFieldConfig {
        &self.config
    }

    /// Raw samples, row-major.
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Height at `(x, y)`, or 0 outside the grid.
    #[inline]
    pub fn height(&self, x: i64, y: i64) -> u8 {
        let side = self.config.side as i64;
        if x < 0 || y < 0 || x >= side || y >= side {
            return 0;
        }
        self.samples[(y * side + x) as usize]
    }

    /// Overwrite a single sample.
    pub fn set_height(&mut self, x: usize, y: usize, height: u8) -> Result<()> {
        let side = self.config.side;
        if x >= side || y >= side {
            return Err(Error::OutOfBounds(format!(
                "({x}, {y}) outside height field of side {side}"
            )));
        }
        self.samples[y * side + x] = height;
        Ok(())
    }

    /// Regenerate every sample from fresh noise parameters.
    ///
    /// Cells map to normalized coordinates in `[0, 2)` with the island centre
    /// at `(1, 1)`. The normalized noise is attenuated by `1 - d⁴` where `d²`
    /// is the squared distance from the centre clamped to 1, raised to the
    /// contrast exponent, then scaled into `offset..=offset + multiplier`.
    pub fn generate(&mut self, params: &TerrainParams) {
        self.noise.configure_with(params);

        let side = self.config.side;
        if side == 0 {
            return;
        }

        let noise = &self.noise;
        let amplitude = noise.amplitude();
        let offset = f64::from(self.config.offset);
        let multiplier = self.config.multiplier;
        let contrast = self.config.contrast;
        let step = 2.0 / side as f64;

        self.samples
            .par_chunks_mut(side)
            .enumerate()
            .for_each(|(y, row)| {
                let v = y as f64 * step;
                for (x, sample) in row.iter_mut().enumerate() {
                    let u = x as f64 * step;

                    let raw = noise.sample(u, v);
                    let normalized = ((raw + amplitude) / (2.0 * amplitude)).clamp(0.0, 1.0);

                    let du = u - 1.0;
                    let dv = v - 1.0;
                    let distance2 = (du * du + dv * dv).min(1.0);
                    let falloff = 1.0 - distance2 * distance2;

                    let shaped = (normalized * falloff).powf(contrast);
                    let height = (offset + shaped * multiplier).floor().clamp(0.0, 255.0);
                    *sample = height as u8;
                }
            });

        info!(
            "Generated {side}x{side} height field (octaves={}, persistence={}, frequency={}, lacunarity={})",
            noise.params().octaves,
            params.persistence,
            params.frequency,
            params.lacunarity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(side: usize, params: &TerrainParams) -> HeightField {
        let mut field = HeightField::with_side(side);
        field.generate(params);
        field
    }

    #[test]
    fn generation_deterministic() {
        let params = TerrainParams::default();
        let a = generated(64, &params);
        let b = generated(64, &params);
        assert_eq!(a.samples(), b.samples());

        // Regenerating in place yields the same grid again.
        let mut c = a.clone();
        c.generate(&params);
        assert_eq!(a.samples(), c.samples());
    }

    #[test]
    fn out_of_range_reads_return_zero() {
        let field = generated(16, &TerrainParams::default());
        let side = 16i64;
        for &(x, y) in &[
            (-1, 0),
            (0, -1),
            (-5, -5),
            (side, 0),
            (0, side),
            (side, side),
            (side + 3, 2),
            (2, side + 3),
            (i64::MIN, i64::MAX),
        ] {
            assert_eq!(field.height(x, y), 0, "({x}, {y})");
        }
    }

    #[test]
    fn heights_within_offset_and_multiplier() {
        let field = generated(64, &TerrainParams::default());
        let lo = HEIGHT_OFFSET;
        let hi = HEIGHT_OFFSET + HEIGHT_MULTIPLIER as u8;
        assert!(field.samples().iter().all(|&h| (lo..=hi).contains(&h)));
    }

    #[test]
    fn heights_truncate_towards_offset() {
        let config = HeightFieldConfig {
            multiplier: 0.99,
            contrast: 1.0,
            ..HeightFieldConfig::default().with_side(32)
        };
        let mut field = HeightField::new(config);
        field.generate(&TerrainParams::default());
        assert!(field.samples().iter().all(|&h| h == HEIGHT_OFFSET));
    }

    #[test]
    fn border_decays_to_offset() {
        let field = generated(32, &TerrainParams::default());
        for i in 0..32 {
            assert_eq!(field.height(0, i), HEIGHT_OFFSET);
            assert_eq!(field.height(i, 0), HEIGHT_OFFSET);
        }
    }

    #[test]
    fn centre_higher_than_corner() {
        let params = TerrainParams {
            octaves: 1,
            persistence: 0.5,
            frequency: 1.0,
            lacunarity: 2.0,
        };
        let field = generated(8, &params);
        assert!(field.height(4, 4) > field.height(0, 0));
    }

    #[test]
    fn regenerate_changes_terrain() {
        let mut field = generated(64, &TerrainParams::default());
        let before = field.samples().to_vec();
        field.generate(&TerrainParams::default().with_frequency(4.0));
        assert_ne!(before, field.samples());
    }

    #[test]
    fn set_height_bounds_checked() {
        let mut field = HeightField::with_side(4);
        field.set_height(3, 2, 90).unwrap();
        assert_eq!(field.height(3, 2), 90);
        assert!(field.set_height(4, 0, 1).is_err());
    }

    #[test]
    fn from_samples_rejects_wrong_length() {
        assert!(HeightField::from_samples(3, vec![0; 8]).is_err());
        assert!(HeightField::from_samples(3, vec![0; 9]).is_ok());
    }
}
