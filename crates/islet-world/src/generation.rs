//! User-tunable terrain generation parameters.

use serde::{Deserialize, Serialize};

/// Parameters controlling the fractal noise that shapes the island.
///
/// These are the knobs a UI exposes for interactive regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainParams {
    /// Number of noise octaves for detail.
    pub octaves: u32,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Base frequency of the first octave.
    pub frequency: f64,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            octaves: 6,
            persistence: 0.5,
            frequency: 1.0,
            lacunarity: 2.0,
        }
    }
}

impl TerrainParams {
    /// Set the octave count.
    #[must_use]
    pub const fn with_octaves(mut self, octaves: u32) -> Self {
        self.octaves = octaves;
        self
    }

    /// Set the persistence.
    #[must_use]
    pub const fn with_persistence(mut self, persistence: f64) -> Self {
        self.persistence = persistence;
        self
    }

    /// Set the base frequency.
    #[must_use]
    pub const fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the lacunarity.
    #[must_use]
    pub const fn with_lacunarity(mut self, lacunarity: f64) -> Self {
        self.lacunarity = lacunarity;
        self
    }

    /// Clamp every parameter into the range the editor sliders allow.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            octaves: self.octaves.clamp(1, 10),
            persistence: self.persistence.clamp(0.1, 1.0),
            frequency: self.frequency.clamp(0.1, 10.0),
            lacunarity: self.lacunarity.clamp(0.1, 10.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_respects_slider_ranges() {
        let params = TerrainParams::default()
            .with_octaves(0)
            .with_persistence(3.0)
            .with_frequency(0.0)
            .with_lacunarity(42.0)
            .clamped();
        assert_eq!(params.octaves, 1);
        assert_eq!(params.persistence, 1.0);
        assert_eq!(params.frequency, 0.1);
        assert_eq!(params.lacunarity, 10.0);
    }

    #[test]
    fn defaults_are_within_ranges() {
        let params = TerrainParams::default();
        assert_eq!(params, params.clamped());
    }
}
