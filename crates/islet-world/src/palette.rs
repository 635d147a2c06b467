//! Height to colour lookup table.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Biome-style colour table keyed by height thresholds.
///
/// A height maps to the colour of the smallest threshold that is greater than
/// or equal to it. Heights above every threshold take the highest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorLut {
    entries: BTreeMap<u8, [u8; 3]>,
}

impl Default for ColorLut {
    fn default() -> Self {
        Self::new()
            .with_entry(40, [63, 72, 204]) // deep water
            .with_entry(50, [0, 162, 232]) // shallow water
            .with_entry(55, [255, 242, 0]) // sand
            .with_entry(80, [181, 230, 29]) // grass
            .with_entry(95, [34, 177, 76]) // forest
            .with_entry(105, [127, 127, 127]) // rock
            .with_entry(255, [255, 255, 255]) // snow
    }
}

impl ColorLut {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add a threshold, replacing any colour already stored for it.
    #[must_use]
    pub fn with_entry(mut self, threshold: u8, rgb: [u8; 3]) -> Self {
        self.entries.insert(threshold, rgb);
        self
    }

    /// Number of thresholds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no thresholds.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 8-bit colour for `height`. An empty table yields black.
    pub fn lookup(&self, height: u8) -> [u8; 3] {
        self.entries
            .range(height..)
            .next()
            .or_else(|| self.entries.iter().next_back())
            .map_or([0, 0, 0], |(_, rgb)| *rgb)
    }

    /// Linear colour in `[0, 1]` for `height`.
    pub fn color(&self, height: u8) -> Vec3 {
        let [r, g, b] = self.lookup(height);
        Vec3::new(f32::from(r), f32::from(g), f32::from(b)) / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_picks_smallest_threshold_at_or_above() {
        let lut = ColorLut::default();
        assert_eq!(lut.lookup(0), [63, 72, 204]);
        assert_eq!(lut.lookup(40), [63, 72, 204]);
        assert_eq!(lut.lookup(41), [0, 162, 232]);
        assert_eq!(lut.lookup(55), [255, 242, 0]);
        assert_eq!(lut.lookup(56), [181, 230, 29]);
        assert_eq!(lut.lookup(200), [255, 255, 255]);
    }

    #[test]
    fn heights_above_table_use_last_entry() {
        let lut = ColorLut::new().with_entry(10, [1, 2, 3]).with_entry(20, [4, 5, 6]);
        assert_eq!(lut.lookup(255), [4, 5, 6]);
    }

    #[test]
    fn empty_table_is_black() {
        assert_eq!(ColorLut::new().lookup(30), [0, 0, 0]);
        assert!(ColorLut::new().is_empty());
    }

    #[test]
    fn color_is_normalized() {
        let lut = ColorLut::new().with_entry(255, [255, 0, 51]);
        assert_eq!(lut.color(7), Vec3::new(1.0, 0.0, 0.2));
    }
}
