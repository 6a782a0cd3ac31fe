//! Viewport to tile mapping and admission control.

use crate::types::{cell_index, TileKey, Viewport, CELLS_PER_DEGREE};

/// Largest tile set a single poll cycle may fetch.
pub const MAX_TILES: usize = 80;

/// Inclusive rectangle of tile indices covering a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSet {
    lat0: u32,
    lat1: u32,
    lon0: u32,
    lon1: u32,
}

impl TileSet {
    /// Tiles covering `viewport`.
    ///
    /// The range runs from the cell holding the south-west corner to one past
    /// the cell holding the north-east corner, so tiles only partially inside
    /// the high edges are never missed. Inverted viewports give an empty set.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricemap::{TileSet, Viewport};
    ///
    /// let tiles = TileSet::covering(&Viewport::new(51.455, 51.455, -0.965, -0.965));
    /// assert_eq!(tiles.len(), 4);
    /// ```
    pub fn covering(viewport: &Viewport) -> Self {
        if viewport.south > viewport.north || viewport.west > viewport.east {
            return Self::empty();
        }
        Self {
            lat0: cell_index(viewport.south, 90.0),
            lat1: upper_index(viewport.north, 90.0),
            lon0: cell_index(viewport.west, 180.0),
            lon1: upper_index(viewport.east, 180.0),
        }
    }

    fn empty() -> Self {
        Self {
            lat0: 1,
            lat1: 0,
            lon0: 1,
            lon1: 0,
        }
    }

    /// Number of tiles, `(lat1 - lat0 + 1) * (lon1 - lon0 + 1)`.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let lats = ((self.lat1 - self.lat0) as usize).saturating_add(1);
        let lons = ((self.lon1 - self.lon0) as usize).saturating_add(1);
        lats.saturating_mul(lons)
    }

    /// True for sets built from inverted viewports.
    pub fn is_empty(&self) -> bool {
        self.lat0 > self.lat1 || self.lon0 > self.lon1
    }

    /// True when `key` falls inside the rectangle.
    pub fn contains(&self, key: TileKey) -> bool {
        (self.lat0..=self.lat1).contains(&key.lat) && (self.lon0..=self.lon1).contains(&key.lon)
    }

    /// Tiles in row-major order (latitude outer, longitude inner).
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        let lons = self.lon0..=self.lon1;
        (self.lat0..=self.lat1).flat_map(move |lat| lons.clone().map(move |lon| TileKey::new(lat, lon)))
    }

    /// Applies admission control: `None` when the set exceeds `cap`, otherwise
    /// the tiles in uniformly shuffled order.
    pub fn admit(&self, cap: usize) -> Option<Vec<TileKey>> {
        if self.len() > cap {
            return None;
        }
        let mut keys: Vec<TileKey> = self.keys().collect();
        fastrand::shuffle(&mut keys);
        Some(keys)
    }
}

/// Index one cell past the cell holding `coordinate`.
fn upper_index(coordinate: f64, offset: f64) -> u32 {
    ((coordinate + offset) * CELLS_PER_DEGREE + 1.0).floor().max(0.0) as u32
}
