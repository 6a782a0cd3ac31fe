//! Core data structures for tiles, records and drawable shapes.
//!
//! This module defines the fundamental types used throughout the library:
//!
//! - [`Viewport`] - Geographic bounding box read from the map widget
//! - [`TileKey`] - Integer grid coordinate identifying a tile and its file
//! - [`Point`] - Latitude/longitude node of a record's geometry
//! - [`RawRecord`] - One parsed line of a tile file
//! - [`DrawableShape`] - Renderer-facing polygon with a fill colour

#![warn(missing_docs)]

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Number of grid cells per degree. Cells are 0.01° × 0.01° (~1.1km north-south).
pub const CELLS_PER_DEGREE: f64 = 100.0;

/// Half-height in degrees of the rectangle synthesized around single-node records.
pub const POINT_HALF_LAT: f64 = 0.00005;

/// Half-width in degrees of the rectangle synthesized around single-node records.
pub const POINT_HALF_LON: f64 = 0.00008;

/// Stand-in for an absent address field in [`RawRecord::address_key`].
pub const MISSING_FIELD: &str = "\u{0}";

/// A geographic bounding box in decimal degrees.
///
/// Supplied by the map widget on every poll. The core never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Southern edge latitude (-90 to 90)
    pub south: f64,
    /// Northern edge latitude (-90 to 90)
    pub north: f64,
    /// Western edge longitude (-180 to 180)
    pub west: f64,
    /// Eastern edge longitude (-180 to 180)
    pub east: f64,
}

impl Viewport {
    /// Constructs a viewport from its four edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricemap::Viewport;
    ///
    /// let view = Viewport::new(51.44, 51.46, -0.99, -0.95);
    /// assert!(view.contains(51.45, -0.97));
    /// ```
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Returns true when the given coordinate lies inside the box, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }
}

/// Grid coordinate of a 0.01° tile.
///
/// Latitude in [-90, 90) and longitude in [-180, 180) are shifted to be
/// non-negative and quantized:
///
/// - `lat = floor((latitude + 90) * 100)`
/// - `lon = floor((longitude + 180) * 100)`
///
/// The [`Display`](fmt::Display) form is the remote file stem: both indices
/// zero-padded to five digits and concatenated (e.g. `1414517903`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    /// Latitude index
    pub lat: u32,
    /// Longitude index
    pub lon: u32,
}

impl TileKey {
    /// Constructs a key from raw indices.
    pub fn new(lat: u32, lon: u32) -> Self {
        Self { lat, lon }
    }

    /// Quantizes a coordinate to the key of the tile containing it.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricemap::TileKey;
    ///
    /// let key = TileKey::containing(51.455, -0.965);
    /// assert_eq!(key, TileKey::new(14145, 17903));
    /// assert_eq!(key.to_string(), "1414517903");
    /// ```
    pub fn containing(latitude: f64, longitude: f64) -> Self {
        Self {
            lat: cell_index(latitude, 90.0),
            lon: cell_index(longitude, 180.0),
        }
    }

    /// File name of this tile in the store, e.g. `1414517903.jsonl`.
    pub fn file_name(&self) -> String {
        format!("{self}.jsonl")
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05}{:05}", self.lat, self.lon)
    }
}

/// Shifts a coordinate by `offset` and quantizes it to a cell index, saturating at zero.
pub(crate) fn cell_index(coordinate: f64, offset: f64) -> u32 {
    ((coordinate + offset) * CELLS_PER_DEGREE).floor().max(0.0) as u32
}

/// A single geometry node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

impl Point {
    /// Constructs a point.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Arithmetic mean of a set of nodes, or `None` when empty.
    pub fn centroid(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let len = points.len() as f64;
        let lat: f64 = points.iter().map(|p| p.lat).sum();
        let lon: f64 = points.iter().map(|p| p.lon).sum();
        Some(Point::new(lat / len, lon / len))
    }
}

/// Stable identifier of a record.
///
/// Tile files carry ids either as JSON strings (transaction ids) or as
/// numbers; both normalise to their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => RecordId(text),
            Raw::Number(number) => RecordId(number.to_string()),
        })
    }
}

/// One parsed line of a tile file.
///
/// Only the fields the pipeline needs are typed; every other attribute
/// (price, transaction date, property type, ...) is kept in `attrs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Record identifier, unique across the whole data set
    pub id: RecordId,
    /// Geometry: a single node for points, several for building outlines
    #[serde(default)]
    pub nodes: Vec<Point>,
    /// House number, e.g. "12A"
    #[serde(rename = "addr:housenumber", default, skip_serializing_if = "Option::is_none")]
    pub housenumber: Option<String>,
    /// House name, e.g. "The Royal Foresters"
    #[serde(rename = "addr:housename", default, skip_serializing_if = "Option::is_none")]
    pub housename: Option<String>,
    /// Street name
    #[serde(rename = "addr:street", default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    /// Postcode
    #[serde(rename = "addr:postcode", default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    /// Remaining attributes, including the numeric value used for colouring
    #[serde(flatten)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    /// Composite address key used for intra-tile deduplication.
    ///
    /// `housenumber + housename + ":" + street + ":" + postcode`. A missing
    /// field contributes [`MISSING_FIELD`], so a house number of `12` and a
    /// house name of `12` stay distinct.
    pub fn address_key(&self) -> String {
        let field = |f: &Option<String>| f.as_deref().unwrap_or(MISSING_FIELD).to_string();
        format!(
            "{}{}:{}:{}",
            field(&self.housenumber),
            field(&self.housename),
            field(&self.street),
            field(&self.postcode)
        )
    }

    /// Reads the numeric attribute `field`, accepting JSON numbers and numeric strings.
    pub fn value(&self, field: &str) -> Option<f64> {
        match self.attrs.get(field)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Color {
    /// Constructs a colour from its channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Renderer-facing polygon with a solid fill.
///
/// Shapes are drawn without stroke and with full fill opacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawableShape {
    /// Record this shape was built from
    pub id: RecordId,
    /// Polygon vertices in drawing order
    pub vertices: Vec<Point>,
    /// Fill colour
    pub fill: Color,
}
