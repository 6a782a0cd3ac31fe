//! Turning cached records into shapes on the map.

use crate::drawn::DrawnSet;
use crate::map::MapWidget;
use crate::palette::Palette;
use crate::types::{DrawableShape, Point, RawRecord, POINT_HALF_LAT, POINT_HALF_LON};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Deliveries between pauses.
pub const PACING_EVERY: usize = 100;

/// Length of each pause, one frame at 60Hz.
pub const PACING_DELAY: Duration = Duration::from_millis(16);

/// How often a delivery pass steps aside for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Pause after every `every` deliveries; 0 disables pausing.
    pub every: usize,
    /// How long each pause lasts.
    #[serde(with = "millis")]
    pub delay: Duration,
}

impl Pacing {
    /// Never pauses, for renderers that absorb bursts.
    pub fn disabled() -> Self {
        Self {
            every: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            every: PACING_EVERY,
            delay: PACING_DELAY,
        }
    }
}

/// Delivery counter shared by every tile of one poll cycle.
///
/// Pausing only blocks the thread that hit the threshold; other tiles of the
/// same cycle keep going.
#[derive(Debug)]
pub struct Pacer {
    pacing: Pacing,
    delivered: AtomicUsize,
    pauses: AtomicUsize,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            delivered: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
        }
    }

    /// Counts one delivery, sleeping first when it lands on a multiple of `every`.
    pub fn tick(&self) {
        let n = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        if self.pacing.every > 0 && n % self.pacing.every == 0 {
            self.pauses.fetch_add(1, Ordering::Relaxed);
            trace!(delivered = n, "pacing delivery");
            std::thread::sleep(self.pacing.delay);
        }
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }
}

/// Everything needed to turn a record into a coloured polygon.
pub struct ShapeStyle<'a> {
    /// Attribute holding the colouring value
    pub value_field: &'a str,
    /// Value mapped to the top of the palette
    pub value_max: f64,
    pub palette: &'a dyn Palette,
}

impl ShapeStyle<'_> {
    /// Builds the polygon for `record`, or `None` when it has no geometry.
    ///
    /// Multi-node records keep their outline. A single node becomes a small
    /// rectangle centred on it, corners south-west, north-west, north-east,
    /// south-east. Records without a value are coloured as zero.
    pub fn shape(&self, record: &RawRecord) -> Option<DrawableShape> {
        let vertices = match record.nodes.as_slice() {
            [] => return None,
            [p] => vec![
                Point::new(p.lat - POINT_HALF_LAT, p.lon - POINT_HALF_LON),
                Point::new(p.lat + POINT_HALF_LAT, p.lon - POINT_HALF_LON),
                Point::new(p.lat + POINT_HALF_LAT, p.lon + POINT_HALF_LON),
                Point::new(p.lat - POINT_HALF_LAT, p.lon + POINT_HALF_LON),
            ],
            nodes => nodes.to_vec(),
        };
        let value = record.value(self.value_field).unwrap_or(0.0);
        Some(DrawableShape {
            id: record.id.clone(),
            vertices,
            fill: self.palette.color(value / self.value_max),
        })
    }
}

/// Delivers the not-yet-drawn records of one tile, in order.
///
/// Returns how many shapes reached the map.
pub fn deliver_tile(
    records: &[RawRecord],
    drawn: &DrawnSet,
    style: &ShapeStyle<'_>,
    pacer: &Pacer,
    map: &dyn MapWidget,
) -> usize {
    let mut delivered = 0;
    for record in records {
        if drawn.contains(&record.id) {
            continue;
        }
        let Some(shape) = style.shape(record) else {
            debug!(id = %record.id, "record has no geometry");
            continue;
        };
        if !drawn.insert(&record.id) {
            continue;
        }
        pacer.tick();
        map.add_polygon(shape);
        delivered += 1;
    }
    delivered
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
