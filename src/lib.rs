//! Tile-driven loading of geocoded price records onto an interactive map.
//!
//! `pricemap` keeps a map populated with property records as the user pans and
//! zooms. Records are published as static per-tile files; the library works out
//! which tiles the current view needs, fetches each of them at most once, drops
//! duplicates, and hands every record to the map exactly once as a coloured
//! polygon.
//!
//! # Features
//!
//! - **Fetch Once** - Concurrent requests for a tile share a single download
//! - **Draw Once** - A session-wide set guarantees no record is drawn twice
//! - **Admission Control** - Views needing more than 80 tiles are skipped, not half-loaded
//! - **Paced Delivery** - Large tiles pause every 100 shapes so the host stays responsive
//! - **Degrades Quietly** - Missing or malformed tiles simply draw nothing
//! - **Pluggable** - Map widget, tile source and palette are traits
//!
//! # Quick Start
//!
//! ```no_run
//! use pricemap::{Config, DrawableShape, HttpSource, MapWidget, Poller, Viewport};
//! use std::sync::Arc;
//!
//! struct Console;
//!
//! impl MapWidget for Console {
//!     fn viewport(&self) -> Viewport {
//!         Viewport::new(51.44, 51.46, -0.99, -0.95)
//!     }
//!
//!     fn add_polygon(&self, shape: DrawableShape) {
//!         println!("{} {}", shape.id, shape.fill);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let poller = Arc::new(Poller::new(
//!     Config::default(),
//!     Arc::new(Console),
//!     Arc::new(HttpSource::default()),
//! ));
//! let handle = poller.spawn()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! handle.stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ## Tiles
//!
//! The world is cut into 0.01° × 0.01° cells. A coordinate maps to
//! `(floor((lat + 90) * 100), floor((lon + 180) * 100))`, and the tile's file is
//! both indices zero-padded to five digits: `1414517903.jsonl`.
//!
//! ## Poll Cycle
//!
//! 1. Read the viewport from the [`MapWidget`]
//! 2. Map it to a [`TileSet`], one cell of overshoot on the north and east edges
//! 3. Skip the cycle if the set is larger than [`Config::max_tiles`]
//! 4. Shuffle the tiles; each tile nobody is loading yet gets a loader thread
//! 5. Loaders resolve their tile through the [`TileCache`] and deliver it;
//!    tiles already resolved are delivered together on one thread
//!
//! Cycles run every second and never wait for each other. Overlap is harmless:
//! both the cache and the [`DrawnSet`] only ever grow and are safe to race on.
//!
//! ## Tile Contents
//!
//! Each line is a JSON record with an `id`, a `nodes` array and address
//! fields. Records sharing `housenumber + housename : street : postcode` are
//! collapsed, the later line winning. Single-node records are drawn as a small
//! rectangle around the node.
//!
//! # Errors
//!
//! Nothing is surfaced to the map. Unreachable, missing or malformed tiles are
//! logged through `tracing` and behave as empty tiles for the rest of the
//! session. See [`ParseMode`] for how a single bad line is treated.
//!
//! # Modules
//!
//! - [`types`] - Core data structures ([`Viewport`], [`TileKey`], [`RawRecord`], [`DrawableShape`])
//! - [`tiler`] - Offline splitting of a record file into tile files

mod cache;
mod config;
mod delivery;
mod drawn;
mod error;
mod grid;
mod map;
mod palette;
mod poller;
mod source;
mod tile;
pub mod tiler;
pub mod types;

pub use cache::{TileCache, TileRecords};
pub use config::{Config, POLL_INTERVAL, VALUE_FIELD, VALUE_MAX};
pub use delivery::{deliver_tile, Pacer, Pacing, ShapeStyle, PACING_DELAY, PACING_EVERY};
pub use drawn::DrawnSet;
pub use error::Error;
pub use grid::{TileSet, MAX_TILES};
pub use map::MapWidget;
pub use palette::{Gradient, Palette, PRICE_PAID_STOPS};
pub use poller::{Cycle, PollOutcome, PollState, Poller, PollerHandle};
pub use source::{DirectorySource, HttpSource, TileSource, DEFAULT_BASE_URL};
pub use tile::{dedup_records, parse_tile, ParseMode};
pub use types::{Color, DrawableShape, Point, RawRecord, RecordId, TileKey, Viewport};
