//! Splits a record file into per-tile files.
//!
//! Input is the joined record file, one JSON object per line with at least a
//! `nodes` array, optionally paired line by line with the adjusted-values CSV
//! (`lat,lon,price_adjusted_2019`). Records are streamed straight into the
//! tile they belong to, so the output can be served as-is by any static file
//! host and read back with [`DirectorySource`](crate::source::DirectorySource).

use crate::config::VALUE_FIELD;
use crate::error::Error;
use crate::types::{Point, TileKey};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Deserialize)]
struct Geometry {
    #[serde(default)]
    nodes: Vec<Point>,
}

/// One row of the adjusted-values file.
#[derive(Debug, Clone, Copy, Deserialize)]
struct AdjustedValue {
    lat: f64,
    lon: f64,
    price_adjusted_2019: u64,
}

impl AdjustedValue {
    fn key(&self) -> TileKey {
        TileKey::containing(self.lat, self.lon)
    }

    fn merge_into(&self, record: &mut Map<String, Value>) {
        record.insert("lat".to_string(), self.lat.into());
        record.insert("lon".to_string(), self.lon.into());
        record.insert(VALUE_FIELD.to_string(), self.price_adjusted_2019.into());
    }
}

/// Counts from one tiling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TilerStats {
    /// Records written to a tile
    pub records: usize,
    /// Tile files written
    pub tiles: usize,
    /// Lines that were malformed, had no nodes or had no matching value row
    pub skipped: usize,
}

pub struct Tiler {
    out_dir: PathBuf,
}

impl Tiler {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Tiles the record file at `input`, keyed by the centroid of each record's nodes.
    pub fn build(&self, input: impl AsRef<Path>) -> Result<TilerStats, Error> {
        self.build_from(File::open(input.as_ref())?)
    }

    /// Tiles the record file at `input` joined with the adjusted-values CSV at `values`.
    pub fn build_with_values(
        &self,
        input: impl AsRef<Path>,
        values: impl AsRef<Path>,
    ) -> Result<TilerStats, Error> {
        self.build_joined(File::open(input.as_ref())?, File::open(values.as_ref())?)
    }

    /// Tiles records read from `reader`, copying each line verbatim.
    pub fn build_from(&self, reader: impl Read) -> Result<TilerStats, Error> {
        let mut out = TileWriter::create(&self.out_dir)?;
        let mut stats = TilerStats::default();

        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let centroid = serde_json::from_str::<Geometry>(line)
                .ok()
                .and_then(|g| Point::centroid(&g.nodes));
            let Some(centroid) = centroid else {
                debug!(line = idx + 1, "skipping record without geometry");
                stats.skipped += 1;
                continue;
            };
            out.append(TileKey::containing(centroid.lat, centroid.lon), line)?;
            stats.records += 1;
        }

        stats.tiles = out.tiles();
        info!(records = stats.records, tiles = stats.tiles, "tiles written");
        Ok(stats)
    }

    /// Tiles records joined row by row with adjusted values.
    ///
    /// The n-th non-blank record line pairs with the n-th CSV row. The row's
    /// `lat`, `lon` and `price_adjusted_2019` are merged into the record and
    /// its coordinates pick the tile.
    pub fn build_joined(&self, records: impl Read, values: impl Read) -> Result<TilerStats, Error> {
        let mut out = TileWriter::create(&self.out_dir)?;
        let mut stats = TilerStats::default();
        let mut rows = csv::Reader::from_reader(values).into_deserialize::<AdjustedValue>();

        for (idx, line) in BufReader::new(records).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = match rows.next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    debug!(line = idx + 1, error = %e, "skipping record with a bad value row");
                    stats.skipped += 1;
                    continue;
                }
                None => {
                    debug!(line = idx + 1, "skipping record without a value row");
                    stats.skipped += 1;
                    continue;
                }
            };
            let mut record = match serde_json::from_str::<Map<String, Value>>(line) {
                Ok(record) if has_nodes(&record) => record,
                _ => {
                    debug!(line = idx + 1, "skipping record without geometry");
                    stats.skipped += 1;
                    continue;
                }
            };
            row.merge_into(&mut record);
            let merged = serde_json::to_string(&record).map_err(|source| Error::Json {
                line: idx + 1,
                source,
            })?;
            out.append(row.key(), &merged)?;
            stats.records += 1;
        }

        let extra = rows.count();
        if extra > 0 {
            warn!(rows = extra, "values file has rows past the end of the record file");
        }
        stats.tiles = out.tiles();
        info!(records = stats.records, tiles = stats.tiles, "tiles written");
        Ok(stats)
    }
}

fn has_nodes(record: &Map<String, Value>) -> bool {
    record
        .get("nodes")
        .and_then(Value::as_array)
        .is_some_and(|nodes| !nodes.is_empty())
}

/// Appends lines to tile files. The first write of a run replaces whatever
/// the file held before; later writes append.
struct TileWriter<'a> {
    out_dir: &'a Path,
    touched: FxHashSet<TileKey>,
}

impl<'a> TileWriter<'a> {
    fn create(out_dir: &'a Path) -> Result<Self, Error> {
        std::fs::create_dir_all(out_dir)?;
        Ok(Self {
            out_dir,
            touched: FxHashSet::default(),
        })
    }

    fn append(&mut self, key: TileKey, line: &str) -> Result<(), Error> {
        let first = self.touched.insert(key);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first)
            .append(!first)
            .open(self.out_dir.join(key.file_name()))?;
        file.write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }

    fn tiles(&self) -> usize {
        self.touched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DirectorySource, TileSource};
    use crate::tile::{parse_tile, ParseMode};

    #[test]
    fn groups_records_by_centroid_tile() {
        let input = r#"{"id":"1","nodes":[{"lat":51.455,"lon":-0.965}]}
{"id":"2","nodes":[{"lat":51.4551,"lon":-0.9651},{"lat":51.4553,"lon":-0.9653}]}
{"id":"3","nodes":[{"lat":10.005,"lon":20.005}]}

{"id":"4","nodes":[]}
not json
"#;
        let dir = tempfile::tempdir().unwrap();
        let stats = Tiler::new(dir.path().join("tiles"))
            .build_from(input.as_bytes())
            .unwrap();
        assert_eq!(
            stats,
            TilerStats {
                records: 3,
                tiles: 2,
                skipped: 2
            }
        );

        let source = DirectorySource::new(dir.path().join("tiles"));
        let body = source.fetch(TileKey::new(14145, 17903)).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.starts_with(r#"{"id":"1""#));
    }

    #[test]
    fn joined_values_survive_into_tiles() {
        let records = r#"{"id":"1","nodes":[{"lat":10.005,"lon":20.005}],"addr:street":"Mill Lane"}
{"id":"2","nodes":[{"lat":51.4551,"lon":-0.9651}]}
{"id":"3","nodes":[]}
"#;
        let values = "lat,lon,price_adjusted_2019\n51.455,-0.965,250000\n51.4551,-0.9651,310000\n51.4552,-0.9652,1\n";
        let dir = tempfile::tempdir().unwrap();
        let stats = Tiler::new(dir.path())
            .build_joined(records.as_bytes(), values.as_bytes())
            .unwrap();
        assert_eq!(
            stats,
            TilerStats {
                records: 2,
                tiles: 1,
                skipped: 1
            }
        );

        // The value row's coordinates pick the tile, not the nodes.
        let body = DirectorySource::new(dir.path())
            .fetch(TileKey::new(14145, 17903))
            .unwrap();
        let tile = parse_tile(&body, ParseMode::Strict).unwrap();
        assert_eq!(tile.len(), 2);
        assert_eq!(tile[0].id.as_str(), "1");
        assert_eq!(tile[0].value(VALUE_FIELD), Some(250000.0));
        assert_eq!(tile[0].street.as_deref(), Some("Mill Lane"));
        assert_eq!(tile[1].value(VALUE_FIELD), Some(310000.0));
    }

    #[test]
    fn short_values_file_skips_the_rest() {
        let records = r#"{"id":"1","nodes":[{"lat":51.455,"lon":-0.965}]}
{"id":"2","nodes":[{"lat":51.455,"lon":-0.965}]}
"#;
        let values = "lat,lon,price_adjusted_2019\n51.455,-0.965,250000\n";
        let dir = tempfile::tempdir().unwrap();
        let stats = Tiler::new(dir.path())
            .build_joined(records.as_bytes(), values.as_bytes())
            .unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn rewritten_tiles_replace_old_contents() {
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(14145, 17903);
        std::fs::write(dir.path().join(key.file_name()), "stale\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let input = r#"{"id":"1","nodes":[{"lat":51.455,"lon":-0.965}]}
{"id":"2","nodes":[{"lat":51.455,"lon":-0.965}]}
"#;
        Tiler::new(dir.path()).build_from(input.as_bytes()).unwrap();

        let body = std::fs::read_to_string(dir.path().join(key.file_name())).unwrap();
        assert!(!body.contains("stale"));
        assert_eq!(body.lines().count(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "keep"
        );
    }
}
