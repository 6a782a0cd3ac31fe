use crate::delivery::{millis, Pacing};
use crate::error::Error;
use crate::grid::MAX_TILES;
use crate::tile::ParseMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How often the viewport is re-read.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Value at the top of the colour scale (£2m, in 2019 prices).
pub const VALUE_MAX: f64 = 2_000_000.0;

/// Attribute used for colouring when none is configured.
pub const VALUE_FIELD: &str = "price_adjusted_2019";

/// Tunables of the loading pipeline. Every field has a default, so a partial
/// JSON document (or `{}`) is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Delay between poll cycles
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Largest tile set fetched in one cycle; bigger sets skip the cycle
    pub max_tiles: usize,
    pub pacing: Pacing,
    pub value_field: String,
    pub value_max: f64,
    pub parse_mode: ParseMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_tiles: MAX_TILES,
            pacing: Pacing::default(),
            value_field: VALUE_FIELD.to_string(),
            value_max: VALUE_MAX,
            parse_mode: ParseMode::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Error::Config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_overrides() {
        let config = Config::from_json(
            r#"{"poll_interval": 250, "parse_mode": "lenient", "pacing": {"every": 50, "delay": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.parse_mode, ParseMode::Lenient);
        assert_eq!(config.pacing.every, 50);
        assert_eq!(config.pacing.delay, Duration::from_millis(5));
        assert_eq!(config.max_tiles, 80);
        assert_eq!(config.value_field, "price_adjusted_2019");
    }

    #[test]
    fn rejects_bad_types() {
        assert!(matches!(
            Config::from_json(r#"{"max_tiles": "lots"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricemap.json");
        std::fs::write(&path, r#"{"value_max": 1000000}"#).unwrap();
        assert_eq!(Config::load(&path).unwrap().value_max, 1_000_000.0);
    }
}
