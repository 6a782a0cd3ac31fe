use crate::source::TileSource;
use crate::tile::{dedup_records, parse_tile, ParseMode};
use crate::types::{RawRecord, TileKey};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, warn};

/// Resolved contents of one tile: deduplicated records in delivery order.
pub type TileRecords = Arc<[RawRecord]>;

type Slot = Arc<OnceLock<TileRecords>>;

/// Session-wide memo of tile contents, fetched at most once per key.
///
/// A lookup registers the key's slot under the map lock before any network
/// activity, so concurrent callers for the same key share one `OnceLock` and
/// block on its single initialisation. Failed fetches resolve to an empty tile
/// and are never retried. Entries are never evicted.
pub struct TileCache {
    source: Arc<dyn TileSource>,
    mode: ParseMode,
    slots: Mutex<FxHashMap<TileKey, Slot>>,
    fetches: AtomicUsize,
}

impl TileCache {
    pub fn new(source: Arc<dyn TileSource>, mode: ParseMode) -> Self {
        Self {
            source,
            mode,
            slots: Mutex::new(FxHashMap::default()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Returns the records of `key`, fetching them on first use.
    pub fn get(&self, key: TileKey) -> TileRecords {
        let slot = self.slot(key);
        if let Some(records) = slot.get() {
            debug!(tile = %key, "tile cache hit");
            return records.clone();
        }
        slot.get_or_init(|| self.load(key)).clone()
    }

    /// Resolved records of `key`, without fetching. `None` while unknown or in flight.
    pub fn peek(&self, key: TileKey) -> Option<TileRecords> {
        self.lock().get(&key).and_then(|slot| slot.get().cloned())
    }

    /// True once `key` has been requested, whether or not it has resolved.
    pub fn contains(&self, key: TileKey) -> bool {
        self.lock().contains_key(&key)
    }

    /// Number of tiles requested so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches issued to the source.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn slot(&self, key: TileKey) -> Slot {
        self.lock().entry(key).or_default().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<TileKey, Slot>> {
        // Entries are only ever added, so a poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, key: TileKey) -> TileRecords {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let records = self
            .source
            .fetch(key)
            .and_then(|body| parse_tile(&body, self.mode));
        match records {
            Ok(records) => {
                let total = records.len();
                let records = dedup_records(records);
                info!(tile = %key, total, unique = records.len(), "fetched tile");
                records.into()
            }
            Err(e) => {
                warn!(tile = %key, error = %e, "tile unavailable, treating as empty");
                Arc::from(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        body: Result<&'static str, u16>,
    }

    impl TileSource for CountingSource {
        fn fetch(&self, _key: TileKey) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.body.map(str::to_string).map_err(Error::Status)
        }
    }

    fn cache(body: Result<&'static str, u16>) -> (Arc<CountingSource>, TileCache) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            body,
        });
        let cache = TileCache::new(source.clone(), ParseMode::Strict);
        (source, cache)
    }

    const BODY: &str = r#"{"id":"1","nodes":[{"lat":51.45,"lon":-0.97}],"addr:street":"A"}
{"id":"2","nodes":[{"lat":51.45,"lon":-0.97}],"addr:street":"A"}
"#;

    #[test]
    fn concurrent_gets_share_one_fetch() {
        let (source, cache) = cache(Ok(BODY));
        let key = TileKey::new(14145, 17903);

        let results: Vec<TileRecords> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| cache.get(key))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.fetches(), 1);
        for records in &results {
            assert!(Arc::ptr_eq(records, &results[0]));
        }
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[0][0].id.as_str(), "2");
    }

    #[test]
    fn failures_resolve_empty_and_are_not_retried() {
        let (source, cache) = cache(Err(503));
        let key = TileKey::new(1, 1);
        assert!(cache.get(key).is_empty());
        assert!(cache.get(key).is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_tile_resolves_empty() {
        let (_, cache) = cache(Ok("{\"id\":\"1\",\"nodes\":[]}\nnot json\n"));
        assert!(cache.get(TileKey::new(2, 2)).is_empty());
    }

    #[test]
    fn distinct_keys_fetch_separately() {
        let (source, cache) = cache(Ok(BODY));
        assert!(cache.is_empty());
        assert!(cache.peek(TileKey::new(1, 1)).is_none());
        cache.get(TileKey::new(1, 1));
        cache.get(TileKey::new(1, 2));
        cache.get(TileKey::new(1, 1));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(TileKey::new(1, 2)));
        assert_eq!(cache.peek(TileKey::new(1, 1)).map(|r| r.len()), Some(1));
    }
}
