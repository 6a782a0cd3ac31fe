//! The periodic viewport poll that drives fetching and delivery.

use crate::cache::{TileCache, TileRecords};
use crate::config::Config;
use crate::delivery::{deliver_tile, Pacer, ShapeStyle};
use crate::drawn::DrawnSet;
use crate::grid::TileSet;
use crate::map::MapWidget;
use crate::palette::{Gradient, Palette};
use crate::source::TileSource;
use crate::types::{RawRecord, TileKey};
use rustc_hash::FxHashSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Where the poller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Mapping,
    Admitting,
    Aborted,
    Fetching,
    Stopped,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The viewport needed more tiles than allowed; nothing was fetched.
    Aborted { tiles: usize },
    /// The tiles were handed to workers.
    Dispatched { tiles: usize },
}

/// The workers of one poll cycle.
///
/// Dropping a cycle detaches its workers; they run to completion on their own.
pub struct Cycle {
    pub outcome: PollOutcome,
    pacer: Arc<Pacer>,
    workers: Vec<JoinHandle<usize>>,
}

impl Cycle {
    /// Blocks until the cycle's workers finish and returns the number of
    /// shapes they added to the map. Tiles left to an earlier cycle's loader
    /// are not waited for.
    pub fn wait(self) -> usize {
        self.workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or(0))
            .sum()
    }

    pub fn pacer(&self) -> &Arc<Pacer> {
        &self.pacer
    }

    /// Threads started by this cycle.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

enum Dispatch {
    Resolved(TileRecords),
    InFlight,
    Load,
}

/// Marks a tile as having a loader attached. Released when the loader
/// finishes, unwinds or fails to start.
struct LoaderClaim {
    poller: Arc<Poller>,
    key: TileKey,
}

impl LoaderClaim {
    fn load(&self, pacer: &Pacer) -> usize {
        let records = self.poller.cache.get(self.key);
        self.poller.deliver(self.key, &records, pacer)
    }
}

impl Drop for LoaderClaim {
    fn drop(&mut self) {
        self.poller
            .loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Loads tiles for whatever the map is showing.
///
/// The tile cache and the drawn set live as long as the poller's session and
/// may be shared between pollers (e.g. several views of one map).
pub struct Poller {
    config: Config,
    map: Arc<dyn MapWidget>,
    palette: Arc<dyn Palette>,
    cache: Arc<TileCache>,
    drawn: Arc<DrawnSet>,
    loading: Mutex<FxHashSet<TileKey>>,
    state: Mutex<PollState>,
}

impl Poller {
    /// A fresh session over `source` with the default price-paid palette.
    pub fn new(config: Config, map: Arc<dyn MapWidget>, source: Arc<dyn TileSource>) -> Self {
        let cache = Arc::new(TileCache::new(source, config.parse_mode));
        Self::from_parts(
            config,
            map,
            Arc::new(Gradient::price_paid()),
            cache,
            Arc::new(DrawnSet::new()),
        )
    }

    pub fn from_parts(
        config: Config,
        map: Arc<dyn MapWidget>,
        palette: Arc<dyn Palette>,
        cache: Arc<TileCache>,
        drawn: Arc<DrawnSet>,
    ) -> Self {
        Self {
            config,
            map,
            palette,
            cache,
            drawn,
            loading: Mutex::new(FxHashSet::default()),
            state: Mutex::new(PollState::Idle),
        }
    }

    pub fn with_palette(mut self, palette: Arc<dyn Palette>) -> Self {
        self.palette = palette;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn drawn(&self) -> &Arc<DrawnSet> {
        &self.drawn
    }

    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PollState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Runs one cycle: read the viewport, map it to tiles, apply the tile cap,
    /// and hand the tiles out in shuffled order.
    ///
    /// A tile nobody has requested yet gets its own loader thread, which
    /// fetches it and delivers it with this cycle's pacer. Tiles already
    /// resolved are delivered together on a single thread. Tiles still being
    /// loaded by an earlier cycle are skipped; their loader delivers them.
    ///
    /// Returns as soon as the workers are started.
    pub fn poll_once(self: &Arc<Self>) -> Cycle {
        self.set_state(PollState::Polling);
        let viewport = self.map.viewport();

        self.set_state(PollState::Mapping);
        let tiles = TileSet::covering(&viewport);

        self.set_state(PollState::Admitting);
        let pacer = Arc::new(Pacer::new(self.config.pacing));
        let Some(keys) = tiles.admit(self.config.max_tiles) else {
            debug!(tiles = tiles.len(), cap = self.config.max_tiles, "too many tiles, skipping poll");
            self.set_state(PollState::Aborted);
            self.set_state(PollState::Idle);
            return Cycle {
                outcome: PollOutcome::Aborted { tiles: tiles.len() },
                pacer,
                workers: Vec::new(),
            };
        };

        self.set_state(PollState::Fetching);
        let mut resolved = Vec::new();
        let mut workers = Vec::new();
        let mut in_flight = 0;
        for &key in &keys {
            match self.dispatch(key) {
                Dispatch::Resolved(records) => resolved.push((key, records)),
                Dispatch::InFlight => in_flight += 1,
                Dispatch::Load => workers.extend(self.spawn_loader(key, pacer.clone())),
            }
        }
        let loaders = workers.len();
        if !resolved.is_empty() {
            workers.extend(self.spawn_delivery(resolved, pacer.clone()));
        }
        debug!(tiles = keys.len(), loaders, in_flight, "dispatched poll");
        self.set_state(PollState::Idle);

        Cycle {
            outcome: PollOutcome::Dispatched { tiles: keys.len() },
            pacer,
            workers,
        }
    }

    /// Decides who delivers `key` this cycle. A tile still loading is left to
    /// the worker already attached to it; that worker delivers every record.
    fn dispatch(&self, key: TileKey) -> Dispatch {
        let mut loading = self.loading.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(records) = self.cache.peek(key) {
            return Dispatch::Resolved(records);
        }
        if loading.insert(key) {
            Dispatch::Load
        } else {
            Dispatch::InFlight
        }
    }

    fn spawn_loader(self: &Arc<Self>, key: TileKey, pacer: Arc<Pacer>) -> Option<JoinHandle<usize>> {
        let claim = LoaderClaim {
            poller: self.clone(),
            key,
        };
        let spawned = thread::Builder::new()
            .name(format!("tile-{key}"))
            .spawn(move || claim.load(&pacer));
        match spawned {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(tile = %key, error = %e, "failed to start tile worker");
                None
            }
        }
    }

    /// Delivers every already-resolved tile of a cycle on one thread.
    fn spawn_delivery(
        self: &Arc<Self>,
        tiles: Vec<(TileKey, TileRecords)>,
        pacer: Arc<Pacer>,
    ) -> Option<JoinHandle<usize>> {
        let poller = self.clone();
        let spawned = thread::Builder::new()
            .name("tile-delivery".to_string())
            .spawn(move || {
                tiles
                    .iter()
                    .map(|(key, records)| poller.deliver(*key, records, &pacer))
                    .sum()
            });
        match spawned {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(error = %e, "failed to start delivery worker");
                None
            }
        }
    }

    fn deliver(&self, key: TileKey, records: &[RawRecord], pacer: &Pacer) -> usize {
        let style = ShapeStyle {
            value_field: &self.config.value_field,
            value_max: self.config.value_max,
            palette: self.palette.as_ref(),
        };
        let delivered = deliver_tile(records, &self.drawn, &style, pacer, self.map.as_ref());
        if delivered > 0 {
            debug!(tile = %key, delivered, "delivered tile");
        }
        delivered
    }

    /// Starts polling every `poll_interval` on a background thread.
    ///
    /// The first cycle runs one interval after the call. Cycles never wait for
    /// the previous cycle's workers.
    pub fn spawn(self: Arc<Self>) -> std::io::Result<PollerHandle> {
        let (stop, stopped) = mpsc::channel::<()>();
        let poller = self.clone();
        let thread = thread::Builder::new()
            .name("pricemap-poller".to_string())
            .spawn(move || {
                info!(interval = ?poller.config.poll_interval, "poller started");
                while let Err(RecvTimeoutError::Timeout) =
                    stopped.recv_timeout(poller.config.poll_interval)
                {
                    drop(poller.poll_once());
                }
                poller.set_state(PollState::Stopped);
                info!("poller stopped");
            })?;
        Ok(PollerHandle {
            poller: self,
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

/// Owner of a running poll loop. Stopping (or dropping) it ends the loop;
/// tile workers already started are left to finish.
pub struct PollerHandle {
    poller: Arc<Poller>,
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn state(&self) -> PollState {
        self.poller.state()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
