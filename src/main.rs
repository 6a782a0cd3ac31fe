use clap::Parser;
use pricemap::{
    Config, DirectorySource, DrawableShape, HttpSource, MapWidget, PollOutcome, Poller, TileSource,
    Viewport,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the tiles covering a fixed view and prints every delivered shape as a JSON line.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, allow_negative_numbers = true)]
struct Cli {
    south: f64,
    north: f64,
    west: f64,
    east: f64,
    /// Read tiles from a local directory instead of the remote store
    #[arg(long)]
    tiles_dir: Option<PathBuf>,
    /// Base URL of the remote tile store
    #[arg(long, default_value = pricemap::DEFAULT_BASE_URL)]
    base_url: String,
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of poll cycles to run
    #[arg(long, default_value_t = 1)]
    cycles: usize,
}

struct StdoutMap {
    viewport: Viewport,
}

impl MapWidget for StdoutMap {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn add_polygon(&self, shape: DrawableShape) {
        let Ok(line) = serde_json::to_string(&shape) else {
            return;
        };
        if let Err(e) = writeln!(std::io::stdout().lock(), "{line}") {
            warn!(error = %e, "failed to write shape");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .try_init();

    let args = Cli::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let source: Arc<dyn TileSource> = match args.tiles_dir {
        Some(dir) => Arc::new(DirectorySource::new(dir)),
        None => Arc::new(HttpSource::new(args.base_url)),
    };
    let map = Arc::new(StdoutMap {
        viewport: Viewport::new(args.south, args.north, args.west, args.east),
    });
    let interval = config.poll_interval;
    let poller = Arc::new(Poller::new(config, map, source));

    for cycle in 0..args.cycles {
        if cycle > 0 {
            std::thread::sleep(interval);
        }
        let run = poller.poll_once();
        let outcome = run.outcome;
        match outcome {
            PollOutcome::Aborted { tiles } => {
                warn!(tiles, "view needs too many tiles, zoom in");
            }
            PollOutcome::Dispatched { tiles } => {
                let delivered = run.wait();
                info!(cycle, tiles, delivered, "poll finished");
            }
        }
    }

    info!(
        tiles = poller.cache().len(),
        drawn = poller.drawn().len(),
        "done"
    );
    Ok(())
}
