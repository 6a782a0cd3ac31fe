use clap::Parser;
use pricemap::tiler::Tiler;
use std::path::PathBuf;

/// Splits a newline-delimited record file into per-tile `.jsonl` files.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Joined record file, one JSON object per line
    input: PathBuf,
    /// Adjusted-values CSV (`lat,lon,price_adjusted_2019`), one row per record
    #[arg(long)]
    values: Option<PathBuf>,
    /// Directory receiving the tile files
    #[arg(short, long, default_value = "tiles")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .try_init();

    let args = Cli::parse();
    println!("Tiling {} into {}", args.input.display(), args.output.display());

    let tiler = Tiler::new(&args.output);
    let stats = match &args.values {
        Some(values) => tiler.build_with_values(&args.input, values)?,
        None => tiler.build(&args.input)?,
    };

    println!(
        "Done! {} records in {} tiles ({} skipped)",
        stats.records, stats.tiles, stats.skipped
    );
    Ok(())
}
