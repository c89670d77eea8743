use bigimage::{DiskReader, PyramidStore, Rgb8, StoreConfig, StoreError, StoreHeader};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

/// BigImage - out-of-core Z-order image store
#[derive(Parser)]
#[command(name = "bigimage", version, about)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a pyramid store filled with a synthetic gradient
    Generate {
        /// Header path (must end in .bigimage)
        header: PathBuf,

        /// Image rows
        #[arg(long)]
        rows: u64,

        /// Image cols
        #[arg(long)]
        cols: u64,

        /// Requested minimum rows of the coarsest level
        #[arg(long, default_value_t = 256)]
        min_rows: u64,

        /// Requested minimum cols of the coarsest level
        #[arg(long, default_value_t = 256)]
        min_cols: u64,

        /// Bytes per node file
        #[arg(long, default_value_t = bigimage::config::DEFAULT_NODE_BYTES)]
        node_bytes: u64,

        /// Levels written per scan (default: all)
        #[arg(long)]
        ways: Option<usize>,

        /// Keep the base level in a mapped scratch file instead of memory
        #[arg(long)]
        scratch: Option<PathBuf>,
    },

    /// Print a store header and its level extents
    Info {
        /// Header path
        header: PathBuf,
    },

    /// Read a region and save it as PNG or JPEG
    Extract {
        /// Header path
        header: PathBuf,

        /// Pyramid level
        #[arg(long, default_value_t = 0)]
        level: u32,

        /// Top row
        #[arg(long, default_value_t = 0)]
        row: u64,

        /// Left column
        #[arg(long, default_value_t = 0)]
        col: u64,

        /// Rows to read
        #[arg(long)]
        rows: u64,

        /// Cols to read
        #[arg(long)]
        cols: u64,

        /// Output image; the format follows the extension
        #[arg(long)]
        out: PathBuf,

        /// Node cache capacity
        #[arg(long, default_value_t = bigimage::config::DEFAULT_CACHE_NODES)]
        cache: usize,
    },
}

fn gradient(row: u64, col: u64, rows: u64, cols: u64) -> Rgb8 {
    let r = (row * 255 / rows.max(1)) as u8;
    let g = (col * 255 / cols.max(1)) as u8;
    let b = ((row / 64 + col / 64) % 2 * 255) as u8;
    Rgb8::new(r, g, b)
}

fn handle_generate(
    header: PathBuf,
    rows: u64,
    cols: u64,
    config: StoreConfig,
) -> Result<(), StoreError> {
    let start = Instant::now();
    let mut store = PyramidStore::<Rgb8>::new(rows, cols, config)?;
    for row in 0..rows {
        for col in 0..cols {
            store.set_pixel(row, col, gradient(row, col, rows, cols))?;
        }
    }
    let filled = start.elapsed();

    store.write(&header)?;
    println!(
        "Wrote {} ({}x{}, {} levels, {} scans) in {:?} (fill {:?})",
        header.display(),
        rows,
        cols,
        store.max_level() + 1,
        store.scan_count(),
        start.elapsed(),
        filled
    );
    Ok(())
}

fn handle_info(header: PathBuf) -> Result<(), StoreError> {
    let parsed = StoreHeader::read(&header)?;
    print!("{}", parsed.to_text());
    println!();
    for level in 0..=parsed.max_level() {
        println!("level {}: {}", level, parsed.extent.at_level(level));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_extract(
    header: PathBuf,
    level: u32,
    row: u64,
    col: u64,
    rows: u64,
    cols: u64,
    out: PathBuf,
    cache: usize,
) -> Result<(), StoreError> {
    let start = Instant::now();
    let mut reader = DiskReader::<Rgb8>::open_with_cache(&header, cache)?;
    let read = reader.get_range(level, row, col, rows, cols)?;
    bigimage::thumbnail::save_rgb8(&out, read.rect.rows, read.rect.cols, &read.pixels)?;

    let stats = reader.cache_stats();
    println!(
        "Extracted {}x{} at ({}, {}) of level {} to {} in {:?}",
        read.rect.rows,
        read.rect.cols,
        read.rect.row,
        read.rect.col,
        level,
        out.display(),
        start.elapsed()
    );
    println!(
        "Cache: {} hits, {} misses, {} evictions",
        stats.hits, stats.misses, stats.evictions
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let args = CliArgs::parse();

    let result = match args.command {
        Command::Generate {
            header,
            rows,
            cols,
            min_rows,
            min_cols,
            node_bytes,
            ways,
            scratch,
        } => {
            let mut config = StoreConfig::default()
                .with_min_size(min_rows, min_cols)
                .with_node_bytes(node_bytes);
            if let Some(ways) = ways {
                config = config.with_concurrent_levels(ways);
            }
            if let Some(scratch) = scratch {
                config = config.with_mapped_backing(scratch);
            }
            handle_generate(header, rows, cols, config)
        }
        Command::Info { header } => handle_info(header),
        Command::Extract {
            header,
            level,
            row,
            col,
            rows,
            cols,
            out,
            cache,
        } => handle_extract(header, level, row, col, rows, cols, out, cache),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
