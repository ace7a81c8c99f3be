//! image-defaults - disk-backed image cache with background refresh
//!
//! Loads images from the local cache first and refreshes them from their
//! source URL when asked to, keeping the cache up to date.

mod config;
mod error;

use crate::config::ImageDefaultsConfig;
use crate::error::{ImageDefaultsError, Result};
use cached_image::{
    HttpFetcher, ImageDefaults, LoadOutcome, QueueContext, RefreshOutcome, RefreshPolicy,
};
use clap::{Parser, Subcommand};
use file_blob_cache::{BlobStore, TracingSink};
use image::{DynamicImage, GenericImageView};
use image_codec::JpegCodec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "image-defaults", version, about = "Disk-backed image cache")]
struct Cli {
    /// Cache directory (defaults to IMAGE_CACHE_DIR or the documents directory)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JPEG quality used when storing images (1-100)
    #[arg(long, global = true)]
    quality: Option<u8>,

    /// How overlapping refreshes are resolved
    #[arg(long, global = true)]
    policy: Option<RefreshPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the cached image stored under a key
    Get {
        key: String,
        /// Also write the image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load an image by URL, downloading it when it is not cached
    Load {
        url: String,
        /// Download a fresh copy even when the image is cached
        #[arg(long)]
        refresh: bool,
        /// Write each image shown to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store an image file under a key
    Set { key: String, file: PathBuf },
    /// Remove the image stored under a key
    Remove { key: String },
    /// Remove all cached images
    Clear,
    /// List cached entries
    List {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("image_defaults=info".parse()?);

    // Use JSON format for structured log collection when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let cli = Cli::parse();
    let config = apply_flags(ImageDefaultsConfig::from_env()?, &cli);
    info!(cache_dir = ?config.cache_dir, policy = %config.refresh_policy, "Using image cache");

    let cache = Arc::new(build_cache(&config)?);
    run(&cache, cli.command).await
}

fn apply_flags(mut config: ImageDefaultsConfig, cli: &Cli) -> ImageDefaultsConfig {
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(quality) = cli.quality {
        config.jpeg_quality = quality;
    }
    if let Some(policy) = cli.policy {
        config.refresh_policy = policy;
    }
    config
}

fn build_cache(config: &ImageDefaultsConfig) -> Result<ImageDefaults> {
    let store = BlobStore::new(config.cache_dir.clone(), Arc::new(TracingSink));
    let codec = JpegCodec::with_quality(config.jpeg_quality)?;
    let http = HttpFetcher::with_config(
        Duration::from_secs(config.fetch_timeout_secs),
        &config.user_agent,
    )?;

    Ok(ImageDefaults::new(store, codec, Handle::current())
        .with_policy(config.refresh_policy)
        .with_http(http))
}

async fn run(cache: &Arc<ImageDefaults>, command: Command) -> Result<()> {
    match command {
        Command::Get { key, output } => match cache.image(&key) {
            Some(image) => show(&image, "cached", output.as_ref()),
            None => println!("No image cached under '{}'", key),
        },
        Command::Load {
            url,
            refresh,
            output,
        } => load(cache, &url, refresh, output).await?,
        Command::Set { key, file } => {
            let image = image::open(&file)?;
            cache.set_image(&image, &key)?;
            println!("Stored {} under '{}'", file.display(), key);
        }
        Command::Remove { key } => {
            if cache.remove_image(&key)? {
                println!("Removed '{}'", key);
            } else {
                println!("Nothing cached under '{}'", key);
            }
        }
        Command::Clear => {
            let count = cache.remove_images()?;
            println!("Removed {} cached images", count);
        }
        Command::List { json } => {
            let entries = cache.store().entries()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!(
                        "{}\t{} bytes\t{}",
                        entry.key,
                        entry.size,
                        entry.modified.to_rfc3339()
                    );
                }
                let stats = cache.stats()?;
                println!("{} entries, {} bytes", stats.entries, stats.total_size);
            }
        }
    }

    Ok(())
}

/// Drive one slot the way an image view would: show the cached copy first,
/// then whatever the refresh delivers.
async fn load(
    cache: &Arc<ImageDefaults>,
    url: &str,
    refresh: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let (context, mut context_loop) = QueueContext::channel();
    let label = if refresh { "refreshed" } else { "downloaded" };
    let mut shown = 0usize;

    let slot = cache.slot(
        move |image: DynamicImage| show(&image, "loaded", output.as_ref()),
        context,
    );

    let outcome = slot.load_with_url_key(url, refresh);
    if let LoadOutcome::EmptyKey = outcome {
        return Err(ImageDefaultsError::Config("URL cannot be empty".to_string()));
    }
    if outcome.is_hit() {
        info!(url, "Loaded image from cache");
    }
    shown += context_loop.run_pending();

    if let Some(handle) = outcome.refresh() {
        match handle.wait().await {
            RefreshOutcome::Updated { stored } => {
                if !stored {
                    warn!(url, "Image {} but could not be saved to the cache", label);
                }
            }
            RefreshOutcome::Failed(e) => {
                error!(url, error = %e, "Failed to fetch image");
                if shown == 0 {
                    return Err(e.into());
                }
            }
            RefreshOutcome::Superseded => {}
        }
        shown += context_loop.run_pending();
    }

    let hit_rate = cache.stats()?.hit_rate().unwrap_or(0.0);
    info!(url, updates = shown, hit_rate, "Done");
    Ok(())
}

fn show(image: &DynamicImage, label: &str, output: Option<&PathBuf>) {
    let (width, height) = image.dimensions();
    println!("{}: {}x{} {:?}", label, width, height, image.color());

    if let Some(path) = output {
        if let Err(e) = image.save(path) {
            error!(path = ?path, error = %e, "Failed to write image");
        }
    }
}
