//! liveconf — hot-reloading configuration plane
//!
//! This binary wires the library's pieces together as a thin driver: it
//! validates plane configuration and can run a generic watch-and-digest
//! loop against a path template. Domain-specific segment content (what a
//! geoip table or a URL preference list actually looks like) is owned by
//! whatever service embeds this crate as a library, not by this binary.

use clap::{Parser, Subcommand};
use confplane::error::Result;
use confplane::loader::{ConfLoader, Digest};
use confplane::segment::{SegmentDispatcher, SegmentLoader, SegmentedConf};
use confplane::watch::SegmentWatcher;
use confplane::{PlaneConfig, Snapshot};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "confplane")]
#[command(about = "Hot-reloading configuration plane", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CONFPLANE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plane configuration file
    Validate {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Watch a %u-templated directory and keep a digest of every segment
    /// that loads, logging every reload cycle. Demonstrates the watcher
    /// / dispatcher / snapshot / digest-store pipeline end to end without
    /// committing to any particular segment content format.
    Watch {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Path template relative to the config's root-directory
        #[arg(long)]
        pattern: String,
    },
}

struct RawDigestLoader;

impl SegmentLoader for RawDigestLoader {
    type Value = Digest;

    fn load(&self, loader: &mut ConfLoader) -> Result<Digest> {
        loader.read_whole_file()?;
        Ok(loader.digest())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    info!("confplane v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Validate { config } => {
            match PlaneConfig::from_file(&config) {
                Ok(_) => {
                    println!("configuration valid");
                },
                Err(e) => {
                    eprintln!("configuration error: {e}");
                    std::process::exit(1);
                },
            }
        },

        Commands::Watch { config, pattern } => {
            let plane_config = PlaneConfig::from_file(&config)?;
            run_watch(plane_config, &pattern).await?;
        },
    }

    Ok(())
}

async fn run_watch(plane_config: PlaneConfig, pattern: &str) -> anyhow::Result<()> {
    let mut watcher = SegmentWatcher::new(&plane_config.root_directory, pattern, plane_config.segment.retry_sec)?;
    let mut dispatcher = SegmentDispatcher::new(RawDigestLoader, plane_config.segment.retry_sec);
    let digest_store = confplane::digest_store::DigestStore::new(
        plane_config.digest_store.dir.clone(),
        plane_config.digest_store.max_age_sec,
    );

    let snapshot: Snapshot<SegmentedConf<Digest>> = Snapshot::new(SegmentedConf::default());
    let mut interval = tokio::time::interval(Duration::from_secs(plane_config.digest_store.update_freq_sec));

    loop {
        interval.tick().await;

        if watcher.is_changed() {
            let current = snapshot.acquire();
            let next = dispatcher.reload(&mut watcher, &current);
            let generation = snapshot.publish(next);
            info!(generation, "published new snapshot");
        }

        let current = snapshot.acquire();
        let entries: Vec<(u32, Digest)> = current
            .iter()
            .filter(|slot| slot.loaded())
            .filter_map(|slot| slot.value.as_ref().map(|d| (slot.id, **d)))
            .collect();
        digest_store.write("watch", &entries)?;
        digest_store.gc()?;
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
