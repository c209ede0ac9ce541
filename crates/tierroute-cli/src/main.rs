//! TierRoute CLI
//!
//! Command-line interface for validating, probing and running TierRoute

mod serve;
mod wiring;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tierroute_core::{RequestContext, RouteKey};
use tierroute_observability::init_logging;
use tierroute_storage::{FsObjectStore, ObjectStorage};

#[derive(Parser)]
#[command(name = "tierroute")]
#[command(about = "TierRoute - primary/replica connection router with breaker failover", long_about = None)]
struct Cli {
    /// Path to the configuration file (YAML, or TOML by extension)
    #[arg(
        short,
        long,
        global = true,
        env = "TIERROUTE_CONFIG",
        default_value = "~/.tierroute/config.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the effective settings
    Check {
        /// Print the effective configuration as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run connection attempts through the router
    Probe {
        /// Number of attempts
        #[arg(long, default_value = "1")]
        count: u32,

        /// Route to request
        #[arg(long, default_value = "primary")]
        route: RouteKey,

        /// Pin attempts to the exact route
        #[arg(long)]
        no_fallback: bool,

        /// Pause between attempts in milliseconds
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },
    /// Start health endpoints, probe the primary and hot-reload failover settings
    Serve,
    /// Inspect the object store
    Objects {
        #[command(subcommand)]
        command: ObjectsCommand,
    },
}

#[derive(Subcommand)]
enum ObjectsCommand {
    /// List objects in a bucket
    List {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Check whether a prefix holds a non-empty marker object
    Exists {
        bucket: String,
        prefix: String,
        /// Override the configured marker suffix
        #[arg(long)]
        suffix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in the config path
    let config_path = PathBuf::from(shellexpand::tilde(&cli.config.to_string_lossy()).to_string());

    match cli.command {
        Commands::Check { json } => check(&config_path, json),
        Commands::Probe {
            count,
            route,
            no_fallback,
            interval_ms,
        } => {
            let config = wiring::load_config(&config_path)?;
            init_logging(&config.logging)?;

            let router = wiring::build_router(&config, None)?;
            let ctx = RequestContext::new(route).with_fallback(!no_fallback);

            let mut failures = 0;
            for attempt in 1..=count {
                match router.get_connection(&ctx).await {
                    Ok(routed) => println!(
                        "attempt {}: served by {} ({})",
                        attempt,
                        routed.served_by(),
                        routed.mode()
                    ),
                    Err(e) => {
                        failures += 1;
                        println!("attempt {}: failed: {}", attempt, e);
                    }
                }

                if interval_ms > 0 && attempt < count {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }

            println!(
                "{} of {} attempts failed, primary blocked: {}",
                failures,
                count,
                router.is_primary_blocked()
            );
            if failures == count && count > 0 {
                anyhow::bail!("every connection attempt failed");
            }
            Ok(())
        }
        Commands::Serve => serve::run(&config_path).await,
        Commands::Objects { command } => {
            let config = wiring::load_config(&config_path)?;
            let root = config.storage.root_path()?;
            let storage = ObjectStorage::new(FsObjectStore::new(root))
                .with_marker_suffix(config.storage.marker_suffix.clone());

            match command {
                ObjectsCommand::List { bucket, prefix } => {
                    for object in storage.list(&bucket, prefix.as_deref()).await? {
                        println!(
                            "{}\t{}\t{}",
                            object.last_modified.to_rfc3339(),
                            object.size,
                            object.key
                        );
                    }
                }
                ObjectsCommand::Exists {
                    bucket,
                    prefix,
                    suffix,
                } => {
                    let exists = match suffix {
                        Some(suffix) => {
                            storage
                                .exists_with_suffix(&bucket, &prefix, &suffix)
                                .await?
                        }
                        None => storage.exists(&bucket, &prefix).await?,
                    };
                    println!("{}", exists);
                }
            }
            Ok(())
        }
    }
}

fn check(config_path: &std::path::Path, json: bool) -> anyhow::Result<()> {
    let mut config = tierroute_config_file::TierrouteConfig::from_file(config_path)?;
    config.merge_env();

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("  - {}", error);
        }
        anyhow::bail!("{} configuration problem(s) in {:?}", errors.len(), config_path);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Configuration {:?} is valid", config_path);
    println!(
        "  failover: threshold={} block={}ms fallback={}",
        config.failover.failure_threshold,
        config.failover.block_duration_ms,
        config
            .failover
            .fallback_routes
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );
    if !config.failover.breaker_enabled() {
        println!("  breaker disabled (threshold <= 0)");
    }
    for (route, target) in &config.targets {
        println!(
            "  target {}: {} (timeout {}ms)",
            route, target.address, target.connect_timeout_ms
        );
    }
    println!(
        "  health: enabled={} bind={} probe every {}s",
        config.health.enabled, config.health.bind_address, config.health.probe_interval_secs
    );
    Ok(())
}
