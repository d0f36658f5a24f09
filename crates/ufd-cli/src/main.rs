//! 🚀 ufd — the front door of unifeed.
//!
//! 🎬 *[narrator voice]* "Somewhere, a cron job fires. It calls `ufd ingest`. It does not wait
//! for applause."
//! 📦 Thin wrapper: parse args, set up logging, load config, run, print the receipt.
//! All the heavy lifting lives in the `ufd` library crate. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ufd", version, about = "🚰 Stream big JSON arrays from HTTP sources into one store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest every configured source once and print a summary.
    Ingest {
        /// TOML config file. Without it, config comes from UFD_* env vars only.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Print the receipt, or peel the error onion and exit 1
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let Command::Ingest { config } = cli.command;

    // 🔒 Check the file exists before we get too emotionally attached
    if let Some(path) = &config {
        let exists = path.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether the configuration file exists. If it's a relative path, \
                 try an absolute one. Was checking here: '{}'",
                path.display()
            )
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Configuration file not found at '{}'. Double check the path, or drop \
                 --config and use UFD_* env vars instead.",
                path.display()
            );
        }
    }

    // 🔧 someone always puts a tab where a space should be (looking at you, Kevin)
    let app_config = ufd::app_config::load_config(config.as_deref())
        .context("💀 In ufd, main, we couldn't load the config. Take a look at the file and the UFD_* env vars")?;

    match ufd::run(app_config).await {
        Ok(summary) => {
            // ✅ per-source failures are in the table, not in the exit code
            println!("{}", ufd::progress::summary_table(&summary));
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like the store isn't reachable. \
                    Double-check that Elasticsearch is actually running. If you're using Docker, try \
                    `docker ps` to see what's up, or `docker compose up -d` to resurrect it. \
                    Or drop the [store] section for an in-memory dry run. ☕"
                );
            }

            // 🗑️ Exit with prejudice.
            std::process::exit(1);
        }
    }
}
