//! CLI for checkfetch.

mod commands;

use anyhow::Result;
use checkfetch_core::checksum::Algorithm;
use checkfetch_core::config;
use checkfetch_core::strategy::DiskCacheStrategy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_cache_clear, run_cache_info, run_digest, run_fetch, FetchRequest};

/// Top-level CLI for checkfetch.
#[derive(Debug, Parser)]
#[command(name = "checkfetch")]
#[command(about = "checkfetch: integrity-verified HTTP fetch with a verifying disk cache", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a URL, verifying its bytes against the checksum in its query string.
    Fetch {
        /// HTTP/HTTPS URL, e.g. https://host/file?md5=<hex>.
        url: String,

        /// Query parameter holding the checksum (default from config, "md5").
        #[arg(long)]
        param: Option<String>,

        /// Extra request header, sent on every redirect hop. Repeatable.
        #[arg(long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Disk cache strategy: automatic, all, data, resource or none.
        #[arg(long)]
        strategy: Option<DiskCacheStrategy>,

        /// Write the bytes here instead of printing a summary.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Do not read or write the disk cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the digest of a local file.
    Digest {
        /// Path to the file.
        path: PathBuf,

        /// md5 or sha256.
        #[arg(long, default_value = "md5")]
        algorithm: Algorithm,
    },

    /// Show disk cache location, entry count and size.
    CacheInfo,

    /// Delete every disk cache entry.
    CacheClear,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    checkfetch_core::locator::Headers::parse_line(s)
        .ok_or_else(|| format!("expected 'Name: value', got {s:?}"))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                url,
                param,
                headers,
                strategy,
                output,
                no_cache,
            } => {
                let request = FetchRequest {
                    url,
                    param,
                    headers,
                    strategy,
                    output,
                    no_cache,
                };
                run_fetch(&cfg, request).await?
            }
            CliCommand::Digest { path, algorithm } => run_digest(&path, algorithm).await?,
            CliCommand::CacheInfo => run_cache_info(&cfg).await?,
            CliCommand::CacheClear => run_cache_clear(&cfg).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
