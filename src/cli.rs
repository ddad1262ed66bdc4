use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover the category taxonomy and persist it.
    Taxonomy(TaxonomyArgs),
    /// Import books for every stored category and reconcile counts.
    Import(ImportArgs),
    /// Recompute per-category book counts from stored books.
    Reconcile(ReconcileArgs),
    /// Taxonomy, then import, then reconcile.
    Run(RunArgs),
    /// Serve the catalog read API.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct TaxonomyArgs {
    /// Data directory for the catalog store.
    #[arg(long, default_value = "catalog-data")]
    pub data_dir: PathBuf,

    /// Root keyword whose browse-node taxonomy seeds the categories.
    #[arg(long, default_value = "Books")]
    pub root_keyword: String,

    /// Delay after each node processed (politeness).
    #[arg(long, default_value_t = 1200)]
    pub delay_ms: u64,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Data directory for the catalog store.
    #[arg(long, default_value = "catalog-data")]
    pub data_dir: PathBuf,

    /// Delay after each item saved (politeness).
    #[arg(long, default_value_t = 1200)]
    pub delay_ms: u64,

    /// Hard cap on search pages fetched per keyword.
    #[arg(long, default_value_t = 10)]
    pub max_pages: u64,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Data directory for the catalog store.
    #[arg(long, default_value = "catalog-data")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Data directory for the catalog store.
    #[arg(long, default_value = "catalog-data")]
    pub data_dir: PathBuf,

    /// Root keyword whose browse-node taxonomy seeds the categories.
    #[arg(long, default_value = "Books")]
    pub root_keyword: String,

    /// Delay after each external unit of work (politeness).
    #[arg(long, default_value_t = 1200)]
    pub delay_ms: u64,

    /// Hard cap on search pages fetched per keyword.
    #[arg(long, default_value_t = 10)]
    pub max_pages: u64,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Data directory for the catalog store.
    #[arg(long, default_value = "catalog-data")]
    pub data_dir: PathBuf,

    /// Listen address for the read API.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,
}
