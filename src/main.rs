use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;

use bookdex::cli::{Cli, Command, ImportArgs, ReconcileArgs, RunArgs, TaxonomyArgs};
use bookdex::config::SourceConfig;
use bookdex::import::ImportPolicy;
use bookdex::paapi::PaapiClient;
use bookdex::store::CatalogStore;
use bookdex::throttle::FixedDelay;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookdex::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Taxonomy(args) => run_taxonomy(args).await.context("taxonomy")?,
        Command::Import(args) => run_import(args).await.context("import")?,
        Command::Reconcile(args) => run_reconcile(args).context("reconcile")?,
        Command::Run(args) => run_pipeline(args).await.context("run")?,
        Command::Serve(args) => bookdex::server::run(args).await.context("serve")?,
    }

    Ok(())
}

async fn run_taxonomy(args: TaxonomyArgs) -> anyhow::Result<()> {
    let source = PaapiClient::new(SourceConfig::from_env()?)?;
    let store = CatalogStore::open(&args.data_dir)?;
    let throttle = FixedDelay::new(Duration::from_millis(args.delay_ms));

    let saved =
        bookdex::taxonomy::import_taxonomy(&source, &store, &throttle, &args.root_keyword).await?;
    tracing::info!(saved, "taxonomy import finished");
    Ok(())
}

async fn run_import(args: ImportArgs) -> anyhow::Result<()> {
    let source = PaapiClient::new(SourceConfig::from_env()?)?;
    let store = CatalogStore::open(&args.data_dir)?;
    let throttle = FixedDelay::new(Duration::from_millis(args.delay_ms));
    let policy = ImportPolicy {
        max_pages_per_keyword: args.max_pages,
    };

    let stats = bookdex::import::import_all(&source, &store, &throttle, policy).await?;
    tracing::info!(saved = stats.saved, skipped = stats.skipped, "book import finished");
    Ok(())
}

fn run_reconcile(args: ReconcileArgs) -> anyhow::Result<()> {
    let store = CatalogStore::open(&args.data_dir)?;
    bookdex::reconcile::reconcile_all(&store)?;
    tracing::info!("reconciliation finished");
    Ok(())
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let source = PaapiClient::new(SourceConfig::from_env()?)?;
    let store = CatalogStore::open(&args.data_dir)?;
    let throttle = FixedDelay::new(Duration::from_millis(args.delay_ms));
    let policy = ImportPolicy {
        max_pages_per_keyword: args.max_pages,
    };

    let saved =
        bookdex::taxonomy::import_taxonomy(&source, &store, &throttle, &args.root_keyword).await?;
    tracing::info!(saved, "taxonomy import finished");

    let stats = bookdex::import::import_all(&source, &store, &throttle, policy).await?;
    tracing::info!(saved = stats.saved, skipped = stats.skipped, "book import finished");
    Ok(())
}
