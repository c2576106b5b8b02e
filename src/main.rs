//! fairchance - fair chance hiring survey
//!
//! Collects eligibility decisions for criminal offense categories, reports
//! aggregate statistics over the submissions and load-tests the backend.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, invalid input, etc.)
//!   2 - Load test thresholds breached

mod analysis;
mod catalog;
mod cli;
mod config;
mod error;
mod loadtest;
mod models;
mod report;
mod store;
mod terminal;
mod wizard;

use analysis::Dashboard;
use anyhow::{Context, Result};
use catalog::Catalog;
use cli::{Args, BatchesArgs, CollectArgs, Command, LoadTestArgs, OutputFormat, StatsArgs, Variant};
use config::{Config, CONFIG_FILE};
use report::StatsReport;
use store::{BatchStore, MemoryStore, RestStore};
use terminal::{HierarchicalOutcome, Input, ScriptedInput, StdinInput};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("fairchance v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .fairchance.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the backend URL, survey variant and load-test stages.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch a subcommand. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    match &args.command {
        Command::Collect(collect) => run_collect(&config, collect).await,
        Command::Stats(stats) => run_stats(&config, stats).await,
        Command::Batches(batches) => run_batches(&config, batches).await,
        Command::Catalog => {
            print_catalog(&Catalog::hierarchy());
            Ok(0)
        }
        Command::LoadTest(load) => run_load_test(&config, load, args.quiet).await,
        Command::InitConfig => Ok(0),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

fn rest_store(config: &Config) -> Result<RestStore> {
    if config.backend.api_key.is_empty() {
        warn!("No API key configured; set SUPABASE_ANON_KEY or [backend].api_key");
    }
    RestStore::new(config.rest_config()).context("Failed to create backend client")
}

async fn run_collect(config: &Config, args: &CollectArgs) -> Result<i32> {
    let store: Box<dyn BatchStore> = if args.offline {
        println!("📴 Offline mode: responses are kept in memory only.");
        Box::new(MemoryStore::new())
    } else {
        Box::new(rest_store(config)?)
    };

    match args.answers {
        Some(ref path) => {
            let mut input = ScriptedInput::from_file(path)
                .with_context(|| format!("Failed to read answers from {}", path.display()))?;
            let code = collect_with(&mut input, store.as_ref(), config, args).await?;
            if input.remaining() > 0 {
                warn!("{} scripted answers were not used", input.remaining());
            }
            Ok(code)
        }
        None => collect_with(&mut StdinInput, store.as_ref(), config, args).await,
    }
}

async fn collect_with<I: Input>(
    input: &mut I,
    store: &dyn BatchStore,
    config: &Config,
    args: &CollectArgs,
) -> Result<i32> {
    match config.survey.variant {
        Variant::Flat => {
            let offenses = Catalog::offense_list(config.survey.catalog);
            println!("📝 Fair chance hiring survey ({} offenses)", offenses.len());
            let id = terminal::run_flat(input, store, offenses).await?;
            println!("\n✅ Thank you! Your reference ID is {}", id);
        }
        Variant::Hierarchical => {
            println!("📝 Fair chance hiring survey");
            let outcome = terminal::run_hierarchical(
                input,
                store,
                Catalog::hierarchy(),
                args.username.clone(),
                config.survey.min_username_len,
            )
            .await?;
            match outcome {
                HierarchicalOutcome::Submitted(batch) => {
                    println!("\n✅ Thank you! Your reference ID is {}", batch.batch_id);
                }
                HierarchicalOutcome::AlreadyCompleted(batch) => {
                    println!("\nℹ️  Survey already completed ({})", batch.batch_id);
                }
            }
        }
    }
    Ok(0)
}

fn render_stats(dashboard: &Dashboard, format: OutputFormat) -> Result<String> {
    let report = StatsReport::new(dashboard.batches(), dashboard.offenses(), dashboard.stats());
    match format {
        OutputFormat::Json => report::generate_json_report(&report),
        OutputFormat::Markdown => Ok(report::generate_markdown_report(&report)),
    }
}

async fn run_stats(config: &Config, args: &StatsArgs) -> Result<i32> {
    let store = rest_store(config)?;
    let offenses = Catalog::offense_list(config.survey.catalog);
    let mut dashboard = Dashboard::with_limit(offenses, config.admin.recent_limit);

    let batches = store
        .recent(config.admin.recent_limit)
        .await
        .context("Failed to load recent submissions")?;
    info!("Loaded {} batches", batches.len());
    dashboard.load(batches);

    let output = render_stats(&dashboard, args.format)?;
    match args.output {
        Some(ref path) => {
            report::write_report(&output, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    if !args.watch {
        return Ok(0);
    }

    println!("👀 Watching for new submissions (Ctrl+C to stop)...");
    let mut updates = store
        .subscribe()
        .await
        .context("Failed to subscribe to new submissions")?;
    loop {
        tokio::select! {
            batch = updates.recv() => {
                let Some(batch) = batch else {
                    warn!("Submission feed closed");
                    break;
                };
                info!("New submission {}", batch.batch_id);
                dashboard.on_insert(batch);
                println!("{}", render_stats(&dashboard, args.format)?);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopped watching.");
                break;
            }
        }
    }

    Ok(0)
}

async fn run_batches(config: &Config, _args: &BatchesArgs) -> Result<i32> {
    let store = rest_store(config)?;
    let batches = store
        .recent(config.admin.recent_limit)
        .await
        .context("Failed to load recent submissions")?;
    print!("{}", report::generate_batch_list(&batches));
    Ok(0)
}

fn print_catalog(catalog: &Catalog) {
    for category in &catalog.categories {
        println!(
            "{} ({} groups)",
            category.name,
            catalog.total_groups(&category.name)
        );
        if !category.description.is_empty() {
            println!("  {}", category.description);
        }
        for group in &category.groups {
            println!(
                "  - {} ({})",
                group.name,
                catalog.total_offenses(&category.name, &group.name)
            );
            for offense in &group.offenses {
                println!("      - {}", offense);
            }
        }
    }
}

async fn run_load_test(config: &Config, args: &LoadTestArgs, quiet: bool) -> Result<i32> {
    if config.backend.api_key.is_empty() {
        warn!("No API key configured; requests will likely be rejected");
    }
    let load_config = config.load_test_config(args, !quiet);

    println!("🚀 Load testing {}", load_config.endpoint());
    let summary = loadtest::run(&load_config).await?;

    println!("\n📊 Load Test Summary:");
    println!("   Requests: {}", summary.requests);
    println!(
        "   Failed: {} ({:.2}%)",
        summary.failures,
        summary.failure_rate * 100.0
    );
    println!(
        "   Latency avg {:.0}ms | p50 {:.0}ms | p95 {:.0}ms | p99 {:.0}ms | max {:.0}ms",
        summary.avg_latency_ms,
        summary.p50_latency_ms,
        summary.p95_latency_ms,
        summary.p99_latency_ms,
        summary.max_latency_ms
    );

    if !summary.passed(&load_config.thresholds) {
        for breach in summary.breaches(&load_config.thresholds) {
            eprintln!("   ⛔ {}", breach);
        }
        eprintln!("\n⛔ Thresholds breached. Failing (exit code 2).");
        return Ok(2);
    }

    println!("\n✅ All thresholds passed.");
    Ok(0)
}
