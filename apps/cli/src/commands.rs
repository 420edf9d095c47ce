//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use apicatalog_core::{
    CancelSignal, ExportFilter, ExportFormat, LayerReport, Orchestrator, ProgressReporter,
    RunOptions, RunReport, parse_layer_selection, reconcile_catalog,
};
use apicatalog_shared::{
    AppConfig, CollectConfig, MAX_LAYER, MAX_PARALLEL_LAYERS, MIN_LAYER, expand_home, init_config,
    load_config,
};
use apicatalog_sources::SourceRegistry;
use apicatalog_storage::{CatalogStatistics, CatalogStore, StoredRecord};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// apicatalog: one deduplicated catalog of public web APIs.
#[derive(Parser)]
#[command(
    name = "apicatalog",
    version,
    about = "Collect public API descriptions from many catalogs into one deduplicated database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Catalog database path (overrides the config file).
    #[arg(long, global = true, env = "APICATALOG_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a collection cycle over the selected layers.
    Collect {
        /// Layers to collect: all, a comma list (1,3) or ranges (2-5).
        #[arg(short, long, default_value = "all")]
        layers: String,

        /// Export after collecting: json, csv, xlsx or all (comma-separated).
        #[arg(short, long)]
        export: Option<String>,

        /// Adapters to run at once (1 = sequential).
        #[arg(short, long)]
        parallel: Option<usize>,
    },

    /// Print catalog statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search names and descriptions.
    Search {
        /// Text to look for (case-insensitive).
        text: String,

        /// Maximum results.
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },

    /// List stored APIs, most recent first.
    List {
        /// Only this layer.
        #[arg(long)]
        layer: Option<u8>,

        /// Only categories containing this text.
        #[arg(long)]
        category: Option<String>,

        /// Maximum results.
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Delete invalid rows and stale rows sharing a URL.
    Cleanup,

    /// Collapse duplicate URLs across sources into canonical records.
    Reconcile,

    /// Export the catalog, or a filtered slice of it, to files.
    Export {
        /// Formats: json, csv, xlsx or all (comma-separated).
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output directory (defaults to the configured export_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Only categories containing this text.
        #[arg(long, conflicts_with_all = ["layer", "search"])]
        category: Option<String>,

        /// Only this layer.
        #[arg(long, conflicts_with = "search")]
        layer: Option<u8>,

        /// Only names or descriptions containing this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// Write a summary report: headline numbers, per-layer progress
    /// against targets, top categories and auth types.
    Report {
        /// Formats: json, csv or all (comma-separated).
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output directory (defaults to the configured export_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "apicatalog=info",
        1 => "apicatalog=debug",
        _ => "apicatalog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli { db, command, .. } = cli;
    if let Command::Config {
        action: ConfigAction::Init,
    } = command
    {
        return cmd_config_init().await;
    }

    let config = load_config()?;
    let db_path = db.unwrap_or_else(|| expand_home(&config.defaults.db_path));

    match command {
        Command::Collect {
            layers,
            export,
            parallel,
        } => cmd_collect(&config, &db_path, &layers, export.as_deref(), parallel).await,
        Command::Stats { json } => cmd_stats(&config, &db_path, json).await,
        Command::Search { text, limit } => cmd_search(&db_path, &text, limit).await,
        Command::List {
            layer,
            category,
            limit,
        } => cmd_list(&db_path, layer, category.as_deref(), limit).await,
        Command::Cleanup => cmd_cleanup(&db_path).await,
        Command::Reconcile => cmd_reconcile(&db_path).await,
        Command::Export {
            format,
            out,
            category,
            layer,
            search,
        } => {
            let filter = match (category, layer, search) {
                (Some(category), _, _) => Some(ExportFilter::Category(category)),
                (None, Some(layer), _) => Some(ExportFilter::Layer(layer)),
                (None, None, Some(text)) => Some(ExportFilter::Search(text)),
                (None, None, None) => None,
            };
            cmd_export(&config, &db_path, &format, out.as_deref(), filter.as_ref()).await
        }
        Command::Report { format, out } => {
            cmd_report(&config, &db_path, &format, out.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_collect(
    config: &AppConfig,
    db_path: &Path,
    layers: &str,
    export: Option<&str>,
    parallel: Option<usize>,
) -> Result<()> {
    // Everything that can be a configuration error is checked before work starts.
    let formats = export.map(ExportFormat::parse_list).transpose()?;

    let mut collect = CollectConfig::from(config);
    if let Some(n) = parallel {
        if n == 0 {
            return Err(eyre!("--parallel must be at least 1"));
        }
        collect.parallel_layers = n.min(MAX_PARALLEL_LAYERS);
    }

    let registry = SourceRegistry::with_builtin(&collect, &config.catalog_files)?;
    let selected = parse_layer_selection(layers, &registry.layers())?;

    let options = RunOptions {
        parallel_layers: collect.parallel_layers,
        top_categories: config.defaults.top_categories,
    };
    let cancel = CancelSignal::new();
    let orchestrator = Orchestrator::new(registry, options).with_cancel(cancel.clone());

    let store = CatalogStore::open(db_path).await?;
    info!(db = %db_path.display(), layers = ?selected, "collecting");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing running layers");
            cancel.cancel();
        }
    });

    let reporter = CliProgress::new();
    let report = orchestrator.run(&store, &selected, &reporter).await?;
    print_run_report(&report);

    if let Some(formats) = formats.filter(|f| !f.is_empty()) {
        let dir = expand_home(&config.defaults.export_dir);
        let summary =
            apicatalog_core::export(&store, &formats, &dir, config.defaults.top_categories).await?;
        for file in &summary.files {
            println!("  Exported {} APIs to {}", summary.total_apis, file.display());
        }
        println!();
    }

    Ok(())
}

async fn cmd_stats(config: &AppConfig, db_path: &Path, json: bool) -> Result<()> {
    let store = CatalogStore::open_readonly(db_path).await?;
    let stats = store.statistics(config.defaults.top_categories).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_statistics(&stats);
    }
    Ok(())
}

async fn cmd_search(db_path: &Path, text: &str, limit: u32) -> Result<()> {
    let store = CatalogStore::open_readonly(db_path).await?;
    let rows = store.search(text, limit).await?;
    info!(text, found = rows.len(), "search");
    print_records(&rows);
    Ok(())
}

async fn cmd_list(
    db_path: &Path,
    layer: Option<u8>,
    category: Option<&str>,
    limit: Option<u32>,
) -> Result<()> {
    if let Some(layer) = layer.filter(|l| !(MIN_LAYER..=MAX_LAYER).contains(l)) {
        return Err(eyre!("layer {layer} outside {MIN_LAYER}-{MAX_LAYER}"));
    }

    let store = CatalogStore::open_readonly(db_path).await?;
    let mut rows = match (layer, category) {
        (Some(layer), _) => store.by_layer(layer).await?,
        (None, Some(category)) => store.by_category_contains(category).await?,
        (None, None) => store.all(limit).await?,
    };
    if let (Some(layer), Some(category)) = (layer, category) {
        let needle = category.to_lowercase();
        rows.retain(|r| r.record.layer == layer && r.record.category.to_lowercase().contains(&needle));
    }
    if let Some(limit) = limit {
        rows.truncate(limit as usize);
    }
    print_records(&rows);
    Ok(())
}

async fn cmd_cleanup(db_path: &Path) -> Result<()> {
    let store = CatalogStore::open(db_path).await?;
    let report = store.cleanup().await?;

    println!();
    println!("  Cleanup complete");
    println!("  Empty URL:       {}", report.empty_url);
    println!("  Empty name:      {}", report.empty_name);
    println!("  Duplicate URLs:  {}", report.duplicate_urls);
    println!("  Total removed:   {}", report.total());
    println!();
    Ok(())
}

async fn cmd_reconcile(db_path: &Path) -> Result<()> {
    let store = CatalogStore::open(db_path).await?;
    let summary = reconcile_catalog(&store).await?;

    println!();
    println!("  Reconciliation complete");
    println!("  Examined:        {}", summary.examined);
    println!("  Groups merged:   {}", summary.groups_merged);
    println!("  Rows removed:    {}", summary.removed);
    println!("  Rows updated:    {}", summary.updated);
    println!();
    Ok(())
}

async fn cmd_export(
    config: &AppConfig,
    db_path: &Path,
    format: &str,
    out: Option<&Path>,
    filter: Option<&ExportFilter>,
) -> Result<()> {
    let formats = ExportFormat::parse_list(format)?;
    let dir = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| expand_home(&config.defaults.export_dir));
    let top = config.defaults.top_categories;

    let store = CatalogStore::open_readonly(db_path).await?;
    let summary = match filter {
        Some(filter) => apicatalog_core::export_filtered(&store, &formats, &dir, filter, top).await?,
        None => apicatalog_core::export(&store, &formats, &dir, top).await?,
    };

    for file in &summary.files {
        println!("Exported {} APIs to {}", summary.total_apis, file.display());
    }
    Ok(())
}

async fn cmd_report(
    config: &AppConfig,
    db_path: &Path,
    format: &str,
    out: Option<&Path>,
) -> Result<()> {
    let formats = ExportFormat::parse_list(format)?;
    let dir = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| expand_home(&config.defaults.export_dir));
    let registry = SourceRegistry::with_builtin(&CollectConfig::from(config), &config.catalog_files)?;

    let store = CatalogStore::open_readonly(db_path).await?;
    for format in formats {
        let path = apicatalog_core::export_summary_report(
            &store,
            &registry,
            format,
            &dir,
            config.defaults.top_categories,
        )
        .await?;
        println!("Wrote summary report to {}", path.display());
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_run_report(report: &RunReport) {
    println!();
    println!("  Run {}", report.run_id);
    println!(
        "  {:>5}  {:<24} {:<15} {:>9} {:>7} {:>6} {:>6} {:>7}",
        "Layer", "Source", "State", "Collected", "Unique", "Saved", "Target", "Done"
    );
    for l in &report.layers {
        println!(
            "  {:>5}  {:<24} {:<15} {:>9} {:>7} {:>6} {:>6} {:>6.1}%",
            l.layer,
            truncate(&l.name, 24),
            l.state.to_string(),
            l.collected,
            l.unique,
            l.saved,
            l.target,
            l.completion_pct
        );
    }

    let t = &report.totals;
    println!(
        "  {:>5}  {:<24} {:<15} {:>9} {:>7} {:>6} {:>6} {:>6.1}%",
        "", "Total", "", t.collected, t.unique, t.saved, t.target, t.completion_pct
    );
    println!();
    println!(
        "  Dropped: {}  Duplicates: {}  Rejected: {}  Failed writes: {}",
        t.dropped, t.duplicates, t.rejected, t.failed
    );

    let r = &report.reconciliation;
    match &r.error {
        Some(e) => println!("  Reconciliation failed: {e}"),
        None => println!(
            "  Reconciled {} rows: {} groups merged, {} removed, {} updated",
            r.examined, r.groups_merged, r.removed, r.updated
        ),
    }

    for l in report.failed_layers() {
        println!(
            "  FAILED layer {} ({}): {}",
            l.layer,
            l.name,
            l.error.as_deref().unwrap_or("unknown error")
        );
    }
    for l in report.layers.iter().filter(|l| !l.warnings.is_empty()) {
        println!("  Layer {} recovered from {} partial failures", l.layer, l.warnings.len());
    }
    if report.cancelled {
        let pending: Vec<String> = report
            .pending_layers()
            .iter()
            .map(|l| l.layer.to_string())
            .collect();
        println!("  Cancelled; not started: {}", pending.join(", "));
    }
    println!("  Time: {:.1}s", report.duration.as_secs_f64());
    println!();
}

fn print_statistics(stats: &CatalogStatistics) {
    println!();
    println!("  Total APIs:      {}", stats.total);
    println!("  Unique URLs:     {}", stats.unique_urls);
    println!("  Categories:      {}", stats.categories);
    println!("  Sources:         {}", stats.sources);
    println!("  Database size:   {:.1} KiB", stats.db_size_bytes as f64 / 1024.0);

    println!();
    println!("  By layer:");
    for (layer, count) in &stats.by_layer {
        println!("    {layer:>2}  {count}");
    }

    println!();
    println!("  Top categories:");
    for c in &stats.top_categories {
        println!("    {:<30} {}", truncate(&c.category, 30), c.count);
    }

    println!();
    println!("  Auth types:");
    for (auth, count) in &stats.auth_types {
        println!("    {:<30} {count}", truncate(auth, 30));
    }
    println!();
}

fn print_records(rows: &[StoredRecord]) {
    if rows.is_empty() {
        println!("No APIs found.");
        return;
    }
    for row in rows {
        let r = &row.record;
        println!(
            "[{:>2}] {} <{}>  {} / {}",
            r.layer,
            truncate(&r.name, 60),
            r.url,
            if r.category.is_empty() { "-" } else { r.category.as_str() },
            if r.source.is_empty() { "-" } else { r.source.as_str() },
        );
    }
    println!("{} result(s)", rows.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn layer_started(&self, layer: u8, name: &str) {
        self.spinner.set_message(format!("Layer {layer}: collecting from {name}"));
    }

    fn layer_finished(&self, report: &LayerReport) {
        self.spinner.println(format!(
            "  layer {:>2} {:<24} {} ({} saved)",
            report.layer,
            truncate(&report.name, 24),
            report.state,
            report.saved
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collect_flags() {
        let cli = Cli::try_parse_from([
            "apicatalog", "--db", "/tmp/c.db", "collect", "--layers", "1-3", "--export", "all", "-p", "2",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some(Path::new("/tmp/c.db")));
        match cli.command {
            Command::Collect {
                layers,
                export,
                parallel,
            } => {
                assert_eq!(layers, "1-3");
                assert_eq!(export.as_deref(), Some("all"));
                assert_eq!(parallel, Some(2));
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn export_filters_are_exclusive() {
        let cli = Cli::try_parse_from(["apicatalog", "export", "--layer", "3", "-f", "csv"]).unwrap();
        match cli.command {
            Command::Export { layer, format, category, .. } => {
                assert_eq!(layer, Some(3));
                assert_eq!(format, "csv");
                assert!(category.is_none());
            }
            _ => panic!("expected export"),
        }

        assert!(Cli::try_parse_from(["apicatalog", "export", "--category", "x", "--search", "y"]).is_err());
        assert!(Cli::try_parse_from(["apicatalog", "export", "--layer", "1", "--search", "y"]).is_err());
        assert!(Cli::try_parse_from(["apicatalog", "report", "--format", "csv"]).is_ok());
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
