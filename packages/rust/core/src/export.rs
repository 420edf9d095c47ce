//! Catalog export to JSON and CSV files.
//!
//! Three exports: the whole catalog, a filtered slice of it, and a summary
//! report of per-layer progress. All read through the store's public read
//! API only, so they work on a read-only handle and may run while a
//! collection cycle is active.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use apicatalog_shared::{CatalogError, Result, is_valid_layer};
use apicatalog_sources::SourceRegistry;
use apicatalog_storage::{CatalogStatistics, CatalogStore, CategoryCount, StoredRecord};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, instrument};

const EXPORT_VERSION: &str = "1.0";
const CSV_COLUMNS: [&str; 9] = [
    "name", "desc", "url", "source", "category", "auth", "region", "layer", "timestamp",
];

/// Supported export file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Parse a selector such as `"json"`, `"json,csv"` or `"all"`.
    ///
    /// `xlsx` is recognised but not supported by this build; like any unknown
    /// format it is a configuration error, raised before any work starts.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        let mut formats = Vec::new();
        for part in input.split(',').map(|p| p.trim().to_ascii_lowercase()) {
            let parsed: &[Self] = match part.as_str() {
                "json" => &[Self::Json],
                "csv" => &[Self::Csv],
                "all" => &[Self::Json, Self::Csv],
                "xlsx" => {
                    return Err(CatalogError::config(
                        "xlsx export is not supported in this build (use json or csv)",
                    ));
                }
                other => {
                    return Err(CatalogError::config(format!(
                        "unknown export format '{other}' (expected json, csv, xlsx or all)"
                    )));
                }
            };
            for format in parsed {
                if !formats.contains(format) {
                    formats.push(*format);
                }
            }
        }
        Ok(formats)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which rows [`export_filtered`] keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFilter {
    /// Category contains the text (case-insensitive).
    Category(String),
    /// Exactly this layer.
    Layer(u8),
    /// Name or description contains the text (case-insensitive).
    Search(String),
}

impl ExportFilter {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Category(text) | Self::Search(text) if text.trim().is_empty() => {
                Err(CatalogError::config("export filter text must not be empty"))
            }
            Self::Layer(layer) if !is_valid_layer(*layer) => {
                Err(CatalogError::config(format!("export filter layer {layer} is out of range")))
            }
            _ => Ok(()),
        }
    }

    /// File name fragment, e.g. `category_AI_ML`.
    fn label(&self) -> String {
        let (key, value) = match self {
            Self::Category(text) => ("category", text.trim().to_string()),
            Self::Layer(layer) => ("layer", layer.to_string()),
            Self::Search(text) => ("search", text.trim().to_string()),
        };
        let value: String = value
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{key}_{value}")
    }

    async fn select(&self, store: &CatalogStore) -> Result<Vec<StoredRecord>> {
        match self {
            Self::Category(text) => store.by_category_contains(text.trim()).await,
            Self::Layer(layer) => store.by_layer(*layer).await,
            Self::Search(text) => store.search(text.trim(), u32::MAX).await,
        }
    }
}

impl fmt::Display for ExportFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(text) => write!(f, "category={text}"),
            Self::Layer(layer) => write!(f, "layer={layer}"),
            Self::Search(text) => write!(f, "search={text}"),
        }
    }
}

/// Files written by [`export`] or [`export_filtered`].
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    /// Records in each file.
    pub total_apis: usize,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    metadata: JsonExportMeta<'a>,
    apis: &'a [StoredRecord],
}

#[derive(Serialize)]
struct JsonExportMeta<'a> {
    exported_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    total_apis: usize,
    statistics: &'a CatalogStatistics,
    format: &'static str,
    version: &'static str,
}

/// Export the whole catalog, most recent first, as `all_apis_<timestamp>.<ext>`
/// files under `dir` (created if missing).
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn export(
    store: &CatalogStore,
    formats: &[ExportFormat],
    dir: &Path,
    top_categories: usize,
) -> Result<ExportSummary> {
    let records = store.all(None).await?;
    write_records(store, &records, formats, dir, "all_apis", None, top_categories).await
}

/// Export the rows matching `filter` as
/// `filtered_apis_<filter>_<timestamp>.<ext>` files under `dir`.
///
/// The JSON `statistics` block still describes the whole catalog.
#[instrument(skip_all, fields(dir = %dir.display(), %filter))]
pub async fn export_filtered(
    store: &CatalogStore,
    formats: &[ExportFormat],
    dir: &Path,
    filter: &ExportFilter,
    top_categories: usize,
) -> Result<ExportSummary> {
    filter.validate()?;
    let records = filter.select(store).await?;
    let prefix = format!("filtered_apis_{}", filter.label());
    let label = filter.to_string();
    write_records(store, &records, formats, dir, &prefix, Some(label), top_categories).await
}

async fn write_records(
    store: &CatalogStore,
    records: &[StoredRecord],
    formats: &[ExportFormat],
    dir: &Path,
    prefix: &str,
    filter: Option<String>,
    top_categories: usize,
) -> Result<ExportSummary> {
    std::fs::create_dir_all(dir).map_err(|e| CatalogError::io(dir, e))?;

    let stamp = timestamp();
    let mut summary = ExportSummary {
        total_apis: records.len(),
        ..ExportSummary::default()
    };

    for format in formats {
        let path = dir.join(format!("{prefix}_{stamp}.{}", format.extension()));
        let contents = match format {
            ExportFormat::Json => {
                let statistics = store.statistics(top_categories).await?;
                render_json(records, &statistics, filter.clone())?
            }
            ExportFormat::Csv => render_csv(records),
        };
        std::fs::write(&path, contents).map_err(|e| CatalogError::io(&path, e))?;
        info!(path = %path.display(), %format, records = records.len(), "catalog exported");
        summary.files.push(path);
    }

    Ok(summary)
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn render_json(
    records: &[StoredRecord],
    statistics: &CatalogStatistics,
    filter: Option<String>,
) -> Result<String> {
    let document = JsonExport {
        metadata: JsonExportMeta {
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            filter,
            total_apis: records.len(),
            statistics,
            format: "json",
            version: EXPORT_VERSION,
        },
        apis: records,
    };
    serde_json::to_string_pretty(&document)
        .map_err(|e| CatalogError::parse(format!("failed to serialize export: {e}")))
}

fn render_csv(records: &[StoredRecord]) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push_str("\r\n");
    for stored in records {
        let r = &stored.record;
        let timestamp = stored.written_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let layer = r.layer.to_string();
        let fields = [
            r.name.as_str(),
            r.description.as_str(),
            r.url.as_str(),
            r.source.as_str(),
            r.category.as_str(),
            r.auth_method.as_str(),
            r.region.as_str(),
            layer.as_str(),
            timestamp.as_str(),
        ];
        push_csv_row(&mut out, &fields);
    }
    out
}

fn push_csv_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_csv_field(out, field);
    }
    out.push_str("\r\n");
}

// ---------------------------------------------------------------------------
// Summary report
// ---------------------------------------------------------------------------

/// Progress label for one layer's completion percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Complete,
    InProgress,
    Starting,
}

impl LayerStatus {
    fn from_completion(pct: f64) -> Self {
        if pct >= 100.0 {
            Self::Complete
        } else if pct > 50.0 {
            Self::InProgress
        } else {
            Self::Starting
        }
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "Complete",
            Self::InProgress => "In Progress",
            Self::Starting => "Starting",
        })
    }
}

/// Headline catalog numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutiveSummary {
    pub total_apis: u64,
    pub unique_urls: u64,
    pub categories: u64,
    pub sources: u64,
    pub database_size_mb: f64,
}

/// Stored rows against the adapter target for one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerPerformance {
    pub layer: u8,
    pub description: String,
    pub target: usize,
    pub collected: u64,
    pub completion_pct: f64,
    pub status: LayerStatus,
}

/// Catalog-wide progress report written by [`export_summary_report`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub generated_at: String,
    pub executive: ExecutiveSummary,
    pub layers: Vec<LayerPerformance>,
    pub top_categories: Vec<CategoryCount>,
    pub auth_types: BTreeMap<String, u64>,
}

impl SummaryReport {
    /// Build from store statistics. Covers every registered layer plus any
    /// layer that has rows but no adapter (target 0).
    pub fn build(statistics: &CatalogStatistics, registry: &SourceRegistry) -> Self {
        let layers: BTreeSet<u8> = registry
            .layers()
            .into_iter()
            .chain(statistics.by_layer.keys().copied())
            .collect();

        let layers = layers
            .into_iter()
            .map(|layer| {
                let adapter = registry.get(layer);
                let target = adapter.map_or(0, |a| a.target_count());
                let collected = statistics.by_layer.get(&layer).copied().unwrap_or(0);
                let completion_pct = if target == 0 {
                    0.0
                } else {
                    round_to(collected as f64 / target as f64 * 100.0, 1)
                };
                LayerPerformance {
                    layer,
                    description: adapter.map_or_else(|| format!("Layer {layer}"), |a| a.name().to_string()),
                    target,
                    collected,
                    completion_pct,
                    status: LayerStatus::from_completion(completion_pct),
                }
            })
            .collect();

        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            executive: ExecutiveSummary {
                total_apis: statistics.total,
                unique_urls: statistics.unique_urls,
                categories: statistics.categories,
                sources: statistics.sources,
                database_size_mb: round_to(statistics.db_size_bytes as f64 / (1024.0 * 1024.0), 2),
            },
            layers,
            top_categories: statistics.top_categories.clone(),
            auth_types: statistics.auth_types.clone(),
        }
    }

    fn render_csv(&self) -> String {
        let mut out = String::new();
        let e = &self.executive;
        push_csv_row(&mut out, &["metric", "value"]);
        for (metric, value) in [
            ("Total APIs Collected", e.total_apis.to_string()),
            ("Unique URLs", e.unique_urls.to_string()),
            ("Categories", e.categories.to_string()),
            ("Data Sources", e.sources.to_string()),
            ("Database Size (MB)", format!("{:.2}", e.database_size_mb)),
            ("Generated At", self.generated_at.clone()),
        ] {
            push_csv_row(&mut out, &[metric, &value]);
        }

        out.push_str("\r\n");
        push_csv_row(&mut out, &["layer", "description", "target", "collected", "completion_pct", "status"]);
        for l in &self.layers {
            push_csv_row(
                &mut out,
                &[
                    &l.layer.to_string(),
                    &l.description,
                    &l.target.to_string(),
                    &l.collected.to_string(),
                    &format!("{:.1}", l.completion_pct),
                    &l.status.to_string(),
                ],
            );
        }

        out.push_str("\r\n");
        push_csv_row(&mut out, &["category", "count"]);
        for c in &self.top_categories {
            push_csv_row(&mut out, &[&c.category, &c.count.to_string()]);
        }

        out.push_str("\r\n");
        push_csv_row(&mut out, &["auth_type", "count"]);
        for (auth, count) in &self.auth_types {
            push_csv_row(&mut out, &[auth, &count.to_string()]);
        }
        out
    }
}

/// Write a [`SummaryReport`] as `api_collection_report_<timestamp>.<ext>`.
/// CSV output holds one header-led section per table, separated by a blank line.
#[instrument(skip_all, fields(dir = %dir.display(), %format))]
pub async fn export_summary_report(
    store: &CatalogStore,
    registry: &SourceRegistry,
    format: ExportFormat,
    dir: &Path,
    top_categories: usize,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CatalogError::io(dir, e))?;

    let statistics = store.statistics(top_categories).await?;
    let report = SummaryReport::build(&statistics, registry);
    let contents = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&report)
            .map_err(|e| CatalogError::parse(format!("failed to serialize report: {e}")))?,
        ExportFormat::Csv => report.render_csv(),
    };

    let path = dir.join(format!("api_collection_report_{}.{}", timestamp(), format.extension()));
    std::fs::write(&path, contents).map_err(|e| CatalogError::io(&path, e))?;
    info!(path = %path.display(), layers = report.layers.len(), "summary report exported");
    Ok(path)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// RFC 4180: quote fields holding a delimiter, quote or line break.
fn push_csv_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}
