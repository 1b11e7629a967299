//! peak-planner: command-line front end for the peak catalog.
//!
//! Every command goes through the catalog repository, so reads are served
//! from the request cache and writes invalidate it the same way a long-lived
//! client would.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use catalog::{
    CacheStore, DraftField, DraftForm, PeakRepository, RepositorySettings, SearchImport,
};
use common::config::PlannerConfig;
use common::{ExternalSearchResult, Peak, SnapshotRefresh};
use peak_client::{PeakApi, PeakRestClient};

/// Peak Planner
#[derive(Parser)]
#[command(name = "peak-planner", about = "Manage a catalog of mountain peaks")]
struct Cli {
    /// Path to an optional TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every peak with its snapshot status.
    List,
    /// Show one peak in detail.
    Show { id: i64 },
    /// Create a peak.
    Add(PeakFields),
    /// Edit an existing peak; omitted fields keep their current value.
    Edit {
        id: i64,
        #[command(flatten)]
        fields: PeakFields,
    },
    /// Delete a peak.
    Delete { id: i64 },
    /// Re-fetch external provider data for a peak.
    Refresh { id: i64 },
    /// Search the external provider by name.
    Search { query: String },
    /// Search, then import one hit as a new peak.
    Import {
        query: String,
        /// 1-based position in the search results.
        #[arg(long, default_value_t = 1, conflicts_with = "external_id")]
        pick: usize,
        /// Provider id of the hit to import.
        #[arg(long)]
        external_id: Option<String>,
    },
}

#[derive(Args)]
struct PeakFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    grade: Option<String>,
    #[arg(long = "elevation-ft")]
    elevation_ft: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl PeakFields {
    fn apply(self, draft: &mut DraftForm) {
        let fields = [
            (DraftField::Name, self.name),
            (DraftField::Region, self.region),
            (DraftField::Grade, self.grade),
            (DraftField::ElevationFt, self.elevation_ft),
            (DraftField::Lat, self.lat),
            (DraftField::Lon, self.lon),
            (DraftField::Description, self.description),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                draft.set_field(field, value);
            }
        }
    }
}

fn fmt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn stale_window(cfg: &PlannerConfig) -> chrono::Duration {
    chrono::Duration::seconds(cfg.snapshot.stale_after_secs.min(i32::MAX as u64) as i64)
}

fn snapshot_status(peak: &Peak, cfg: &PlannerConfig) -> &'static str {
    if peak.snapshot.retrieved_at.is_none() {
        "no snapshot"
    } else if peak.is_stale_after(Utc::now(), stale_window(cfg)) {
        "stale"
    } else {
        "fresh"
    }
}

fn print_peak_row(peak: &Peak, cfg: &PlannerConfig) {
    println!(
        "{:>5}  {:<28} {:<20} {:>8} ft  [{}]",
        peak.id,
        peak.name,
        peak.region,
        fmt_number(peak.elevation_ft),
        snapshot_status(peak, cfg)
    );
}

fn print_peak(peak: &Peak, cfg: &PlannerConfig) {
    println!("#{} {}", peak.id, peak.name);
    println!("  region:      {}", peak.region);
    println!("  grade:       {}", peak.grade);
    println!("  elevation:   {} ft", fmt_number(peak.elevation_ft));
    println!("  prominence:  {} ft", fmt_number(peak.prominence_ft));
    println!("  location:    {}, {}", fmt_number(peak.lat), fmt_number(peak.lon));
    if !peak.description.is_empty() {
        println!("  description: {}", peak.description);
    }

    let snapshot = &peak.snapshot;
    match snapshot.retrieved_at {
        Some(at) => println!(
            "  snapshot:    {} {} retrieved {} [{}]",
            snapshot.source.as_deref().unwrap_or("?"),
            snapshot.external_id.as_deref().unwrap_or("?"),
            at.to_rfc3339(),
            snapshot_status(peak, cfg)
        ),
        None => println!("  snapshot:    none"),
    }
}

fn print_hit(index: usize, hit: &ExternalSearchResult) {
    println!(
        "{:>3}. {:<28} {:>8} ft  {}, {}  ({})",
        index + 1,
        hit.name.as_deref().unwrap_or("(unnamed)"),
        fmt_number(hit.elevation_ft()),
        hit.range.as_deref().or(hit.region.as_deref()).unwrap_or("-"),
        hit.country.as_deref().unwrap_or("-"),
        hit.external_id
    );
}

fn print_refresh(refreshed: &SnapshotRefresh, cfg: &PlannerConfig) {
    let origin = if refreshed.from_cache {
        "service cache"
    } else {
        "provider"
    };
    println!("Snapshot refreshed from {}", origin);
    print_peak(&refreshed.peak, cfg);
}

fn build_repository(cfg: &PlannerConfig) -> anyhow::Result<PeakRepository> {
    let client = PeakRestClient::new(cfg).context("Failed to build HTTP client")?;
    let api: Arc<dyn PeakApi> = Arc::new(client);
    Ok(PeakRepository::new(
        api,
        CacheStore::new(),
        RepositorySettings::from_config(cfg),
    ))
}

async fn run(command: Command, cfg: &PlannerConfig, repo: &PeakRepository) -> anyhow::Result<()> {
    match command {
        Command::List => {
            let peaks = repo.list().await?;
            if peaks.is_empty() {
                println!("No peaks yet.");
            }
            for peak in &peaks {
                print_peak_row(peak, cfg);
            }
        }
        Command::Show { id } => {
            let peak = repo.get(id).await?;
            print_peak(&peak, cfg);
        }
        Command::Add(fields) => {
            let mut draft = DraftForm::new();
            draft.start_new();
            fields.apply(&mut draft);
            let peak = draft.submit(repo).await?;
            info!("Created peak {}", peak.id);
            print_peak(&peak, cfg);
        }
        Command::Edit { id, fields } => {
            let current = repo.get(id).await?;
            let mut draft = DraftForm::new();
            draft.start_edit(&current);
            fields.apply(&mut draft);
            let peak = draft.submit(repo).await?;
            print_peak(&peak, cfg);
        }
        Command::Delete { id } => {
            repo.delete(id).await?;
            println!("Deleted peak {}", id);
        }
        Command::Refresh { id } => {
            let refreshed = repo.refresh_external_snapshot(id).await?;
            print_refresh(&refreshed, cfg);
        }
        Command::Search { query } => {
            let mut search = SearchImport::new(repo.clone());
            let hits = search.search(&query).await?;
            if hits.is_empty() {
                println!("No matches for \"{}\".", query.trim());
            }
            for (i, hit) in hits.iter().enumerate() {
                print_hit(i, hit);
            }
        }
        Command::Import {
            query,
            pick,
            external_id,
        } => {
            let mut search = SearchImport::new(repo.clone());
            let hits = search.search(&query).await?;
            let hit = match &external_id {
                Some(wanted) => hits.iter().find(|h| &h.external_id == wanted),
                None => pick.checked_sub(1).and_then(|i| hits.get(i)),
            }
            .ok_or_else(|| anyhow!("No matching search result to import"))?;

            let peak = search.import(hit).await?;
            print_peak(&peak, cfg);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peak_planner=info,peak_client=info,catalog=info".into()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Catalog service: {}", cfg.api_base_url);

    let repo = match build_repository(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    let sweeper = repo
        .cache()
        .spawn_sweeper(Duration::from_secs(cfg.cache.sweep_interval_secs));

    let result = run(cli.command, &cfg, &repo).await;
    drop(sweeper);
    repo.cache().clear();

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
