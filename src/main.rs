// Traytrack runner - demo and query CLI around the tray tracking core
//
// `traytrack demo` simulates one inspection pass the way the detection
// pipeline would drive the component: scan-index position strings, mostly
// "OK" verdicts with a few defect labels sprinkled in, persisted to the
// SQLite store. `traytrack recent` reads back what was persisted. Both
// double as smoke tests for the full stack (parse -> state -> repository
// -> events).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traytrack::config::{Config, VERSION};
use traytrack::{
    MappingMode, SqliteRepository, TrayComponent, TrayEvent, TrayRepository, TrayStatistics,
};

/// Tray inspection result tracker
#[derive(Parser)]
#[command(name = "traytrack")]
#[command(version = VERSION)]
#[command(about = "Tray inspection result tracker", long_about = None)]
struct Cli {
    /// Override the tray database path (default from config)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated inspection pass over one tray
    Demo {
        /// Tray grid rows
        #[arg(long, default_value_t = 4)]
        rows: u32,

        /// Tray grid columns
        #[arg(long, default_value_t = 6)]
        cols: u32,

        /// Batch label stored on the tray header
        #[arg(long)]
        batch: Option<String>,

        /// Scan pattern: "snake" or "rowwise" (default from config)
        #[arg(long)]
        mode: Option<String>,
    },

    /// List recently persisted trays with their yield
    Recent {
        /// Maximum number of trays to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

// Defect labels the simulated pipeline reports for non-OK slots
const DEMO_DEFECTS: &[&str] = &["Scratch", "Bridge", "Chipping"];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = cli.db.unwrap_or_else(|| config.db_path.clone());

    match cli.command {
        Commands::Demo {
            rows,
            cols,
            batch,
            mode,
        } => {
            let mode = match mode {
                Some(text) => text.parse()?,
                None => config.mapping_mode,
            };
            run_demo(
                &db_path,
                rows,
                cols,
                batch.as_deref(),
                mode,
                config.history_cap,
            )
        }
        Commands::Recent { limit } => show_recent(&db_path, limit),
    }
}

fn run_demo(
    db_path: &PathBuf,
    rows: u32,
    cols: u32,
    batch: Option<&str>,
    mode: MappingMode,
    history_cap: usize,
) -> Result<()> {
    let repository = SqliteRepository::open(db_path)
        .with_context(|| format!("opening tray database {}", db_path.display()))?;
    let mut component = TrayComponent::with_options(Box::new(repository), mode, history_cap);

    component.subscribe(|event| match event {
        TrayEvent::TrayCompleted { tray, .. } => {
            tracing::info!(tray_id = %tray.tray_id, "tray completed event received");
        }
        TrayEvent::Error { message, .. } => {
            tracing::error!(%message, "error event received");
        }
        _ => {}
    });

    let tray = component.start_tray(rows, cols, batch)?;
    println!(
        "Started tray {} ({}x{}, {:?} scan) -> {}",
        tray.tray_id,
        rows,
        cols,
        mode,
        db_path.display()
    );

    // Feed results in scan order, as bare-index position strings, with a
    // deterministic sprinkle of defects
    let total = rows as usize * cols as usize;
    for index in 0..total {
        let result = if index % 7 == 3 {
            DEMO_DEFECTS[index % DEMO_DEFECTS.len()]
        } else {
            "OK"
        };
        let image_path = format!("/images/{}/{index}.png", tray.tray_id);
        component.update_result(&index.to_string(), result, Some(&image_path), Utc::now())?;
    }

    // The last write auto-completed the tray; it now sits in history
    let completed = component
        .history(1)
        .into_iter()
        .next()
        .context("completed tray missing from history")?;
    let stats = TrayStatistics::from_tray(Some(&completed));

    println!();
    println!("Tray {} complete", completed.tray_id);
    println!("  inspected  {}/{}", stats.inspected_count, stats.total_slots);
    println!("  ok / ng    {} / {}", stats.ok_count, stats.ng_count);
    println!("  yield      {:.1}%", stats.yield_rate * 100.0);
    if !stats.defect_counts.is_empty() {
        let mut defects: Vec<_> = stats.defect_counts.iter().collect();
        defects.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        println!("  defects:");
        for (label, count) in defects {
            println!("    {label}: {count}");
        }
    }

    Ok(())
}

fn show_recent(db_path: &PathBuf, limit: usize) -> Result<()> {
    let mut repository = SqliteRepository::open(db_path)
        .with_context(|| format!("opening tray database {}", db_path.display()))?;
    let trays = repository.load_recent_trays(limit)?;

    if trays.is_empty() {
        println!("No trays stored in {}", db_path.display());
        return Ok(());
    }

    for tray in trays {
        let stats = TrayStatistics::from_tray(Some(&tray));
        let state = match tray.completed_at {
            Some(at) => format!("completed {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => "in progress".to_string(),
        };
        println!(
            "{}  {}x{}  batch={}  {}  yield {:.1}% ({}/{})",
            tray.tray_id,
            tray.rows,
            tray.cols,
            tray.batch_name.as_deref().unwrap_or("-"),
            state,
            stats.yield_rate * 100.0,
            stats.ok_count,
            stats.inspected_count,
        );
    }

    Ok(())
}
