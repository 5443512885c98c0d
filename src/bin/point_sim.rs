//! point-sim - synthetic data-point simulator host
//!
//! Usage:
//!   point-sim --duration-secs 10
//!   point-sim --points 40 --interval-ms 250 --seed 7
//!   point-sim --config sim.json

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use via_pointsim::{
    Category, ChannelSink, MonitorKey, Point, PointRef, ReadRawDetails, Result, SimConfig,
    SimError, SimulationEngine, metrics,
};

#[derive(Parser)]
#[command(name = "point-sim")]
#[command(about = "Simulated data points with sampling and history")]
struct Cli {
    /// Number of catalogue points (cycles through every category)
    #[arg(short, long)]
    points: Option<usize>,

    /// Requested sampling interval in milliseconds
    #[arg(short, long, default_value = "500")]
    interval_ms: i64,

    /// How long to run before shutting down
    #[arg(short, long, default_value = "5")]
    duration_secs: u64,

    /// Generator seed (overrides the configuration)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Notification channel capacity
    #[arg(long, default_value = "4096")]
    channel_capacity: usize,
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;
            SimConfig::from_json(&json)?
        }
        None => SimConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    Ok(config)
}

/// One point per category, repeated until `count` points exist.
fn catalogue(count: usize) -> Vec<PointRef> {
    let categories = Category::all();
    (0..count)
        .map(|i| {
            let category = categories[i % categories.len()];
            let id = if i < categories.len() {
                category.name()
            } else {
                format!("{}#{}", category.name(), i / categories.len())
            };
            Point::new(id, category.tag()).into_ref()
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let (sink, notifications) = ChannelSink::bounded(cli.channel_capacity);
    let sink = Arc::new(sink);
    let engine = SimulationEngine::new(config, sink.clone())?;

    let points = catalogue(cli.points.unwrap_or_else(|| Category::all().len()));
    let mut key = 0u32;
    let mut archived = Vec::new();
    for point in &points {
        key += 1;
        engine.start_monitoring(MonitorKey(key), cli.interval_ms, point.clone())?;
        // A second, slower subscription to the same point is deduplicated
        key += 1;
        engine.start_monitoring(MonitorKey(key), cli.interval_ms * 2, point.clone())?;

        match engine.enable_history(point) {
            Ok(()) => archived.push(point.clone()),
            Err(SimError::NotHistorizable(_)) => {}
            Err(e) => warn!(point = %point.id(), error = %e, "History not enabled"),
        }
    }
    info!(
        points = points.len(),
        registrations = key,
        archived = archived.len(),
        "Catalogue ready"
    );

    let printer = std::thread::spawn(move || {
        let mut printed = 0u64;
        for notification in notifications {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Unserializable notification"),
            }
            printed += 1;
        }
        printed
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Some(point) = archived.first() {
        let details = ReadRawDetails {
            max_values: Some(5),
            ..Default::default()
        };
        let page = engine.begin_paged_read(point.id(), &details, None)?;
        info!(
            point = %point.id(),
            values = page.values.len(),
            continuation = ?page.continuation.map(|t| t.to_string()),
            "History sample"
        );
        if let Some(token) = page.continuation {
            engine.release_read(token)?;
        }
    }

    engine.shutdown();
    drop(engine);
    let dropped = sink.dropped();
    drop(sink);

    let printed = printer.join().unwrap_or(0);
    info!(printed, dropped, "Notifications");
    eprintln!("{}", metrics::render());
    Ok(())
}
