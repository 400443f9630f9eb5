//! Tile server load generator CLI.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use tile_bench::{
    BatchCoordinator, BatchPlan, BenchConfig, ClientPool, ConfigOverrides, FixedImageTile,
    HttpTransport, RandomGeoTile, ResultsReport, RunReport, Workload,
};

#[derive(Parser)]
#[command(name = "tile-bench")]
#[command(about = "Concurrent load generator for map tile servers", long_about = None)]
struct Cli {
    /// Path to a YAML config file; flags below override its values
    #[arg(short, long, env = "TILE_BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the tile server
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Number of pooled clients (parallel requests)
    #[arg(short = 'n', long, env = "N_CLIENTS")]
    clients: Option<usize>,

    /// Requests per client
    #[arg(short, long, env = "N_REQUESTS")]
    requests: Option<u64>,

    /// Failures tolerated per client before aborting
    #[arg(long, env = "MAX_FAILS_PER_CLIENT")]
    max_fails_per_client: Option<u64>,

    /// RNG seed for a reproducible geo workload
    #[arg(long, env = "SEED")]
    seed: Option<u64>,

    /// Workloads to run
    #[arg(short, long, value_enum, default_value = "both")]
    workload: WorkloadKind,

    /// Output format: line (default), table, json
    #[arg(short, long, default_value = "line")]
    output: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WorkloadKind {
    Geo,
    Image,
    Both,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // stdout carries only the report lines
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = ConfigOverrides {
        base_url: cli.base_url,
        pool_size: cli.clients,
        requests_per_client: cli.requests,
        max_failures_per_client: cli.max_fails_per_client,
        seed: cli.seed,
    };
    let config = BenchConfig::resolve(cli.config.as_deref(), overrides)?;

    info!(
        base_url = %config.base_url,
        pool_size = config.pool_size,
        requests_per_client = config.requests_per_client,
        max_failures_per_client = config.max_failures_per_client,
        "Configuration loaded"
    );

    let geo = RandomGeoTile::from_config(&config);
    let image = FixedImageTile::from_config(&config);
    let geo_delay = Duration::from_millis(config.geo_release_delay_ms);

    let (geo_result, image_result) = match cli.workload {
        WorkloadKind::Geo => (Some(run_batch(&config, &geo, geo_delay).await), None),
        WorkloadKind::Image => (None, Some(run_batch(&config, &image, Duration::ZERO).await)),
        WorkloadKind::Both => {
            let (g, i) = tokio::join!(
                run_batch(&config, &geo, geo_delay),
                run_batch(&config, &image, Duration::ZERO)
            );
            (Some(g), Some(i))
        }
    };

    let mut aborted = 0;
    for (workload, result) in [("URL", geo_result), ("IMG", image_result)] {
        match result {
            Some(Ok(report)) => print_report(&report, &cli.output)?,
            Some(Err(e)) => {
                // Aborted batches still show their column header
                if !matches!(cli.output.as_str(), "json" | "table") {
                    println!("{}", ResultsReport::format_lines(workload, None));
                }
                error!(workload = workload, error = %e, "Batch aborted");
                aborted += 1;
            }
            None => {}
        }
    }

    if aborted > 0 {
        anyhow::bail!("{} batch(es) aborted", aborted);
    }
    Ok(())
}

/// Run one workload against its own freshly populated client pool.
async fn run_batch(
    config: &BenchConfig,
    workload: &dyn Workload,
    release_delay: Duration,
) -> tile_bench::Result<RunReport> {
    let pool = ClientPool::populate(config.pool_size, || {
        HttpTransport::new(config.request_timeout(), config.max_idle_per_host)
    })?;
    let plan = BatchPlan::for_workload(config, workload).with_release_delay(release_delay);

    BatchCoordinator::from_config(config)
        .run(&plan, workload, pool)
        .await
}

fn print_report(report: &RunReport, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => println!("{}", ResultsReport::format_json(report)?),
        "table" => println!("{}", ResultsReport::format_table(report)),
        _ => println!(
            "{}",
            ResultsReport::format_lines(&report.workload, Some(report))
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_every_override_has_an_env_binding() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_string)
        };

        assert_eq!(env_of("base_url").as_deref(), Some("BASE_URL"));
        assert_eq!(env_of("clients").as_deref(), Some("N_CLIENTS"));
        assert_eq!(env_of("requests").as_deref(), Some("N_REQUESTS"));
        assert_eq!(env_of("max_fails_per_client").as_deref(), Some("MAX_FAILS_PER_CLIENT"));
        assert_eq!(env_of("seed").as_deref(), Some("SEED"));
    }

    #[test]
    fn test_seed_flag_parses() {
        let cli = Cli::try_parse_from(["tile-bench", "--seed", "42", "-w", "geo"]).unwrap();
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.workload, WorkloadKind::Geo);
    }
}
