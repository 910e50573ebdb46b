//! Load test CLI for OGC WMS/WMTS map services.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use ogc_load_test::{LoadRunner, ResultsReport, ServiceMode, TestConfig, TestResults};

#[derive(Parser)]
#[command(name = "ogc-load-test")]
#[command(about = "Deterministic load testing for WMS/WMTS map services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override concurrency level
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Benchmark a WMS endpoint with random GetMap bounding boxes
    Wms {
        #[command(flatten)]
        common: DirectArgs,

        /// Bounding box area in square kilometers
        #[arg(long, default_value_t = 100.0)]
        bbox_area: f64,

        /// Bounding box width/height ratio
        #[arg(long, default_value_t = 1.0)]
        bbox_ratio: f64,
    },

    /// Benchmark a WMTS endpoint with random GetTile coordinates
    Wmts {
        #[command(flatten)]
        common: DirectArgs,

        /// Tile matrix set; defaults to the first one the layer links
        #[arg(long)]
        tile_matrix_set: Option<String>,

        /// Tile matrix; defaults to the middle of the pyramid
        #[arg(long)]
        tile_matrix: Option<String>,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct DirectArgs {
    /// Service endpoint; may already carry query parameters
    url: String,

    /// Layer to benchmark; defaults to the service's first layer
    #[arg(short, long)]
    layer: Option<String>,

    /// Random seed; keep it fixed to replicate a run, change it to
    /// dodge caches warmed by a previous one
    #[arg(long, default_value_t = 1640)]
    seed: u64,

    /// Test duration in seconds
    #[arg(short, long, default_value_t = 60)]
    duration: u64,

    /// Number of concurrent sessions
    #[arg(short, long, default_value_t = 4)]
    concurrency: u32,

    /// Aggregate request rate limit in requests per second
    #[arg(long)]
    rps: Option<f64>,

    /// Warmup seconds excluded from the statistics
    #[arg(long, default_value_t = 0)]
    warmup: u64,

    /// Image format override; defaults to the first advertised format
    #[arg(long)]
    format: Option<String>,

    /// Log every request to a JSONL file under results/
    #[arg(long)]
    log_requests: bool,

    /// Output format: table (default), json, csv
    #[arg(short, long, default_value = "table")]
    output: String,
}

impl DirectArgs {
    fn into_config(self, mode: ServiceMode) -> (TestConfig, String) {
        let name = match mode {
            ServiceMode::Wms => "wms-direct",
            ServiceMode::Wmts => "wmts-direct",
        };
        let config = TestConfig {
            name: name.to_string(),
            description: String::new(),
            base_url: self.url,
            mode,
            duration_secs: self.duration,
            concurrency: self.concurrency,
            requests_per_second: self.rps,
            warmup_secs: self.warmup,
            seed: self.seed,
            layer: self.layer,
            bbox_area_km2: 100.0,
            bbox_ratio: 1.0,
            tile_matrix_set: None,
            tile_matrix: None,
            format: self.format,
            log_requests: self.log_requests,
        };
        (config, self.output)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            concurrency,
            duration,
            seed,
            output,
        } => {
            println!("Loading scenario: {}", scenario.display());

            let mut config = TestConfig::from_file(&scenario)?;
            if let Some(c) = concurrency {
                config.concurrency = c;
            }
            if let Some(d) = duration {
                config.duration_secs = d;
            }
            if let Some(s) = seed {
                config.seed = s;
            }
            config.validate()?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            if !config.description.is_empty() {
                println!("  Description: {}", config.description);
            }
            println!("  Duration: {}s", config.duration_secs);
            println!("  Concurrency: {}", config.concurrency);
            println!();

            let mut runner = LoadRunner::new(config);
            let results = runner.run().await?;
            print_results(&results, &output)?;
            Ok(())
        }
        Commands::Wms {
            common,
            bbox_area,
            bbox_ratio,
        } => {
            let (mut config, output) = common.into_config(ServiceMode::Wms);
            config.bbox_area_km2 = bbox_area;
            config.bbox_ratio = bbox_ratio;
            config.validate()?;

            let mut runner = LoadRunner::new(config);
            let results = runner.run().await?;
            print_results(&results, &output)?;
            Ok(())
        }
        Commands::Wmts {
            common,
            tile_matrix_set,
            tile_matrix,
        } => {
            let (mut config, output) = common.into_config(ServiceMode::Wmts);
            config.tile_matrix_set = tile_matrix_set;
            config.tile_matrix = tile_matrix;
            config.validate()?;

            let mut runner = LoadRunner::new(config);
            let results = runner.run().await?;
            print_results(&results, &output)?;
            Ok(())
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            match std::fs::read_dir(&dir) {
                Ok(entries) => {
                    let mut scenarios = Vec::new();

                    for entry in entries.flatten() {
                        let path = entry.path();
                        if path.extension().and_then(|s| s.to_str()) == Some("yaml") {
                            if let Ok(config) = TestConfig::from_file(&path) {
                                scenarios.push((
                                    path.file_name().unwrap().to_string_lossy().to_string(),
                                    config.name,
                                    config.description,
                                ));
                            }
                        }
                    }

                    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

                    if scenarios.is_empty() {
                        println!("No scenario files found");
                    } else {
                        for (filename, name, desc) in scenarios {
                            println!("  {} - {}", filename, name);
                            if !desc.is_empty() {
                                println!("    {}", desc);
                            }
                            println!();
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                }
            }

            Ok(())
        }
    }
}

fn print_results(results: &TestResults, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => println!("{}", ResultsReport::format_json(results)?),
        "csv" => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(results));
        }
        _ => println!("{}", ResultsReport::format_table(results)),
    }
    Ok(())
}
