//! HTTP request execution and load test orchestration.

use crate::capabilities;
use crate::config::{ServiceMode, TestConfig};
use crate::metrics::{MetricsCollector, TestResults};
use crate::session::{ServiceCapabilities, Session};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// A single logged request for debugging and replay comparison.
#[derive(Debug, Serialize)]
pub struct RequestLog {
    pub timestamp_ms: u64,
    pub url: String,
    pub latency_ms: f64,
    pub cache_status: String,
    pub status: u16,
}

/// Result of a single HTTP request.
#[derive(Debug)]
pub struct RequestResult {
    pub status: u16,
    pub latency_us: u64,
    pub bytes: usize,
    pub cache_hit: bool,
    pub error: Option<String>,
}

/// Executes load tests with one private session per concurrent worker.
pub struct LoadRunner {
    client: reqwest::Client,
    config: TestConfig,
}

impl LoadRunner {
    /// Create a new load runner.
    pub fn new(config: TestConfig) -> Self {
        let client = reqwest::Client::builder()
            // Generous timeout, public orthophoto servers can be very slow.
            .timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(config.concurrency as usize)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Run the load test. Capabilities discovery or session setup errors
    /// abort the whole run before the first request is issued.
    pub async fn run(&mut self) -> anyhow::Result<TestResults> {
        let endpoint = self.config.endpoint()?;

        println!("Fetching capabilities from {}", endpoint);
        let caps = match self.config.mode {
            ServiceMode::Wms => {
                ServiceCapabilities::Wms(capabilities::fetch_wms(&self.client, &endpoint).await?)
            }
            ServiceMode::Wmts => {
                ServiceCapabilities::Wmts(capabilities::fetch_wmts(&self.client, &endpoint).await?)
            }
        };

        // Every worker owns a private session. Seeds are spaced two apart
        // because a tile session occupies both its seed and seed + 1.
        let mut sessions = Vec::with_capacity(self.config.concurrency as usize);
        for i in 0..self.config.concurrency {
            let seed = self.config.seed.wrapping_add(2 * i as u64);
            sessions.push(Session::new(&self.config, &caps, seed)?);
        }
        let layer = sessions.first().map(|s| s.layer().to_string());

        println!("Starting load test: {}", self.config.name);
        println!("  Warmup: {}s", self.config.warmup_secs);
        println!("  Test duration: {}s", self.config.duration_secs);
        println!("  Concurrency: {}", self.config.concurrency);
        println!("  Seed: {}", self.config.seed);
        if let Some(rps) = self.config.requests_per_second {
            println!("  Rate limit: {:.1} req/s", rps);
        }
        println!();

        let start_time = Instant::now();
        let warmup_until = start_time + Duration::from_secs(self.config.warmup_secs);
        let deadline = warmup_until + Duration::from_secs(self.config.duration_secs);

        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
        let request_log = self.open_request_log()?;

        // The aggregate rate limit is split evenly across workers.
        let request_interval = self
            .config
            .requests_per_second
            .map(|rps| Duration::from_secs_f64(self.config.concurrency as f64 / rps));

        let mut workers = Vec::with_capacity(sessions.len());
        for mut session in sessions {
            let client = self.client.clone();
            let metrics = metrics.clone();
            let request_log = request_log.clone();

            workers.push(tokio::spawn(async move {
                let mut last_request_time = Instant::now();
                while Instant::now() < deadline {
                    if let Some(interval) = request_interval {
                        let since_last = last_request_time.elapsed();
                        if since_last < interval {
                            sleep(interval - since_last).await;
                        }
                        last_request_time = Instant::now();
                    }

                    let url = session.next_url();
                    debug!(url = %url, "request");
                    let in_warmup = Instant::now() < warmup_until;
                    let result = execute_request(&client, url.as_str()).await;

                    if in_warmup {
                        continue;
                    }

                    let mut m = metrics.lock().await;
                    if let Some(ref err) = result.error {
                        m.record_failure();
                        eprintln!("Request failed: {} - {}", url, err);
                    } else if result.status == 200 {
                        m.record_success(result.latency_us, result.bytes, result.cache_hit);
                    } else {
                        m.record_failure();
                        eprintln!("Request returned {}: {}", result.status, url);
                    }
                    drop(m);

                    if let Some(ref log) = request_log {
                        let cache_status = if result.cache_hit { "HIT" } else { "MISS" };
                        let entry = RequestLog {
                            timestamp_ms: start_time.elapsed().as_millis() as u64,
                            url: url.to_string(),
                            latency_ms: result.latency_us as f64 / 1000.0,
                            cache_status: cache_status.to_string(),
                            status: result.status,
                        };
                        if let Ok(json) = serde_json::to_string(&entry) {
                            let mut writer = log.lock().await;
                            let _ = writeln!(writer, "{}", json);
                        }
                    }
                }
            }));
        }

        // Progress display while the workers run.
        let pb = ProgressBar::new(self.config.duration_secs);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        while Instant::now() < deadline {
            let now = Instant::now();
            if now < warmup_until {
                pb.set_message(format!(
                    "Warmup ({}/{}s)",
                    start_time.elapsed().as_secs(),
                    self.config.warmup_secs
                ));
            } else {
                pb.set_message("Test phase");
                let test_elapsed = now.duration_since(warmup_until).as_secs();
                pb.set_position(test_elapsed.min(self.config.duration_secs));
            }
            sleep(Duration::from_millis(250)).await;
        }

        pb.set_message("Waiting for in-flight requests...");
        for worker in workers {
            worker.await?;
        }
        if let Some(ref log) = request_log {
            log.lock().await.flush()?;
        }
        pb.finish_with_message("Complete!");
        println!();

        let m = metrics.lock().await;
        Ok(m.results(
            self.config.name.clone(),
            layer,
            self.config.seed,
            self.config.concurrency,
        ))
    }

    fn open_request_log(&self) -> anyhow::Result<Option<Arc<Mutex<BufWriter<File>>>>> {
        if !self.config.log_requests {
            return Ok(None);
        }
        std::fs::create_dir_all("results")?;
        let scenario_name = self.config.name.replace(' ', "_").to_lowercase();
        let log_path = format!(
            "results/{}_{}.jsonl",
            scenario_name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        println!("  Logging requests to: {}", log_path);
        let file = File::create(&log_path)?;
        Ok(Some(Arc::new(Mutex::new(BufWriter::new(file)))))
    }
}

/// Execute a single HTTP request. Failures are recorded, never retried.
async fn execute_request(client: &reqwest::Client, url: &str) -> RequestResult {
    let start = Instant::now();

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();

            // Cache verdict from the X-Cache header, when the service or
            // a fronting proxy reports one.
            let cache_hit = response
                .headers()
                .get("x-cache")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_uppercase().contains("HIT"))
                .unwrap_or(false);

            let bytes = match response.bytes().await {
                Ok(b) => b.len(),
                Err(_) => 0,
            };

            RequestResult {
                status,
                latency_us: start.elapsed().as_micros() as u64,
                bytes,
                cache_hit,
                error: None,
            }
        }
        Err(e) => RequestResult {
            status: 0,
            latency_us: start.elapsed().as_micros() as u64,
            bytes: 0,
            cache_hit: false,
            error: Some(e.to_string()),
        },
    }
}
