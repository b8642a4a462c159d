#![forbid(unsafe_code)]

//! Load test binary - spawn synthetic Matrix users against a homeserver
//!
//! Usage:
//!   cargo run -- --users 50 --duration 60
//!   cargo run -- --users 500 --server http://matrix.local:8008 --ramp-up 30
//!   cargo run -- --users 100 --wait-min 500 --wait-max 1500

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info};

use matrix_stress::agent::ParticipantAgent;
use matrix_stress::client::MatrixClient;
use matrix_stress::host::HostCoordinator;
use matrix_stress::metrics::{MetricsCollector, TestSummary};

#[derive(Debug)]
struct TestConfig {
    num_users: usize,
    duration_secs: u64,
    ramp_up_secs: u64,
    server_url: String,
    wait_min_ms: u64,
    wait_max_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            num_users: 5,
            duration_secs: 30,
            ramp_up_secs: 5,
            server_url: "http://localhost:8008".to_string(),
            wait_min_ms: 1000,
            wait_max_ms: 2500,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config = TestConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--users" | "-u" => {
                if i + 1 < args.len() {
                    config.num_users = args[i + 1].parse().unwrap_or(config.num_users);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    config.duration_secs = args[i + 1].parse().unwrap_or(config.duration_secs);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--ramp-up" | "-r" => {
                if i + 1 < args.len() {
                    config.ramp_up_secs = args[i + 1].parse().unwrap_or(config.ramp_up_secs);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_url = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--wait-min" => {
                if i + 1 < args.len() {
                    config.wait_min_ms = args[i + 1].parse().unwrap_or(config.wait_min_ms);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--wait-max" => {
                if i + 1 < args.len() {
                    config.wait_max_ms = args[i + 1].parse().unwrap_or(config.wait_max_ms);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    if config.wait_max_ms < config.wait_min_ms {
        config.wait_max_ms = config.wait_min_ms;
    }

    run_load_test(config).await
}

async fn run_load_test(config: TestConfig) -> Result<()> {
    println!("\n=== Starting Load Test ===");
    println!("Users: {}", config.num_users);
    println!("Duration: {}s", config.duration_secs);
    println!("Ramp-up: {}s", config.ramp_up_secs);
    println!("Server: {}", config.server_url);
    println!(
        "Wait between bursts: {}-{} ms",
        config.wait_min_ms, config.wait_max_ms
    );
    println!("========================\n");

    let host = Arc::new(HostCoordinator::new());
    let deadline = Instant::now() + Duration::from_secs(config.ramp_up_secs + config.duration_secs);
    let ramp_up_delay = if config.num_users > 1 {
        Duration::from_secs(config.ramp_up_secs) / config.num_users as u32
    } else {
        Duration::ZERO
    };

    let mut handles = Vec::new();
    let mut collectors = Vec::new();

    // Spawn agents with gradual ramp-up
    for i in 0..config.num_users {
        let metrics = Arc::new(MetricsCollector::new(format!("agent-{i}")));
        collectors.push(metrics.clone());

        let client = MatrixClient::new(config.server_url.as_str(), metrics.clone());
        let agent = ParticipantAgent::new(client, host.clone());

        let handle = tokio::spawn(run_agent(
            agent,
            host.clone(),
            metrics,
            deadline,
            config.wait_min_ms,
            config.wait_max_ms,
        ));
        handles.push(handle);

        if i + 1 < config.num_users {
            sleep(ramp_up_delay).await;
        }
    }

    println!(
        "All agents spawned. Running test for {}s...\n",
        config.duration_secs
    );

    for handle in handles {
        let _ = handle.await;
    }

    println!("All agents completed.");
    write_results(&collectors);

    Ok(())
}

async fn run_agent(
    mut agent: ParticipantAgent,
    host: Arc<HostCoordinator>,
    metrics: Arc<MetricsCollector>,
    deadline: Instant,
    wait_min_ms: u64,
    wait_max_ms: u64,
) {
    match agent.start().await {
        Ok(()) => {
            metrics.mark_active();
            if let Ok(room_id) = host.room_id().await {
                metrics.set_room_id(&room_id);
            }
            info!(user = %agent.username(), "agent active");
        }
        Err(e) => {
            error!(user = %agent.username(), error = %e, "agent startup failed");
            metrics.record_error(format!("startup failed: {e}"));
            return;
        }
    }

    // Steady state: burst, then a randomized wait, until the deadline.
    while Instant::now() < deadline {
        if let Err(e) = agent.send_burst().await {
            metrics.record_error(format!("burst failed: {e}"));
        }

        let wait = Duration::from_millis(rand::thread_rng().gen_range(wait_min_ms..=wait_max_ms));
        if Instant::now() + wait >= deadline {
            break;
        }
        sleep(wait).await;
    }
}

/// Write per-agent reports and the aggregated summary to JSON files.
fn write_results(collectors: &[Arc<MetricsCollector>]) {
    let all_metrics: Vec<_> = collectors.iter().map(|c| c.generate_report()).collect();

    let summary = TestSummary::from_metrics(&all_metrics);
    summary.print_summary();

    match serde_json::to_string_pretty(&all_metrics) {
        Ok(json) => {
            if let Err(e) = std::fs::write("load_test_results.json", json) {
                eprintln!("Failed to write results: {}", e);
            } else {
                println!("Detailed results saved to: load_test_results.json");
            }
        }
        Err(e) => eprintln!("Failed to serialize results: {}", e),
    }

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            if let Err(e) = std::fs::write("load_test_summary.json", json) {
                eprintln!("Failed to write summary: {}", e);
            } else {
                println!("Summary saved to: load_test_summary.json");
            }
        }
        Err(e) => eprintln!("Failed to serialize summary: {}", e),
    }
}

fn print_usage() {
    println!("Load test for Matrix-compatible homeservers");
    println!("\nUsage:");
    println!("  cargo run -- [OPTIONS]");
    println!("\nOptions:");
    println!("  -u, --users <N>        Number of concurrent simulated users (default: 5)");
    println!("  -d, --duration <SECS>  Test duration in seconds (default: 30)");
    println!("  -r, --ramp-up <SECS>   Ramp-up period in seconds (default: 5)");
    println!("  -s, --server <URL>     Homeserver base URL (default: http://localhost:8008)");
    println!("  --wait-min <MS>        Minimum wait between message bursts (default: 1000)");
    println!("  --wait-max <MS>        Maximum wait between message bursts (default: 2500)");
    println!("  -h, --help             Print this help message");
    println!("\nExamples:");
    println!("  # Basic load test against a local homeserver");
    println!("  cargo run -- --users 10 --duration 60");
    println!();
    println!("  # 500 users ramped up over 30 seconds");
    println!("  cargo run -- --users 500 --ramp-up 30 --duration 120");
    println!("\nEnvironment Variables:");
    println!("  RUST_LOG=debug          Enable debug logging");
    println!("  RUST_LOG=info           Enable info logging (default)");
}
