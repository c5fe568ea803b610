use anyhow::Result;
use clap::Parser;
use colored::*;
use std::time::Duration;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Integration and Load Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long, default_value = "http://localhost:4000")]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Number of concurrent clients opened by the load scenario
    #[arg(long, default_value_t = 100)]
    clients: usize,

    /// Delay between opening two load clients, in milliseconds
    #[arg(long, default_value_t = 100)]
    spawn_delay_ms: u64,

    /// How long to wait for a heartbeat before a client counts as failed
    #[arg(long, default_value_t = 15)]
    heartbeat_timeout_secs: u64,

    /// How long each load client keeps its stream open counting heartbeats
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Prefix for generated client ids, defaults to a random one per run
    #[arg(long)]
    client_prefix: Option<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Open a single stream and wait for a heartbeat
    Connection,
    /// Start, send, end and verify the stream closes
    Lifecycle,
    /// Reconnect with the same client id and verify the old stream is replaced
    Supersede,
    /// Open many streams concurrently
    Load,
    /// Run every scenario
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let prefix = cli
        .client_prefix
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let heartbeat_timeout = Duration::from_secs(cli.heartbeat_timeout_secs);
    let spawn_delay = Duration::from_millis(cli.spawn_delay_ms);
    let hold = Duration::from_secs(cli.duration_secs);

    let client = reqwest::Client::new();
    let api_client = ApiClient::new(client, cli.base_url.clone());

    let live_sessions = api_client.live_sessions().await?;
    println!(
        "{} Server reachable at {} ({} live sessions)",
        "✓".green(),
        cli.base_url,
        live_sessions
    );

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();
    let base_url = cli.base_url.as_str();

    let run_connection = matches!(cli.scenario, ScenarioChoice::Connection | ScenarioChoice::All);
    let run_lifecycle = matches!(cli.scenario, ScenarioChoice::Lifecycle | ScenarioChoice::All);
    let run_supersede = matches!(cli.scenario, ScenarioChoice::Supersede | ScenarioChoice::All);
    let run_load = matches!(cli.scenario, ScenarioChoice::Load | ScenarioChoice::All);

    if run_connection {
        let client_id = format!("{}-connection", prefix);
        results.push(
            scenarios::test_connection(base_url, &client_id, heartbeat_timeout, cli.verbose)
                .await?,
        );
        api_client.close(&client_id).await?;
    }
    if run_lifecycle {
        let client_id = format!("{}-lifecycle", prefix);
        results.push(
            scenarios::test_lifecycle(base_url, &client_id, &api_client, cli.verbose).await?,
        );
    }
    if run_supersede {
        let client_id = format!("{}-supersede", prefix);
        results.push(
            scenarios::test_supersede(base_url, &client_id, &api_client, cli.verbose).await?,
        );
    }
    if run_load {
        let client_prefix = format!("{}-load", prefix);
        results.push(
            scenarios::test_load(
                base_url,
                &client_prefix,
                cli.clients,
                spawn_delay,
                heartbeat_timeout,
                hold,
                &api_client,
            )
            .await?,
        );
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
