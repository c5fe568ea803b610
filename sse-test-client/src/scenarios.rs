use anyhow::Result;
use colored::*;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Open one stream and wait for its first heartbeat.
pub async fn test_connection(
    base_url: &str,
    client_id: &str,
    heartbeat_timeout: Duration,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = "connection";
    let start = Instant::now();

    println!("\n{} Opening stream for {}...", "→".blue(), client_id);
    let mut sse = Connection::establish(base_url, client_id).await?;

    match sse.wait_for_event("heartbeat", heartbeat_timeout).await {
        Ok(event) => {
            if verbose {
                print_event(&sse.client_id, &event);
            }
            println!("{} Heartbeat received", "✓".green());
            Ok(TestResult::pass(scenario, start.elapsed()))
        }
        Err(e) => Ok(TestResult::fail(
            scenario,
            format!("No heartbeat: {}", e),
            start.elapsed(),
        )),
    }
}

/// Start, push a message, end, then confirm a second end is rejected.
pub async fn test_lifecycle(
    base_url: &str,
    client_id: &str,
    api_client: &ApiClient,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = "lifecycle";
    let start = Instant::now();

    let mut sse = Connection::establish(base_url, client_id).await?;

    // The registration is only guaranteed once the stream is flowing, and the
    // first heartbeat is written immediately.
    if let Err(e) = sse.wait_for_event("heartbeat", EVENT_TIMEOUT).await {
        return Ok(TestResult::fail(
            scenario,
            format!("Stream never became active: {}", e),
            start.elapsed(),
        ));
    }

    let message = format!("lifecycle-{}", uuid::Uuid::new_v4());
    println!("{} Sending message {}", "→".blue(), message);
    let answer = api_client.send_message(client_id, &message).await?;
    if answer != "Succeed!" {
        return Ok(TestResult::fail(
            scenario,
            format!("Send answered {}", answer),
            start.elapsed(),
        ));
    }

    match sse.wait_for_event("message", EVENT_TIMEOUT).await {
        Ok(event) => {
            if verbose {
                print_event(&sse.client_id, &event);
            }
            if event.data["data"]["payload"] != message.as_str() {
                return Ok(TestResult::fail(
                    scenario,
                    format!("Unexpected payload: {}", event.data),
                    start.elapsed(),
                ));
            }
            println!("{} Message delivered", "✓".green());
        }
        Err(e) => {
            return Ok(TestResult::fail(
                scenario,
                format!("Message not delivered: {}", e),
                start.elapsed(),
            ));
        }
    }

    let answer = api_client.close(client_id).await?;
    if answer != "Succeed!" {
        return Ok(TestResult::fail(
            scenario,
            format!("End answered {}", answer),
            start.elapsed(),
        ));
    }

    if let Err(e) = sse.wait_for_close(EVENT_TIMEOUT).await {
        return Ok(TestResult::fail(
            scenario,
            format!("Stream stayed open after end: {}", e),
            start.elapsed(),
        ));
    }
    println!("{} Stream closed by server", "✓".green());

    let answer = api_client.close(client_id).await?;
    if answer != "Error!" {
        return Ok(TestResult::fail(
            scenario,
            format!("Second end answered {}", answer),
            start.elapsed(),
        ));
    }

    Ok(TestResult::pass(scenario, start.elapsed()))
}

/// A second stream with the same client id replaces the first one, which is
/// told why before it closes.
pub async fn test_supersede(
    base_url: &str,
    client_id: &str,
    api_client: &ApiClient,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = "supersede";
    let start = Instant::now();

    let mut first = Connection::establish(base_url, client_id).await?;
    if let Err(e) = first.wait_for_event("heartbeat", EVENT_TIMEOUT).await {
        return Ok(TestResult::fail(
            scenario,
            format!("First stream never became active: {}", e),
            start.elapsed(),
        ));
    }

    println!("{} Reconnecting as {}...", "→".blue(), client_id);
    let mut second = Connection::establish(base_url, client_id).await?;
    if let Err(e) = second.wait_for_event("heartbeat", EVENT_TIMEOUT).await {
        return Ok(TestResult::fail(
            scenario,
            format!("Second stream never became active: {}", e),
            start.elapsed(),
        ));
    }

    match first.wait_for_event("connection_closed", EVENT_TIMEOUT).await {
        Ok(event) => {
            if verbose {
                print_event(&first.client_id, &event);
            }
            let reason = event.data["data"]["reason"].as_str().unwrap_or_default();
            if !reason.contains("superseded") {
                return Ok(TestResult::fail(
                    scenario,
                    format!("Unexpected close reason: {}", reason),
                    start.elapsed(),
                ));
            }
            println!("{} First stream superseded", "✓".green());
        }
        Err(e) => {
            return Ok(TestResult::fail(
                scenario,
                format!("First stream was not superseded: {}", e),
                start.elapsed(),
            ));
        }
    }

    let message = format!("supersede-{}", uuid::Uuid::new_v4());
    api_client.send_message(client_id, &message).await?;

    let result = match second.wait_for_event("message", EVENT_TIMEOUT).await {
        Ok(_) => {
            println!("{} Replacement stream receives messages", "✓".green());
            TestResult::pass(scenario, start.elapsed())
        }
        Err(e) => TestResult::fail(
            scenario,
            format!("Replacement stream missed the message: {}", e),
            start.elapsed(),
        ),
    };

    api_client.close(client_id).await?;
    Ok(result)
}

/// Ramp up `clients` streams, one every `spawn_delay`. Each must see a
/// heartbeat, then keeps counting heartbeats for `hold`.
pub async fn test_load(
    base_url: &str,
    client_prefix: &str,
    clients: usize,
    spawn_delay: Duration,
    heartbeat_timeout: Duration,
    hold: Duration,
    api_client: &ApiClient,
) -> Result<TestResult> {
    let scenario = "load";
    let start = Instant::now();

    println!(
        "\n{} Opening {} streams ({:?} apart)...",
        "→".blue(),
        clients,
        spawn_delay
    );

    let mut tasks = JoinSet::new();
    for n in 0..clients {
        let base_url = base_url.to_string();
        let client_id = format!("{}-{}", client_prefix, n);

        tasks.spawn(async move {
            let mut sse = Connection::establish(&base_url, &client_id).await?;
            sse.wait_for_event("heartbeat", heartbeat_timeout).await?;
            let heartbeats = 1 + sse.count_events("heartbeat", hold).await;
            Ok::<_, anyhow::Error>((sse, heartbeats))
        });

        tokio::time::sleep(spawn_delay).await;
    }

    // Sample while the last clients are still holding their streams open
    let live_sessions = api_client.live_sessions().await?;

    let mut connected = Vec::with_capacity(clients);
    let mut heartbeats = 0;
    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((sse, count))) => {
                heartbeats += count;
                connected.push(sse);
            }
            Ok(Err(e)) => {
                log::debug!("Load client failed: {}", e);
                failures += 1;
            }
            Err(e) => {
                log::debug!("Load client task panicked: {}", e);
                failures += 1;
            }
        }
    }

    println!(
        "{} {} of {} streams active, {} heartbeats received, server reported {} live sessions",
        "✓".green(),
        connected.len(),
        clients,
        heartbeats,
        live_sessions
    );

    for sse in &connected {
        api_client.close(&sse.client_id).await?;
    }

    if failures == 0 {
        Ok(TestResult::pass(scenario, start.elapsed()))
    } else {
        Ok(TestResult::fail(
            scenario,
            format!("{} of {} clients never saw a heartbeat", failures, clients),
            start.elapsed(),
        ))
    }
}
