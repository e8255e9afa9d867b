//! Health Check Example - checks whether the upstream is reachable
//!
//! Run with: cargo run --example health_check

use mathtutor_gateway::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client = GatewayClient::from_env()?;
    let healthy = client.health_check().await;

    println!(
        "{} ({}) is {}",
        client.config().provider,
        client.config().base_url,
        if healthy { "reachable" } else { "unreachable" }
    );

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}
