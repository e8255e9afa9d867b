//! Tutor Stream Example - streaming a tutor answer fragment by fragment
//!
//! Prints fragments as they arrive over SSE and reports how the stream ended.
//!
//! Run with: cargo run --example tutor_stream

use mathtutor_gateway::prelude::*;
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let client = GatewayClient::from_env()?;
    let mut request = ChatRequest::new("Walk me through completing the square for x^2 + 6x + 5.");

    let reader = client.chat_stream(
        &mut request,
        Box::new(|event: StreamEvent| match event {
            StreamEvent::Content(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            StreamEvent::Done(end) => println!("\n\n[stream ended: {:?}]", end),
        }),
    );

    reader.await?;
    Ok(())
}
