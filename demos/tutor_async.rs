//! Tutor Async Example - several chat calls on the worker pool
//!
//! Fires off one background request per question, then collects the answers.
//! The last handle is cancelled to show that its result is simply dropped.
//!
//! Run with: cargo run --example tutor_async

use mathtutor_gateway::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = GatewayClient::from_env()?;

    let questions = [
        "What is the absolute value of -5?",
        "Solve 3x + 4 = 19.",
        "Is 0 a natural number?",
    ];

    let mut handles: Vec<ChatHandle> = questions
        .iter()
        .map(|q| client.chat_async(&mut ChatRequest::new(*q)))
        .collect();

    if let Some(last) = handles.last_mut() {
        last.cancel();
    }

    for (question, handle) in questions.iter().zip(handles) {
        let response = handle.await;
        println!("Q: {}\nA [{:?}]: {}\n", question, response.status, response.response);
    }

    Ok(())
}
