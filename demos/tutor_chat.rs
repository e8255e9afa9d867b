//! Tutor Chat Example - a single awaited chat completion
//!
//! Reads connection settings from the environment (or a `.env` file) and asks
//! the tutor one question.
//!
//! Run with: MATHTUTOR_LLM_API_KEY=sk-... cargo run --example tutor_chat -- "What is 12 x 13?"

use mathtutor_gateway::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Explain why a negative times a negative is positive.".to_string());

    let client = GatewayClient::from_env()?;
    let mut request = ChatRequest::new(question);

    let response = client.chat(&mut request).await;

    println!("Session: {}", response.session_id);
    println!("Status:  {:?}", response.status);
    println!("\n{}", response.response);

    Ok(())
}
