use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refinemail::config::Config;
use refinemail::llm::RefineClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting RefineMail...");

    let mut config = Config::load_from_default();
    config.apply_env()?;

    let client = RefineClient::from_config(&config);
    refinemail::server::serve(&config, client).await
}
