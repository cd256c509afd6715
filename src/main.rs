use tracing_subscriber::EnvFilter;
use twitter_sentiment::{Result, SentimentHandler, ServiceConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "sentiment service stopped");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    tracing::info!(model_dir = %config.model_dir.display(), max_len = config.max_len, "starting");

    let handler = SentimentHandler::from_config(&config)?;
    handler.warm_up()?;

    handler.serve(std::io::stdin().lock(), std::io::stdout().lock())
}
