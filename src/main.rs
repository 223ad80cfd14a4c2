use clap::Parser; // for cli
use tracing_subscriber::{EnvFilter, fmt};
use waitlist_gateway::{config::Args, start_server};

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();

    start_server(args).await
}
