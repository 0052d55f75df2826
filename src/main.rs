use clap::Parser; // for cli
use order_relay::config::Args;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // parse cli arguments
    let args = Args::parse();
    order_relay::run(args).await
}
