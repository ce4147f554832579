use anyhow::Context;
use std::path::PathBuf;

// Entry point for `cargo run -p web-server`. The `matchtally serve` command
// starts the same server from the main binary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let path = std::env::var("MATCHTALLY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let settings = configuration::load_config(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let _guard = configuration::init_tracing(&settings.logging)?;

    web_server::run_server(&settings).await
}
