use chat_adapter::config::config_search_paths;
use chat_adapter::{build_router, AppState, ProxyConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-adapter",
    about = "OpenAI-compatible chat completions proxy for a single upstream chat service",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream endpoint URL (overrides config)
    #[arg(long)]
    upstream_url: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_adapter=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        println!("Client API keys are read from $API_KEYS (or $API_KEY), comma-separated.");
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;
    config.apply_env();

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.upstream_url {
        config.upstream.url = url;
    }
    config.validate()?;

    if !config.auth_enabled() {
        warn!("No API keys configured (API_KEYS / API_KEY); all /v1 requests are accepted without authentication");
    }

    info!("chat-adapter v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:     {}", config.upstream.url);
    info!("  Model naming: {:?}", config.upstream.model_naming);
    info!("  API keys:     {}", config.api_keys.len());
    info!("  Port:         {}", config.port);

    let port = config.port;
    let state = Arc::new(AppState::new(config)?);

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
