use drive_server::config::{config_path_from_env, load_or_create_config};
use drive_server::{Server, ServerResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "drive_server=info,catalog=info,tower_http=info";

#[tokio::main]
async fn main() -> ServerResult<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path_from_env();
    let config = load_or_create_config(&config_path)?;
    tracing::info!(
        config = %config_path.display(),
        root = %config.drive_root.display(),
        scratch = %config.scratch_dir.display(),
        "loaded configuration"
    );

    let mut server = Server::start(&config).await?;
    tracing::info!(addr = %server.addr(), "drive server listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown()
}
