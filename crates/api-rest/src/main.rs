//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Handy during development when you want the REST server without the workspace's `nadym`
//! launcher. Both read the same environment variables.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the Nadym REST API server
///
/// # Environment Variables
/// - `NADYM_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `PRACTICE_DATA_DIR`: Record directory (default: `practice_data`, created if missing)
/// - `NADYM_ICE_SERVERS`: Comma-separated ICE server URLs
/// - `NADYM_AUDIO_MAX_BYTES`: Largest accepted recording upload
/// - `API_KEY`: Shared key expected in `x-api-key`; unset disables the check
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("nadym_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = api_rest::rest_addr_from_env();
    let cfg = api_rest::config_from_env()?;
    let app = api_rest::router(api_rest::AppState::new(cfg, api_rest::api_key_from_env()));

    tracing::info!("-- Starting Nadym REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
