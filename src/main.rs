use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;

/// Main entry point for the Nadym application
///
/// Serves the REST API (with Swagger UI) on port 3000 unless configured otherwise.
///
/// # Environment Variables
/// - `NADYM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PRACTICE_DATA_DIR`: Directory for practice records (default: "practice_data")
/// - `NADYM_ICE_SERVERS`: Comma-separated ICE server URLs handed to video clients
/// - `NADYM_AUDIO_MAX_BYTES`: Upload limit for consultation recordings
/// - `API_KEY`: API key expected in `x-api-key`; unset disables the check (logged as a warning)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nadym=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("nadym_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = api_rest::rest_addr_from_env();
    let cfg = api_rest::config_from_env()?;

    tracing::info!("++ Practice data in {}", cfg.data_dir().display());
    tracing::info!("++ Starting Nadym REST on {}", rest_addr);

    let app = api_rest::router(AppState::new(cfg, api_rest::api_key_from_env()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
