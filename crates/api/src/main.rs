use anyhow::Context;

use storefront_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging comes up before the config is read so its warnings are kept.
    if std::env::var("APP_ENV").is_ok_and(|v| v.trim().eq_ignore_ascii_case("development")) {
        storefront_observability::init_pretty();
    } else {
        storefront_observability::init();
    }
    let config = AppConfig::from_env();

    let (app, services) = storefront_api::app::build_app(&config)
        .await
        .context("failed to wire services")?;
    let background = services
        .start_background(&config)
        .context("failed to start background workers")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    tracing::info!("shutting down background workers");
    background.shutdown().await;
    Ok(())
}
