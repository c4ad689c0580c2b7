use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use keystone_server::auth::handlers::{login, logout, logout_all, me, refresh};
use keystone_server::{health_check, AppState, Settings};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Interval between expired-record purge sweeps.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let settings = Settings::new().context("Failed to load configuration")?;
    info!(
        environment = %settings.environment,
        "Starting keystone server"
    );

    let state = AppState::new(settings.clone())
        .await
        .context("Failed to initialize application state")?;

    spawn_purge_task(state.clone());

    let bind_addr = (settings.server.host.clone(), settings.server.port);
    info!("Listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .route("/health", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/auth/logout_all", web::post().to(logout_all))
            .route("/auth/me", web::get().to(me))
    })
    .workers(settings.server.workers as usize)
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}

/// Periodically delete refresh-token records past expiry plus the retention
/// grace period.
fn spawn_purge_task(state: AppState) {
    tokio::spawn(async move {
        let grace = state.config.auth.retention_grace_secs;
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.auth_service.purge_expired(grace).await {
                Ok(purged) if purged > 0 => {
                    info!(purged, "purged expired refresh-token records");
                }
                Ok(_) => {}
                Err(e) => error!("purge sweep failed: {}", e),
            }
        }
    });
}
