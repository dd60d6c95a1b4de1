use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use plant_doctor::api::{middleware::ApiKeyAuth, AppState};
use plant_doctor::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use plant_doctor::config::AppConfig;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Plant Doctor server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::from_config(&config).await {
        Ok(s) => web::Data::new(s),
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(secs) = config.session.idle_timeout_secs {
        let store = state.store.clone();
        let max_idle = Duration::from_secs(secs);
        actix_web::rt::spawn(async move {
            let mut tick = tokio::time::interval(max_idle.min(Duration::from_secs(60)).max(Duration::from_secs(1)));
            loop {
                tick.tick().await;
                store.purge_idle(max_idle).await;
            }
        });
        info!(idle_timeout_secs = secs, "Idle session expiry enabled");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let upload_dir = config.storage.upload_dir.clone();
    let api_keys = config.auth.api_keys.clone();

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(ApiKeyAuth::new(api_keys.clone()))
            .wrap(Cors::permissive())
            .configure(plant_doctor::api::routes::configure)
            .configure(plant_doctor::api::websocket::configure)
            .service(actix_files::Files::new("/uploads", &upload_dir))
    })
    .bind((host, port))?
    .run()
    .await
}
