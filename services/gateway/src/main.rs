use std::env;
use std::sync::Arc;

use gateway::db;
use gateway::sms::LoggingSmsGateway;
use gateway::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_owned());
    let public_ip = env::var("PUBLIC_IP").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let video_port: u16 = env::var("JT1078_PORT").unwrap_or_else(|_| "6664".to_owned()).parse().expect("JT1078_PORT must be a u16");
    let signaling_port: u16 = env::var("JT808_PORT").unwrap_or_else(|_| "6665".to_owned()).parse().expect("JT808_PORT must be a u16");

    info!("connecting to database...");
    let pool = db::create_pool(&database_url).await;

    let state = AppState::new(pool, public_ip, video_port, signaling_port, Arc::new(LoggingSmsGateway));
    let router = gateway::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.expect("failed to bind");
    info!(addr = %bind_addr, "gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("gateway shut down gracefully");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
