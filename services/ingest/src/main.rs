use std::env;
use std::sync::Arc;
use std::time::Duration;

use ingest::bus::{self, AvRequestConfig};
use ingest::catalog::AllowAllCatalog;
use ingest::notify::NoopNotifier;
use ingest::registry::DeviceRegistry;
use ingest::signaling::SignalingServer;
use ingest::video::VideoServer;
use ingest::db;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Grace period given to in-flight connection tasks after the accept loops
/// are cancelled, before the process exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jt1078_port: u16 = env::var("JT1078_PORT").unwrap_or_else(|_| "6664".to_owned()).parse().expect("JT1078_PORT must be a u16");
    let jt808_addr = format!("0.0.0.0:{}", env::var("JT808_PORT").unwrap_or_else(|_| "6665".to_owned()));
    let jt1078_addr = format!("0.0.0.0:{jt1078_port}");
    let public_ip = env::var("PUBLIC_IP").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let gateway_bus_url = env::var("GATEWAY_BUS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8081/bus/ingest".to_owned());

    info!("connecting to database...");
    let pool = db::create_pool(&database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    // No sessions are live at startup, so any row still marked connected is
    // stale from an unclean shutdown.
    sqlx::query("UPDATE dashcam_connections SET is_connected = false WHERE is_connected = true")
        .execute(&pool)
        .await
        .expect("failed to reset stale connection status");

    let registry = Arc::new(DeviceRegistry::new());
    let catalog = Arc::new(AllowAllCatalog);
    let notifier = Arc::new(NoopNotifier);

    let av_cfg = AvRequestConfig { public_ip, tcp_port: jt1078_port, udp_port: jt1078_port };
    let bus_handle = bus::spawn(gateway_bus_url, registry.clone(), av_cfg);

    let signaling = SignalingServer::new(registry.clone(), pool.clone(), catalog, notifier);
    let signaling_task = tokio::spawn(async move {
        if let Err(err) = signaling.begin(&jt808_addr).await {
            tracing::error!(%err, "signaling server exited");
        }
    });

    let video = VideoServer::new(bus_handle);
    let video_task = tokio::spawn(async move {
        if let Err(err) = video.begin(&jt1078_addr).await {
            tracing::error!(%err, "video server exited");
        }
    });

    info!("ingest node running");
    shutdown_signal().await;
    info!("shutting down, waiting for in-flight connections");
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    signaling_task.abort();
    video_task.abort();
    info!("ingest node shut down");
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
