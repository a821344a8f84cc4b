use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use smartcam_core::port_manager::{PortManager, TcpPortProbe};
use smartcam_db::models::user::{CreateUser, ROLE_ADMIN};
use smartcam_db::repositories::UserRepo;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartcam_api::auth::password::{hash_password, validate_password_strength, MIN_PASSWORD_LENGTH};
use smartcam_api::background;
use smartcam_api::config::ServerConfig;
use smartcam_api::router::build_app_router;
use smartcam_api::state::AppState;
use smartcam_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartcam_api=debug,smartcam_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = ?config.port,
        pico_tokens = config.devices.tokens.count(smartcam_core::device::DeviceKind::Pico),
        esp32cam_tokens = config.devices.tokens.count(smartcam_core::device::DeviceKind::Esp32Cam),
        "Loaded server configuration"
    );

    // --- Database ---
    let pool = smartcam_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open database");
    tracing::info!("Database connection pool created");

    smartcam_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    bootstrap_admin(&pool, &config).await;

    // --- Port manager ---
    let port_manager = Arc::new(
        PortManager::new(
            config.ports.range_start,
            config.ports.range_end,
            config.ports.state_path.clone(),
            Arc::new(TcpPortProbe),
        )
        .expect("Failed to initialise port manager"),
    );
    let port = match config.port {
        Some(port) => port,
        None => port_manager
            .pick_port()
            .expect("No free port in the configured range"),
    };

    // --- App state ---
    let config = Arc::new(config);
    let state = AppState::new(pool, Arc::clone(&config), Arc::clone(&port_manager));
    let ws_manager = Arc::clone(&state.ws_manager);
    let shutdown = state.shutdown.clone();

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), cancel.clone());
    let cleanup_handle = ws::start_cleanup(Arc::clone(&ws_manager), cancel.clone());
    let refresh_handle = tokio::spawn(background::port_refresh::run(
        Arc::clone(&port_manager),
        config.ports.refresh_interval,
        cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse().expect("Invalid HOST address"), port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    cancel.cancel();
    for handle in [heartbeat_handle, cleanup_handle, refresh_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Background tasks stopped");

    if config.port.is_none() {
        if let Err(e) = port_manager.release_port() {
            tracing::error!(error = %e, "Failed to release port");
        }
    }
    port_manager.log_stop();

    tracing::info!("Graceful shutdown complete");
}

/// Create the first admin account from `ADMIN_USERNAME`/`ADMIN_PASSWORD`
/// when the users table is empty.
async fn bootstrap_admin(pool: &smartcam_db::DbPool, config: &ServerConfig) {
    let count = UserRepo::count(pool).await.expect("Failed to count users");
    if count > 0 {
        return;
    }
    let Some((username, password)) = &config.bootstrap_admin else {
        tracing::warn!("No users exist and ADMIN_USERNAME/ADMIN_PASSWORD are unset");
        return;
    };
    if let Err(reason) = validate_password_strength(password, MIN_PASSWORD_LENGTH) {
        panic!("ADMIN_PASSWORD rejected: {reason}");
    }

    let password_hash = hash_password(password).expect("Failed to hash admin password");
    let admin = UserRepo::create(
        pool,
        &CreateUser {
            username: username.clone(),
            password_hash,
            role: ROLE_ADMIN.to_string(),
        },
    )
    .await
    .expect("Failed to create admin user");
    tracing::info!(user_id = admin.id, username = %admin.username, "Bootstrap admin created");
}

/// Wait for a termination signal to initiate graceful shutdown, then cancel
/// `shutdown` so open streaming responses finish.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
    shutdown.cancel();
}
