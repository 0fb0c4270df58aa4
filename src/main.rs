use actix_web::dev::Service;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use ws_upgrade::websocket::LocalsExt;
use ws_upgrade::{handlers, health_check, AppError, AppState, Settings, Upgrader};

#[actix_web::main]
async fn main() -> ws_upgrade::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone());
    let ws_config = state.websocket_config();

    // Both routes draw wrappers from the same pool
    let echo = Upgrader::with_pool(handlers::echo, Some(ws_config.clone()), state.pool.clone());
    let async_echo = Upgrader::with_pool(handlers::async_echo, Some(ws_config), state.pool.clone());
    let state = web::Data::new(state);

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    info!("WebSocket echo ready at ws://{}:{}/ws", config.server.host, config.server.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // Expose the peer address to websocket handlers as a local
            .wrap_fn(|req, srv| {
                if let Some(addr) = req.peer_addr() {
                    req.set_local("peer", addr.to_string());
                }
                srv.call(req)
            })
            .route("/health", web::get().to(health_check))
            .route("/ws", web::get().to(echo.clone().into_service()))
            .route("/ws/async", web::get().to(async_echo.clone().into_service()))
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
