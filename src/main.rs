use std::panic;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use algoroom::config::Config;
use algoroom::store::{MemorySessionStore, PostgresSessionStore, SessionStore};
use algoroom::{app, cors_layer, AppState};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "algoroom=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Select the storage backend
    let store: Arc<dyn SessionStore> = match &config.db_url {
        Some(db_url) => match PostgresSessionStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to in-memory session store");
                Arc::new(MemorySessionStore::new())
            }
        },
        None => {
            warn!("No database URL configured - sessions are kept in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    let state = AppState::new(store);
    let app_routes = app(state).layer(cors_layer(config.cors_origins.as_deref()));

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!(
        "📡 WebSocket available at ws://{}/ws/sessions/{{session_id}}",
        config.server_address()
    );
    info!(
        "📚 Swagger UI available at http://{}/swagger",
        config.server_address()
    );

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
