// Entity Store Server

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use entity_store::{
    app_state::AppState,
    config::Config,
    entity_interface::create_entity_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    let entity_router = create_entity_router(app_state.store.clone());

    // Build main application router
    let app = Router::new()
        .nest("/api/v1", entity_router)
        .layer(CorsLayer::permissive());

    let addr = config.server_address();
    info!("Entity store listening on http://{}", addr);
    info!("  GET    /api/v1/entities                      - Query entities");
    info!("  POST   /api/v1/entities                      - Create entity");
    info!("  GET    /api/v1/entities/{{guid}}               - Load entity");
    info!("  PUT    /api/v1/entities/{{guid}}               - Update entity");
    info!("  DELETE /api/v1/entities/{{guid}}               - Delete entity");
    info!("  POST   /api/v1/entities/{{guid}}/disable       - Disable entity");
    info!("  POST   /api/v1/entities/{{guid}}/enable        - Enable entity");
    info!("  GET    /api/v1/entities/{{guid}}/settings      - Private settings");
    info!("  GET    /api/v1/dates                         - Creation months");
    info!("  POST   /api/v1/subtypes                      - Register subtype");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
