use anyhow::Result;
use axum::Router;
use campuseats::{app_state::AppState, bootstrap, config, db, routes, swagger};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use tower_http::trace::TraceLayer;

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let port = config.server.port;
    let state = AppState::init(config).await?;

    let routes = routes::auth::routes_with_openapi(state.clone())
        .merge(routes::vendors::routes_with_openapi(state.clone()))
        .merge(routes::menu::routes_with_openapi(state.clone()))
        .merge(routes::orders::routes_with_openapi(state.clone()))
        .merge(routes::payments::routes_with_openapi(state.clone()));

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("CampusEats API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .with_state(state)
        .layer(tower::ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    bootstrap::serve("CampusEats", app, port).await
}
