//! services/api/src/bin/api.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::Router;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutor_api_lib::{
    adapters::{OpenAiTutorAdapter, SqliteKvStore, TutorModels},
    config::Config,
    error::ApiError,
    web::{
        driver::{Clock, SessionDriver},
        rest::ApiDoc,
        router,
        state::AppState,
    },
};
use tutor_core::{FallbackGateway, SessionRepository};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Store & Run Migrations ---
    info!("Opening session store at {}...", config.database_url);
    let store = SqliteKvStore::connect(&config.database_url).await?;
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Tutor Gateway ---
    let credentials = config.llm_credentials()?;
    let mut openai_config = OpenAIConfig::new().with_api_key(credentials.api_key);
    if let Some(api_base) = credentials.api_base {
        info!("Using LLM endpoint {}", api_base);
        openai_config = openai_config.with_api_base(api_base);
    }
    let openai_client = Client::with_config(openai_config);

    let tutor_adapter = OpenAiTutorAdapter::new(
        openai_client,
        TutorModels {
            curriculum: config.curriculum_model.clone(),
            tutor: config.tutor_model.clone(),
            quiz: config.quiz_model.clone(),
        },
    );
    let gateway = Arc::new(FallbackGateway::new(tutor_adapter));

    // --- 4. Restore the Session & Build the Shared AppState ---
    let repository = SessionRepository::new(Arc::new(store));
    let driver = SessionDriver::boot(gateway, repository, Clock::System).await;
    let app_state = Arc::new(AppState {
        config: config.clone(),
        driver,
    });

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state)?)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
