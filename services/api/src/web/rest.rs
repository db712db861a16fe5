//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    ClientEvent, QuestionView, QuizProgress, ReviewedQuestion, SessionSnapshot,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session_handler,
        post_event_handler,
    ),
    components(
        schemas(ClientEvent, SessionSnapshot, QuizProgress, QuestionView, ReviewedQuestion)
    ),
    tags(
        (name = "Socratic Tutor API", description = "Drives the learner's tutoring session.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds the session routes, restricted by CORS to the configured front-end origin.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| {
            ApiError::Internal(format!(
                "Invalid CORS origin '{}': {}",
                app_state.config.cors_origin, e
            ))
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    Ok(Router::new()
        .route("/session", get(get_session_handler))
        .route("/session/events", post(post_event_handler))
        .layer(cors)
        .with_state(app_state))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get the current session.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "The current session", body = SessionSnapshot)
    )
)]
pub async fn get_session_handler(State(app_state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    let state = app_state.driver.state().await;
    Json(SessionSnapshot::from(&state))
}

/// Apply a learner action to the session.
///
/// Responds once the action and any call it waits on (path, tutor reply, quiz) have
/// completed. Actions sent while another call is in flight leave the session unchanged,
/// except `logout`.
#[utoipa::path(
    post,
    path = "/session/events",
    request_body = ClientEvent,
    responses(
        (status = 200, description = "The session after the event", body = SessionSnapshot),
        (status = 400, description = "Malformed JSON body"),
        (status = 422, description = "Unknown event type or invalid payload")
    )
)]
pub async fn post_event_handler(
    State(app_state): State<Arc<AppState>>,
    Json(event): Json<ClientEvent>,
) -> Json<SessionSnapshot> {
    debug!("Received client event: {:?}", event);
    let state = app_state.driver.dispatch(event.into()).await;
    Json(SessionSnapshot::from(&state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_both_session_routes() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("\"/session\""));
        assert!(json.contains("\"/session/events\""));
        assert!(json.contains("ClientEvent"));
    }
}
