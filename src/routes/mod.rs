use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod assessments;
pub mod auth;
pub mod conversations;
pub mod documents;
pub mod health;
pub mod matches;
pub mod notifications;
pub mod profiles;
pub mod recommendations;

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());
    let body_limit = state.config.max_upload_bytes;

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/analyze", post(documents::critique_document))
        .route(
            "/:id",
            get(documents::get_document)
                .delete(documents::delete_document)
                .patch(documents::update_document),
        )
        .route("/:id/download", get(documents::download_document))
        .route("/:id/reanalyze", post(documents::reanalyze_document));

    let matches_routes = Router::new()
        .route("/", get(matches::list_matches))
        .route("/run", post(matches::run_matches))
        .route("/:id/accept", post(matches::accept_match))
        .route("/:id/decline", post(matches::decline_match));

    let conversations_routes = Router::new()
        .route("/", get(conversations::list_conversations))
        .route(
            "/:id/messages",
            get(conversations::list_messages).post(conversations::send_message),
        );

    let assessments_routes = Router::new()
        .route("/", post(assessments::submit_assessment))
        .route("/latest", get(assessments::latest_assessment))
        .route("/generate", post(assessments::generate_assessment))
        .route(
            "/interview-questions",
            post(assessments::interview_questions),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/coach/profile",
            get(profiles::get_coach_profile).put(profiles::upsert_coach_profile),
        )
        .route(
            "/api/seeker/profile",
            get(profiles::get_seeker_profile).put(profiles::upsert_seeker_profile),
        )
        .nest("/api/documents", documents_routes)
        .nest("/api/matches", matches_routes)
        .nest("/api/conversations", conversations_routes)
        .nest("/api/assessments", assessments_routes)
        .route(
            "/api/recommendations",
            get(recommendations::get_recommendations),
        )
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route(
            "/api/notifications/stream",
            get(notifications::stream_notifications),
        )
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
}
