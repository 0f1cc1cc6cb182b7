//! Router assembly: HTTP API, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::error::ApiError;
use crate::state::AppState;

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod chat;
pub mod quiz;
pub mod ws;

/// JSON body extractor whose rejections use the API's `{"message"}` shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query-string extractor with the same rejection shape as `ApiJson`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "API route not found" })))
}

fn api_routes() -> Router<Arc<AppState>> {
    let auth = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/make-admin/:user_id", post(auth::make_admin))
        .route("/me", get(auth::me));

    let chat = Router::new()
        .route("/categories", get(chat::categories))
        .route("/modules", get(chat::modules))
        .route("/start", post(chat::start))
        .route("/answer", post(chat::answer))
        .route("/conversation", post(chat::conversation))
        .route("/notes/:category_id", get(chat::notes));

    let quiz = Router::new()
        .route("/categories", get(quiz::categories))
        .route("/categories/:category_id/questions", get(quiz::questions))
        .route("/submit", post(quiz::submit))
        .route("/history", get(quiz::history));

    let analytics = Router::new()
        .route("/overview", get(analytics::overview))
        .route("/my-stats", get(analytics::my_stats))
        .route("/user/:user_id", get(analytics::user))
        .route("/admin-dashboard", get(analytics::admin_dashboard));

    let admin = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/:id", put(admin::update_user).delete(admin::delete_user))
        .route("/courses", get(admin::list_courses).post(admin::create_course))
        .route("/courses/:id", put(admin::update_course).delete(admin::delete_course))
        .route("/questions", get(admin::list_questions).post(admin::create_question))
        .route("/questions/generate", post(admin::generate_question))
        .route("/questions/:id", delete(admin::delete_question))
        .route("/categories", get(admin::categories))
        .route("/sessions/:id", delete(admin::delete_session));

    Router::new()
        .nest("/auth", auth)
        .nest("/chat", chat)
        .nest("/quiz", quiz)
        .nest("/analytics", analytics)
        .nest("/admin", admin)
        .route("/dashboard", get(quiz::dashboard))
        .fallback(api_not_found)
}

/// Build the application router with:
/// - REST API under `/api/...` (unknown API paths answer 404 JSON)
/// - WebSocket at `/ws?token=...`
/// - Static SPA from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
