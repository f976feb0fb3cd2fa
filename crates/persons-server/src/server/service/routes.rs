use super::{handler, state::AppState};
use axum::{
    Router,
    routing::{MethodRouter, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

fn api_routes() -> [(&'static str, MethodRouter<AppState>); 7] {
    [
        ("/health", get(handler::health)),
        ("/check", get(handler::check)),
        ("/create_bulk", post(handler::create_bulk)),
        ("/async_create_bulk", post(handler::async_create_bulk)),
        ("/fetch_data", get(handler::fetch_data)),
        (
            "/persons",
            get(handler::list_persons).post(handler::create_person),
        ),
        (
            "/persons/{id}",
            get(handler::get_person)
                .put(handler::update_person)
                .delete(handler::delete_person),
        ),
    ]
}

/// Builds the HTTP router. Every route lives under `/api/v1` and answers with
/// or without a trailing slash.
pub fn build_router(state: AppState) -> Router {
    let api = api_routes()
        .into_iter()
        .fold(Router::new(), |router, (path, method)| {
            router
                .route(path, method.clone())
                .route(&format!("{path}/"), method)
        });

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
