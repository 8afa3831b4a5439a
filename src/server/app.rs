use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{api_routes, message_routes};
use crate::websocket::ws_handler;

use super::{require_auth, AppState};

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let authenticated = message_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        require_auth,
    ));

    Router::new()
        // WebSocket endpoint (authenticates before upgrade)
        .route("/ws", get(ws_handler))
        .merge(api_routes())
        .nest("/api", authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
