pub mod config;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::trace::TraceLayer;

use duet_gateway::connection;
use duet_gateway::reactor::ReactorHandle;

/// HTTP surface: a WebSocket upgrade at `/` and `/ws`, nothing else.
pub fn app(reactor: ReactorHandle) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
        .with_state(reactor)
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    State(reactor): State<ReactorHandle>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, reactor))
}
