use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::ws::ConnectParams, error::AppError, services::websocket_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "players",
    params(ConnectParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Not a member of the room"),
        (status = 404, description = "Unknown room")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session bound to one room.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Valid(Query(params)): Valid<Query<ConnectParams>>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    websocket_service::authorize(&state, &params.room, &params.username).await?;

    let ConnectParams { room, username } = params;
    Ok(ws
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, room, username))
        .into_response())
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
