use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::rooms::{CreateRoomRequest, LeaveRoomResponse, MemberRequest, RoomSummary},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Lobby routes: open, inspect, join, leave and delete rooms.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{id}", get(get_room).delete(delete_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/leave", post(leave_room))
}

/// Open a room; the requester becomes its host.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomSummary),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<(StatusCode, Json<RoomSummary>), AppError> {
    let summary = room_service::create_room(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room join code")),
    responses(
        (status = 200, description = "Room found", body = RoomSummary),
        (status = 404, description = "Unknown room")
    )
)]
/// Fetch a room by join code.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::get_room(&state, &id).await?))
}

/// Join a waiting room.
#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "rooms",
    params(("id" = String, Path, description = "Room join code")),
    request_body = MemberRequest,
    responses(
        (status = 200, description = "Joined", body = RoomSummary),
        (status = 409, description = "Room full or already playing")
    )
)]
/// Add the requester to a waiting room.
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<MemberRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::join_room(&state, &id, &payload.username).await?;
    Ok(Json(summary))
}

/// Leave a room, handing the host role over when needed.
#[utoipa::path(
    post,
    path = "/rooms/{id}/leave",
    tag = "rooms",
    params(("id" = String, Path, description = "Room join code")),
    request_body = MemberRequest,
    responses((status = 200, description = "Left the room", body = LeaveRoomResponse))
)]
/// Remove the requester; the last one out closes the room.
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<MemberRequest>>,
) -> Result<Json<LeaveRoomResponse>, AppError> {
    let response = room_service::leave_room(&state, &id, &payload.username).await?;
    Ok(Json(response))
}

/// Delete a room and discard its running game. Host only.
#[utoipa::path(
    delete,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room join code")),
    request_body = MemberRequest,
    responses(
        (status = 204, description = "Room deleted"),
        (status = 401, description = "Requester is not the host")
    )
)]
/// Close a room. Host only.
pub async fn delete_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<MemberRequest>>,
) -> Result<StatusCode, AppError> {
    room_service::delete_room(&state, &id, &payload.username).await?;
    Ok(StatusCode::NO_CONTENT)
}
