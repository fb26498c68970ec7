use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Whisper Back.
///
/// Socket payloads are listed as schemas: `ClientMessage` for inbound frames and the
/// event structs for the `data` field of outbound envelopes.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::delete_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rooms::CreateRoomRequest,
            crate::dto::rooms::MemberRequest,
            crate::dto::rooms::RoomSummary,
            crate::dto::rooms::LeaveRoomResponse,
            crate::dao::models::RoomStatus,
            crate::dto::ws::ClientMessage,
            crate::dto::events::GameStartedEvent,
            crate::dto::events::PublicPlayer,
            crate::dto::events::PlayerTalkState,
            crate::dto::events::TurnOrderEntry,
            crate::dto::events::RoleReveal,
            crate::dto::events::PlayerRolledDiceEvent,
            crate::dto::events::PlayerSpokenEvent,
            crate::dto::events::PlayerVotedEvent,
            crate::dto::events::IdentityAssignedEvent,
            crate::dto::events::ActionRejectedEvent,
            crate::state::phase::GamePhase,
            crate::state::game::Role,
            crate::services::voting::EliminationReason,
            crate::services::voting::Winner,
            crate::services::voting::WinCause,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lobby"),
        (name = "players", description = "WebSocket session of a room member"),
    )
)]
/// OpenAPI document of the HTTP surface.
pub struct ApiDoc;
