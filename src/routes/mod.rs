use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

pub mod health;
/// REST endpoints of the lobby.
pub mod rooms;
/// Game WebSocket upgrade.
pub mod websocket;

/// Compose the lobby, socket and health routes with the Swagger UI.
pub fn router(state: SharedState) -> Router<()> {
    let docs: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    health::router()
        .merge(rooms::router())
        .merge(websocket::router())
        .merge(docs)
        .with_state(state)
}
