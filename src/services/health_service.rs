use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Check the game store and report the engine's live load.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_game_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "game store health check failed");
            }
        }
        Err(_) => warn!("game store unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded().await,
        state.connections().connection_count(),
        state.timers().pending_count(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::MemoryGameStore,
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let report = health_status(&state).await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.connections, 0);

        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        state.connections().register("ROOM01", "ana", tx);

        let report = health_status(&state).await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.connections, 1);
        assert_eq!(report.pending_timers, 0);
    }
}
