/// Dice rolls and speaking order.
pub mod dice;
/// OpenAPI documentation generation.
pub mod documentation;
/// Room fan-out of game events.
pub mod events;
/// Player actions received over the room socket.
pub mod game_actions;
/// Health check service.
pub mod health_service;
/// Timed phase starts and deadline dispatch.
pub mod phase_engine;
/// Per-game player records with optimistic updates.
pub mod players;
/// Natural and forced phase progression.
pub mod progression;
/// Lobby operations.
pub mod room_service;
/// Game start, finish, teardown and resume.
pub mod session;
/// Storage connection supervisor.
pub mod storage_supervisor;
/// Elimination and win conditions.
pub mod voting;
/// Player WebSocket lifecycle.
pub mod websocket_service;
