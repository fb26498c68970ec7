use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::{sync::mpsc, time::sleep};
use uuid::Uuid;
use whisper_back::{
    config::{AppConfig, PhaseDurations},
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        models::{GameEntity, PlayerEntity, Revision, RoomEntity, RoomStatus, Versioned},
        storage::{StorageError, StorageResult},
    },
    dto::{events::ServerEvent, rooms::CreateRoomRequest},
    error::ServiceError,
    services::{
        dice::ScriptedDice, game_actions, phase_engine, players::PlayerRegistry, room_service,
        session, storage_supervisor,
    },
    state::{AppState, SharedState, game::Game, phase::GamePhase},
};

const DICE: Duration = Duration::from_secs(30);
const TURN_ASSIGNMENT: Duration = Duration::from_secs(5);
const TURN: Duration = Duration::from_secs(30);
const DISCUSSION: Duration = Duration::from_secs(60);
const VOTING: Duration = Duration::from_secs(30);
const RESULTS: Duration = Duration::from_secs(8);
const PLAYERS: [&str; 3] = ["p1", "p2", "p3"];

struct Table {
    state: SharedState,
    store: Arc<dyn GameStore>,
    room_id: String,
    inboxes: Vec<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl Table {
    /// Three connected players in a waiting room hosted by `p1`; dice totals 9, 7, 11.
    async fn seat() -> Self {
        Self::seat_on(Arc::new(MemoryGameStore::new())).await
    }

    async fn seat_on(store: Arc<dyn GameStore>) -> Self {
        let config = AppConfig::default().with_phases(PhaseDurations {
            dice: DICE,
            turn_assignment: TURN_ASSIGNMENT,
            turn: TURN,
            discussion: DISCUSSION,
            voting: VOTING,
            results: RESULTS,
        });
        let dice = ScriptedDice::new([(4, 5), (3, 4), (5, 6)]);
        let state = AppState::with_dice(config, Arc::new(dice));
        state.install_game_store(Arc::clone(&store)).await;

        let room = room_service::create_room(
            &state,
            CreateRoomRequest {
                name: "Table".into(),
                username: "p1".into(),
                max_players: 6,
                max_rounds: 3,
            },
        )
        .await
        .unwrap();
        room_service::join_room(&state, &room.id, "p2").await.unwrap();
        room_service::join_room(&state, &room.id, "p3").await.unwrap();

        let inboxes = PLAYERS
            .iter()
            .map(|username| {
                let (tx, rx) = mpsc::unbounded_channel();
                state.connections().register(&room.id, username, tx);
                rx
            })
            .collect();

        Self {
            state,
            store,
            room_id: room.id,
            inboxes,
        }
    }

    async fn start(&mut self) -> Game {
        let game = session::start_game(&self.state, &self.room_id, "p1")
            .await
            .unwrap();
        self.drain_all();
        game
    }

    async fn game(&self) -> Game {
        let id = self
            .store
            .find_game_for_room(self.room_id.clone())
            .await
            .unwrap()
            .expect("game running");
        self.store.find_game(id).await.unwrap().unwrap().into()
    }

    fn registry(&self) -> PlayerRegistry {
        PlayerRegistry::new(Arc::clone(&self.store), 16)
    }

    /// Events received by `p1` since the last drain.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inboxes[0].try_recv() {
            events.push(event);
        }
        events
    }

    fn drain_all(&mut self) {
        for inbox in &mut self.inboxes {
            while inbox.try_recv().is_ok() {}
        }
    }

    async fn roll_all(&mut self) {
        for username in PLAYERS {
            game_actions::roll_dice(&self.state, &self.room_id, username)
                .await
                .unwrap();
        }
    }
}

/// Memory store whose operations can be made to fail on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryGameStore,
    fail_list_players: AtomicBool,
    fail_save_game: AtomicBool,
    fail_insert_player: AtomicBool,
    fail_health: AtomicBool,
    /// Writes to this player are refused.
    refused_player: Mutex<Option<String>>,
}

impl FlakyStore {
    fn set(flag: &AtomicBool, failing: bool) {
        flag.store(failing, Ordering::SeqCst);
    }

    fn refuse_writes_to(&self, username: Option<&str>) {
        *self.refused_player.lock().unwrap() = username.map(str::to_owned);
    }
}

fn refused<T: Send + 'static>(operation: &str) -> BoxFuture<'static, StorageResult<T>> {
    let err = StorageError::unavailable(
        format!("{operation} refused"),
        io::Error::other("store offline"),
    );
    Box::pin(async move { Err(err) })
}

impl GameStore for FlakyStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_room(room)
    }
    fn find_room(&self, id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        self.inner.find_room(id)
    }
    fn delete_room(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_room(id)
    }
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        if self.fail_save_game.load(Ordering::SeqCst) {
            return refused("save_game");
        }
        self.inner.save_game(game)
    }
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game(id)
    }
    fn find_game_for_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        self.inner.find_game_for_room(room_id)
    }
    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        self.inner.list_active_games()
    }
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_game(id)
    }
    fn insert_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        if self.fail_insert_player.load(Ordering::SeqCst) {
            return refused("insert_player");
        }
        self.inner.insert_player(game_id, player)
    }
    fn find_player(
        &self,
        game_id: Uuid,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>> {
        self.inner.find_player(game_id, username)
    }
    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        if self.fail_list_players.load(Ordering::SeqCst) {
            return refused("list_players");
        }
        self.inner.list_players(game_id)
    }
    fn replace_player(
        &self,
        game_id: Uuid,
        player: PlayerEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let refuse = self.refused_player.lock().unwrap().as_deref() == Some(player.username.as_str());
        if refuse {
            return refused("replace_player");
        }
        self.inner.replace_player(game_id, player, expected)
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        if self.fail_health.load(Ordering::SeqCst) {
            return refused("health_check");
        }
        self.inner.health_check()
    }
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

fn phase_changes(events: &[ServerEvent]) -> Vec<&Value> {
    events
        .iter()
        .filter(|event| event.event == "phaseChanged")
        .map(|event| &event.data)
        .collect()
}

fn turn_order(data: &Value) -> Vec<&str> {
    data["turnOrder"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["username"].as_str().unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn full_round_with_tied_vote_rotates_speaking_order() {
    let mut table = Table::seat().await;
    table.start().await;

    table.roll_all().await;
    let events = table.drain();
    let rolled: Vec<_> = events
        .iter()
        .filter(|event| event.event == "playerRolledDice")
        .map(|event| event.data["username"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(rolled, PLAYERS);
    let changes = phase_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["phase"], "TURN_ASSIGNMENT");
    assert_eq!(turn_order(changes[0]), ["p3", "p1", "p2"]);
    assert_eq!(changes[0]["turnOrder"][0]["total"], 11);

    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Game);
    assert_eq!(game.turn_index, 0);

    for (index, speaker) in ["p3", "p1", "p2"].into_iter().enumerate() {
        let events = table.drain();
        let changes = phase_changes(&events);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["phase"], "GAME");
        assert_eq!(changes[0]["currentPlayer"], speaker);
        assert_eq!(changes[0]["turnIndex"], index);

        game_actions::confirm_word(&table.state, &table.room_id, speaker)
            .await
            .unwrap();
    }

    let events = table.drain();
    let spoken: Vec<_> = events
        .iter()
        .filter(|event| event.event == "playerSpoken")
        .collect();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].data["nextIndex"], 3);
    assert_eq!(phase_changes(&events)[0]["phase"], "DISCUSSION");

    sleep(DISCUSSION + Duration::from_secs(1)).await;
    assert_eq!(table.game().await.phase, GamePhase::Voting);
    table.drain();

    game_actions::submit_vote(&table.state, &table.room_id, "p1", Some("p2".into()))
        .await
        .unwrap();
    game_actions::submit_vote(&table.state, &table.room_id, "p2", Some("p1".into()))
        .await
        .unwrap();
    game_actions::submit_vote(&table.state, &table.room_id, "p3", None)
        .await
        .unwrap();

    let events = table.drain();
    assert_eq!(
        events
            .iter()
            .filter(|event| event.event == "playerVoted")
            .count(),
        3
    );
    let changes = phase_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["phase"], "RESULTS");
    assert_eq!(changes[0]["reason"], "tie");
    assert_eq!(changes[0]["eliminated"], Value::Null);

    sleep(RESULTS + Duration::from_secs(1)).await;
    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::TurnAssignment);
    assert_eq!(game.round, 2);

    let events = table.drain();
    let changes = phase_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["round"], 2);
    assert_eq!(turn_order(changes[0]), ["p1", "p2", "p3"]);

    let players = table.registry().list(game.id).await.unwrap();
    assert!(players.iter().all(|player| player.is_alive));
    assert!(players.iter().all(|player| !player.has_spoken && !player.has_voted));
    assert!(players.iter().all(|player| player.votes_received == 0));
    assert_eq!(table.state.timers().pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dice_deadline_rolls_for_stragglers() {
    let mut table = Table::seat().await;
    table.start().await;

    game_actions::roll_dice(&table.state, &table.room_id, "p1")
        .await
        .unwrap();
    let err = game_actions::roll_dice(&table.state, &table.room_id, "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    table.drain();

    sleep(DICE + Duration::from_secs(1)).await;

    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::TurnAssignment);
    let players = table.registry().list(game.id).await.unwrap();
    assert!(players.iter().all(|player| player.has_rolled));

    let events = table.drain();
    let forced: Vec<_> = events
        .iter()
        .filter(|event| event.event == "playerRolledDice")
        .map(|event| {
            (
                event.data["username"].as_str().unwrap().to_owned(),
                event.data["dice1"].as_u64().unwrap(),
                event.data["dice2"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        forced,
        [("p2".to_owned(), 3, 4), ("p3".to_owned(), 5, 6)]
    );
    assert_eq!(turn_order(phase_changes(&events)[0]), ["p3", "p1", "p2"]);
}

#[tokio::test(start_paused = true)]
async fn speaking_turns_are_gated_and_forced_on_deadline() {
    let mut table = Table::seat().await;
    table.start().await;
    table.roll_all().await;
    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    table.drain_all();

    let before = table.game().await;
    let err = game_actions::confirm_word(&table.state, &table.room_id, "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let after = table.game().await;
    assert_eq!(after.turn_index, before.turn_index);
    assert_eq!(after.epoch, before.epoch);
    assert!(table.drain().is_empty());

    // p3 never confirms: the deadline moves the floor to p1
    sleep(TURN + Duration::from_secs(1)).await;
    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Game);
    assert_eq!(game.turn_index, 1);

    let events = table.drain();
    assert_eq!(events[0].event, "playerSpoken");
    assert_eq!(events[0].data["username"], "p3");
    assert_eq!(phase_changes(&events)[0]["currentPlayer"], "p1");

    let p3 = table.registry().find(game.id, "p3").await.unwrap();
    assert!(p3.has_spoken);
}

#[tokio::test(start_paused = true)]
async fn last_vote_racing_the_deadline_transitions_once() {
    let mut table = Table::seat().await;
    table.start().await;
    table.roll_all().await;
    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    for speaker in ["p3", "p1", "p2"] {
        game_actions::confirm_word(&table.state, &table.room_id, speaker)
            .await
            .unwrap();
    }

    // wakes on the very tick the voting deadline fires
    let state = Arc::clone(&table.state);
    let room_id = table.room_id.clone();
    let late_vote = tokio::spawn(async move {
        sleep(DISCUSSION + VOTING).await;
        game_actions::submit_vote(&state, &room_id, "p3", Some("p1".into())).await
    });

    sleep(DISCUSSION + Duration::from_secs(1)).await;
    assert_eq!(table.game().await.phase, GamePhase::Voting);
    game_actions::submit_vote(&table.state, &table.room_id, "p1", Some("p2".into()))
        .await
        .unwrap();
    game_actions::submit_vote(&table.state, &table.room_id, "p2", Some("p1".into()))
        .await
        .unwrap();
    let voting_epoch = table.game().await.epoch;
    table.drain_all();

    sleep(VOTING).await;
    // either outcome is fine: the vote won, or the deadline abstained for p3 first
    let _ = late_vote.await.unwrap();

    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Results);
    assert_eq!(game.epoch, voting_epoch + 1);

    let events = table.drain();
    let changes = phase_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["phase"], "RESULTS");
    assert_eq!(table.state.timers().pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn elimination_ends_the_game_and_reveals_roles() {
    let mut table = Table::seat().await;
    table.start().await;
    table.roll_all().await;
    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    for speaker in ["p3", "p1", "p2"] {
        game_actions::confirm_word(&table.state, &table.room_id, speaker)
            .await
            .unwrap();
    }
    sleep(DISCUSSION + Duration::from_secs(1)).await;

    let err = game_actions::submit_vote(&table.state, &table.room_id, "p1", Some("p1".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    game_actions::submit_vote(&table.state, &table.room_id, "p1", Some("p3".into()))
        .await
        .unwrap();
    let err = game_actions::submit_vote(&table.state, &table.room_id, "p1", Some("p2".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    game_actions::submit_vote(&table.state, &table.room_id, "p2", Some("p3".into()))
        .await
        .unwrap();
    game_actions::submit_vote(&table.state, &table.room_id, "p3", Some("p1".into()))
        .await
        .unwrap();

    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Results);
    let players = table.registry().list(game.id).await.unwrap();
    let p3 = players.iter().find(|player| player.username == "p3").unwrap();
    assert!(!p3.is_alive);
    assert_eq!(p3.order, None);
    assert_eq!(p3.votes_received, 2);
    let p3_was_impostor = p3.role == whisper_back::state::game::Role::Impostor;
    table.drain_all();

    // one civilian against one impostor, or no impostor left: either way the game ends
    sleep(RESULTS + Duration::from_secs(1)).await;

    let events = table.drain();
    let finish = phase_changes(&events)
        .into_iter()
        .find(|data| data["phase"] == "FINISH")
        .expect("final phase broadcast");
    let expected = if p3_was_impostor {
        ("civilians", "impostorsEliminated")
    } else {
        ("impostors", "parity")
    };
    assert_eq!(finish["winner"], expected.0);
    assert_eq!(finish["cause"], expected.1);
    assert_eq!(finish["roles"].as_array().unwrap().len(), 3);
    assert!(finish.get("endTime").is_none());

    assert!(
        table
            .store
            .find_game_for_room(table.room_id.clone())
            .await
            .unwrap()
            .is_none()
    );
    assert!(table.store.list_active_games().await.unwrap().is_empty());
    let room = room_service::get_room(&table.state, &table.room_id)
        .await
        .unwrap();
    assert_eq!(room.status, RoomStatus::Finished);
    assert!(!table.state.timers().is_pending(&table.room_id));
}

#[tokio::test(start_paused = true)]
async fn failed_dice_deadline_is_retried_once_the_store_recovers() {
    let flaky = Arc::new(FlakyStore::default());
    let mut table = Table::seat_on(flaky.clone()).await;
    table.start().await;

    FlakyStore::set(&flaky.fail_list_players, true);
    sleep(DICE + Duration::from_secs(1)).await;
    assert_eq!(table.game().await.phase, GamePhase::Dice);
    assert!(table.state.timers().is_pending(&table.room_id));

    FlakyStore::set(&flaky.fail_list_players, false);
    sleep(Duration::from_secs(3)).await;

    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::TurnAssignment);
    let players = table.registry().list(game.id).await.unwrap();
    assert!(players.iter().all(|player| player.has_rolled));
    assert!(table.state.timers().is_pending(&table.room_id));
}

#[tokio::test(start_paused = true)]
async fn failed_turn_handoff_keeps_the_turn_deadline() {
    let flaky = Arc::new(FlakyStore::default());
    let mut table = Table::seat_on(flaky.clone()).await;
    table.start().await;
    table.roll_all().await;
    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    let before = table.game().await;
    assert_eq!(before.phase, GamePhase::Game);

    FlakyStore::set(&flaky.fail_save_game, true);
    let err = game_actions::confirm_word(&table.state, &table.room_id, "p3")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));
    FlakyStore::set(&flaky.fail_save_game, false);

    assert_eq!(table.game().await.epoch, before.epoch);
    assert!(table.state.timers().is_pending(&table.room_id));
    table.drain_all();

    sleep(TURN + Duration::from_secs(1)).await;
    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Game);
    assert_eq!(game.turn_index, 1);
    let events = table.drain();
    assert_eq!(phase_changes(&events)[0]["currentPlayer"], "p1");
}

#[tokio::test(start_paused = true)]
async fn failed_start_leaves_the_room_ready_for_another_try() {
    let flaky = Arc::new(FlakyStore::default());
    let mut table = Table::seat_on(flaky.clone()).await;

    FlakyStore::set(&flaky.fail_insert_player, true);
    let err = session::start_game(&table.state, &table.room_id, "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));

    assert!(
        table
            .store
            .find_game_for_room(table.room_id.clone())
            .await
            .unwrap()
            .is_none()
    );
    assert!(table.store.list_active_games().await.unwrap().is_empty());
    let room = room_service::get_room(&table.state, &table.room_id)
        .await
        .unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    assert!(!table.state.timers().is_pending(&table.room_id));

    FlakyStore::set(&flaky.fail_insert_player, false);
    let game = table.start().await;
    assert_eq!(game.phase, GamePhase::Dice);
    assert_eq!(table.registry().list(game.id).await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn voting_deadline_abstains_for_everyone_it_can() {
    let flaky = Arc::new(FlakyStore::default());
    let mut table = Table::seat_on(flaky.clone()).await;
    table.start().await;
    table.roll_all().await;
    sleep(TURN_ASSIGNMENT + Duration::from_secs(1)).await;
    for speaker in ["p3", "p1", "p2"] {
        game_actions::confirm_word(&table.state, &table.room_id, speaker)
            .await
            .unwrap();
    }
    sleep(DISCUSSION + Duration::from_secs(1)).await;
    assert_eq!(table.game().await.phase, GamePhase::Voting);

    flaky.refuse_writes_to(Some("p2"));
    sleep(VOTING).await;

    let game = table.game().await;
    assert_eq!(game.phase, GamePhase::Results);
    flaky.refuse_writes_to(None);

    let players = table.registry().list(game.id).await.unwrap();
    let abstained: Vec<_> = players
        .iter()
        .filter(|player| player.has_voted)
        .map(|player| player.username.as_str())
        .collect();
    assert_eq!(abstained, ["p1", "p3"]);
}

#[tokio::test(start_paused = true)]
async fn reconnecting_store_rearms_lost_deadlines() {
    let flaky = Arc::new(FlakyStore::default());
    let mut table = Table::seat_on(flaky.clone()).await;
    table.start().await;

    let store: Arc<dyn GameStore> = flaky.clone();
    let supervisor = tokio::spawn(storage_supervisor::run(
        Arc::clone(&table.state),
        move || {
            let store = Arc::clone(&store);
            async move { Ok::<_, StorageError>(store) }
        },
    ));
    sleep(Duration::from_secs(1)).await;

    // the deadline was lost while the store was down
    phase_engine::clear_timer(&table.state, &table.room_id);
    FlakyStore::set(&flaky.fail_health, true);
    sleep(Duration::from_secs(6)).await;
    FlakyStore::set(&flaky.fail_health, false);
    assert!(table.state.timers().is_pending(&table.room_id));

    sleep(DICE).await;
    assert_eq!(table.game().await.phase, GamePhase::TurnAssignment);
    supervisor.abort();
}
