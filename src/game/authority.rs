//! Match authority runtime
//!
//! Each room runs in its own task that owns the [`Room`] and applies commands
//! one at a time, so no locking is needed around room state. Requests carry a
//! oneshot reply: a rejection goes back to the requester and nobody else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::RoomError;
use super::room::{Entrant, Outbound, PlayerId, Room, RoomId, RoomRules};
use crate::combat::{Vec2, WeaponCatalog};
use crate::util::time::ROUND_TICK;
use crate::ws::protocol::{PlayerUpdate, RoomSettings, RoomStatus, RoomSummary, ServerMsg, Visibility};

/// Per-connection outbound queue depth
pub const OUTBOX_CAPACITY: usize = 256;
/// Per-room command queue depth
const COMMAND_CAPACITY: usize = 256;

/// Requests a member can make of its current room
#[derive(Debug, Clone)]
pub enum RoomAction {
    Ready,
    Start,
    GameUpdate(PlayerUpdate),
    Damage {
        target: PlayerId,
        amount: f32,
        attacker: Option<PlayerId>,
    },
    Respawn,
    PickupWeapon {
        uuid: Uuid,
    },
    SpawnWeapon {
        uuid: Option<Uuid>,
        weapon_id: String,
        position: Vec2,
    },
    CloseSlot {
        index: usize,
    },
    IncreaseMaxPlayers,
    Leave,
}

enum Request {
    Join {
        entrant: Entrant,
        code: Option<String>,
        outbox: mpsc::Sender<ServerMsg>,
    },
    Action(RoomAction),
}

struct RoomCommand {
    player: PlayerId,
    request: Request,
    reply: oneshot::Sender<Result<(), RoomError>>,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    cmd_tx: mpsc::Sender<RoomCommand>,
    summary: watch::Receiver<RoomSummary>,
}

impl RoomHandle {
    /// Latest published summary
    pub fn summary(&self) -> RoomSummary {
        self.summary.borrow().clone()
    }

    async fn request(&self, player: PlayerId, request: Request) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand {
                player,
                request,
                reply,
            })
            .await
            .map_err(|_| RoomError::RoomNotFound)?;
        rx.await.map_err(|_| RoomError::RoomNotFound)?
    }
}

/// Registry of all live rooms and connected players
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
    player_rooms: Arc<DashMap<PlayerId, RoomId>>,
    outboxes: DashMap<PlayerId, mpsc::Sender<ServerMsg>>,
    catalog: Arc<WeaponCatalog>,
    rules: RoomRules,
    round_tick: Duration,
}

impl RoomRegistry {
    pub fn new(catalog: Arc<WeaponCatalog>, rules: RoomRules) -> Self {
        Self::with_round_tick(catalog, rules, ROUND_TICK)
    }

    /// Registry whose round timers tick every `round_tick` instead of once a second
    pub fn with_round_tick(catalog: Arc<WeaponCatalog>, rules: RoomRules, round_tick: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            player_rooms: Arc::new(DashMap::new()),
            outboxes: DashMap::new(),
            catalog,
            rules,
            round_tick,
        }
    }

    pub fn catalog(&self) -> &Arc<WeaponCatalog> {
        &self.catalog
    }

    /// Register a connection and return its outbound queue
    pub fn connect(&self, player: PlayerId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.outboxes.insert(player, tx);
        debug!(player_id = %player, "Player connected");
        rx
    }

    /// Leave any room and drop the connection's outbox
    pub async fn disconnect(&self, player: PlayerId) {
        if self.player_rooms.contains_key(&player) {
            if let Err(e) = self.leave_room(player).await {
                debug!(player_id = %player, "Leave on disconnect failed: {}", e);
            }
        }
        self.outboxes.remove(&player);
        debug!(player_id = %player, "Player disconnected");
    }

    /// Send a message straight to one connection
    pub fn notify(&self, player: PlayerId, msg: ServerMsg) {
        if let Some(tx) = self.outboxes.get(&player) {
            deliver(player, tx.value(), msg);
        }
    }

    pub fn room_of(&self, player: PlayerId) -> Option<RoomId> {
        self.player_rooms.get(&player).map(|r| *r.value())
    }

    pub fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_players(&self) -> usize {
        self.outboxes.len()
    }

    /// Public rooms for the lobby list
    pub fn public_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|r| r.value().summary())
            .filter(|s| s.visibility == Visibility::Public && s.players > 0)
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rooms
    }

    /// Create a room hosted by `player` and start its task
    pub fn create_room(
        self: &Arc<Self>,
        player: PlayerId,
        nickname: String,
        character: String,
        settings: RoomSettings,
    ) -> Result<RoomId, RoomError> {
        if self.player_rooms.contains_key(&player) {
            return Err(RoomError::AlreadyInRoom);
        }
        let outbox = match self.outboxes.get(&player) {
            Some(tx) => tx.value().clone(),
            None => {
                warn!(player_id = %player, "Create room from unknown connection");
                return Err(RoomError::RoomNotFound);
            }
        };

        let id = Uuid::new_v4();
        let host = Entrant {
            id: player,
            nickname,
            character,
        };
        let (room, initial) = Room::new(
            id,
            host,
            settings,
            self.rules,
            Arc::clone(&self.catalog),
            rand::random(),
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (summary_tx, summary_rx) = watch::channel(room.summary());
        self.rooms.insert(
            id,
            RoomHandle {
                id,
                cmd_tx,
                summary: summary_rx,
            },
        );
        self.player_rooms.insert(player, id);

        let task = RoomTask {
            room,
            cmd_rx,
            members: HashMap::from([(player, outbox)]),
            summary_tx,
            player_rooms: Arc::clone(&self.player_rooms),
            round_tick: self.round_tick,
        };
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            task.run(initial).await;
            registry.rooms.remove(&id);
        });

        Ok(id)
    }

    pub async fn join_room(
        &self,
        player: PlayerId,
        room_id: RoomId,
        nickname: String,
        character: String,
        code: Option<String>,
    ) -> Result<(), RoomError> {
        if self.player_rooms.contains_key(&player) {
            return Err(RoomError::AlreadyInRoom);
        }
        let handle = self.get(&room_id).ok_or(RoomError::RoomNotFound)?;
        let outbox = self
            .outboxes
            .get(&player)
            .map(|tx| tx.value().clone())
            .ok_or(RoomError::RoomNotFound)?;

        let entrant = Entrant {
            id: player,
            nickname,
            character,
        };
        handle
            .request(
                player,
                Request::Join {
                    entrant,
                    code,
                    outbox,
                },
            )
            .await
    }

    /// Apply an action to the player's current room
    pub async fn act(&self, player: PlayerId, action: RoomAction) -> Result<(), RoomError> {
        let room_id = self.room_of(player).ok_or(RoomError::RoomNotFound)?;
        let handle = self.get(&room_id).ok_or(RoomError::RoomNotFound)?;
        handle.request(player, Request::Action(action)).await
    }

    pub async fn leave_room(&self, player: PlayerId) -> Result<(), RoomError> {
        self.act(player, RoomAction::Leave).await
    }
}

/// Queue a message without blocking the room on a slow client
fn deliver(player: PlayerId, tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
    match tx.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(player_id = %player, "Client lagged, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player_id = %player, "Outbox closed");
        }
    }
}

/// The task that owns one room
struct RoomTask {
    room: Room,
    cmd_rx: mpsc::Receiver<RoomCommand>,
    members: HashMap<PlayerId, mpsc::Sender<ServerMsg>>,
    summary_tx: watch::Sender<RoomSummary>,
    player_rooms: Arc<DashMap<PlayerId, RoomId>>,
    round_tick: Duration,
}

impl RoomTask {
    async fn run(mut self, initial: Vec<Outbound>) {
        let room_id = self.room.id();
        info!(room_id = %room_id, "Room task started");
        self.dispatch(initial);

        let mut timer = interval_at(Instant::now() + self.round_tick, self.round_tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let playing = self.room.status() == RoomStatus::Playing;
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle(cmd);
                    if !playing && self.room.status() == RoomStatus::Playing {
                        // Round clock starts from the moment the match begins.
                        timer.reset();
                    }
                }
                _ = timer.tick(), if playing => {
                    let out = self.room.tick_second();
                    self.dispatch(out);
                }
            }

            self.summary_tx.send_replace(self.room.summary());
            if self.room.is_empty() {
                break;
            }
        }

        for (player, _) in self.members.drain() {
            self.player_rooms.remove_if(&player, |_, room| *room == room_id);
        }
        info!(room_id = %room_id, "Room closed");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        let RoomCommand {
            player,
            request,
            reply,
        } = cmd;

        let result = match request {
            Request::Join {
                entrant,
                code,
                outbox,
            } => match self.room.join(entrant, code.as_deref()) {
                Ok(out) => {
                    self.members.insert(player, outbox);
                    self.player_rooms.insert(player, self.room.id());
                    Ok(out)
                }
                Err(e) => Err(e),
            },
            Request::Action(action) => self.apply(player, action),
        };

        match result {
            Ok(out) => {
                self.dispatch(out);
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                warn!(room_id = %self.room.id(), player_id = %player, code = e.code(), "Request rejected: {}", e);
                let _ = reply.send(Err(e));
            }
        }
    }

    fn apply(&mut self, player: PlayerId, action: RoomAction) -> Result<Vec<Outbound>, RoomError> {
        let room = &mut self.room;
        match action {
            RoomAction::Ready => room.toggle_ready(player),
            RoomAction::Start => room.start(player),
            RoomAction::GameUpdate(update) => room.game_update(player, update),
            RoomAction::Damage {
                target,
                amount,
                attacker,
            } => room.report_damage(player, target, amount, attacker),
            RoomAction::Respawn => room.respawn(player),
            RoomAction::PickupWeapon { uuid } => room.pickup_weapon(player, uuid),
            RoomAction::SpawnWeapon {
                uuid,
                weapon_id,
                position,
            } => room.spawn_weapon(player, uuid, &weapon_id, position),
            RoomAction::CloseSlot { index } => room.close_slot(player, index),
            RoomAction::IncreaseMaxPlayers => room.increase_max_players(player),
            RoomAction::Leave => match room.member(player) {
                Some(_) => Ok(room.leave(player)),
                None => Err(RoomError::RoomNotFound),
            },
        }
    }

    fn dispatch(&mut self, out: Vec<Outbound>) {
        for outbound in out {
            match outbound {
                Outbound::All(msg) => {
                    for (player, tx) in &self.members {
                        deliver(*player, tx, msg.clone());
                    }
                }
                Outbound::AllExcept(skip, msg) => {
                    for (player, tx) in self.members.iter().filter(|(p, _)| **p != skip) {
                        deliver(*player, tx, msg.clone());
                    }
                }
                Outbound::To(player, msg) => {
                    if let Some(tx) = self.members.get(&player) {
                        deliver(player, tx, msg);
                    }
                }
                Outbound::Detach(player) => {
                    self.members.remove(&player);
                    let room_id = self.room.id();
                    self.player_rooms.remove_if(&player, |_, room| *room == room_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::new(
            Arc::new(WeaponCatalog::builtin()),
            RoomRules::default(),
        ))
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_and_join_room() {
        let registry = registry();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut host_rx = registry.connect(host);
        let mut guest_rx = registry.connect(guest);

        let room_id = assert_ok!(registry.create_room(
            host,
            "host".into(),
            "knight".into(),
            RoomSettings::default()
        ));
        assert_ok!(
            registry
                .join_room(guest, room_id, "guest".into(), "rogue".into(), None)
                .await
        );
        settle().await;

        let host_msgs = drain(&mut host_rx);
        assert!(matches!(host_msgs[0], ServerMsg::RoomCreated { .. }));
        assert!(host_msgs
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerJoined { player } if player.id == guest)));
        let guest_msgs = drain(&mut guest_rx);
        assert!(matches!(guest_msgs[0], ServerMsg::RoomJoined { .. }));
        assert_eq!(registry.room_of(guest), Some(room_id));
    }

    #[tokio::test]
    async fn test_rejection_goes_to_requester_only() {
        let registry = registry();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut host_rx = registry.connect(host);
        let _guest_rx = registry.connect(guest);

        let room_id = registry
            .create_room(host, "host".into(), "knight".into(), RoomSettings::default())
            .unwrap();
        registry
            .join_room(guest, room_id, "guest".into(), "rogue".into(), None)
            .await
            .unwrap();
        settle().await;
        drain(&mut host_rx);

        let err = assert_err!(registry.act(guest, RoomAction::Start).await);
        assert_eq!(err, RoomError::NotHost);
        settle().await;
        assert!(drain(&mut host_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let registry = registry();
        let player = Uuid::new_v4();
        let _rx = registry.connect(player);

        let result = registry
            .join_room(player, Uuid::new_v4(), "p".into(), "knight".into(), None)
            .await;
        assert_eq!(result, Err(RoomError::RoomNotFound));
    }

    #[tokio::test]
    async fn test_second_room_is_rejected() {
        let registry = registry();
        let host = Uuid::new_v4();
        let _rx = registry.connect(host);

        registry
            .create_room(host, "host".into(), "knight".into(), RoomSettings::default())
            .unwrap();
        let result = registry.create_room(host, "host".into(), "knight".into(), RoomSettings::default());
        assert_eq!(result, Err(RoomError::AlreadyInRoom));
    }

    #[tokio::test]
    async fn test_empty_room_is_destroyed() {
        let registry = registry();
        let host = Uuid::new_v4();
        let _rx = registry.connect(host);

        let room_id = registry
            .create_room(host, "host".into(), "knight".into(), RoomSettings::default())
            .unwrap();
        assert_eq!(registry.active_rooms(), 1);

        registry.disconnect(host).await;
        settle().await;

        assert_eq!(registry.active_rooms(), 0);
        assert!(registry.get(&room_id).is_none());
        assert!(registry.room_of(host).is_none());
        assert_eq!(registry.connected_players(), 0);
    }

    #[tokio::test]
    async fn test_private_rooms_are_not_listed() {
        let registry = registry();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let _a_rx = registry.connect(a);
        let _b_rx = registry.connect(b);

        registry
            .create_room(a, "a".into(), "knight".into(), RoomSettings::default())
            .unwrap();
        registry
            .create_room(
                b,
                "b".into(),
                "knight".into(),
                RoomSettings {
                    visibility: Visibility::Private,
                    ..RoomSettings::default()
                },
            )
            .unwrap();

        let rooms = registry.public_rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "a's room");
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_timer_ends_match() {
        let registry = registry();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut host_rx = registry.connect(host);
        let _guest_rx = registry.connect(guest);

        let room_id = registry
            .create_room(
                host,
                "host".into(),
                "knight".into(),
                RoomSettings {
                    round_time: 60,
                    ..RoomSettings::default()
                },
            )
            .unwrap();
        registry
            .join_room(guest, room_id, "guest".into(), "rogue".into(), None)
            .await
            .unwrap();
        registry.act(guest, RoomAction::Ready).await.unwrap();
        registry.act(host, RoomAction::Ready).await.unwrap();
        registry.act(host, RoomAction::Start).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;

        let msgs = drain(&mut host_rx);
        let timers = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::UpdateTimer { .. }))
            .count();
        assert_eq!(timers, 60);
        assert!(matches!(msgs.last(), Some(ServerMsg::GameEnd { .. })));
        assert_eq!(
            registry.get(&room_id).unwrap().summary().status,
            RoomStatus::Ended
        );
    }
}
