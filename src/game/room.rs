//! Room state machine
//!
//! A [`Room`] is plain synchronous state. Every operation either fails with a
//! [`RoomError`] and leaves the room untouched, or applies its change and
//! returns the messages to deliver. The room task in
//! [`authority`](super::authority) owns the room and routes those messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::RoomError;
use super::spawn_pool;
use crate::combat::{Vec2, WeaponCatalog};
use crate::ws::protocol::{
    MemberInfo, PlayerUpdate, RoomInfo, RoomSettings, RoomStatus, RoomSummary, ScoreEntry,
    ServerMsg, Visibility, WeaponSpawn, MAX_PLAYERS,
};

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// Canonical hp at match start
pub const MATCH_START_HP: f32 = 100.0;
/// Length of private room access codes
pub const ACCESS_CODE_LEN: usize = 6;

/// Where a message produced by a room operation goes
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Every member
    All(ServerMsg),
    /// Every member except one (relays)
    AllExcept(PlayerId, ServerMsg),
    /// A single member
    To(PlayerId, ServerMsg),
    /// Member is no longer in the room; drop their outbox
    Detach(PlayerId),
}

/// Server-side rules that do not come from the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomRules {
    /// Initial random spawn count and cap for periodic respawns
    pub weapon_spawn_count: usize,
    /// Seconds between periodic weapon spawns while playing
    pub weapon_respawn_secs: u32,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            weapon_spawn_count: 10,
            weapon_respawn_secs: 10,
        }
    }
}

/// Identity of a player entering a room
#[derive(Debug, Clone, PartialEq)]
pub struct Entrant {
    pub id: PlayerId,
    pub nickname: String,
    pub character: String,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: PlayerId,
    pub nickname: String,
    pub character: String,
    pub ready: bool,
    /// Canonical hp; only damage reports, match start and respawn write it
    pub hp: f32,
    /// Last hp the member's own client claimed, informational only
    pub reported_hp: f32,
    pub kills: u32,
    pub deaths: u32,
    pub equipped_weapon: Option<String>,
    pub is_attacking: bool,
    pub position: [f32; 3],
}

impl Member {
    fn new(entrant: Entrant) -> Self {
        Self {
            id: entrant.id,
            nickname: entrant.nickname,
            character: entrant.character,
            ready: false,
            hp: MATCH_START_HP,
            reported_hp: MATCH_START_HP,
            kills: 0,
            deaths: 0,
            equipped_weapon: None,
            is_attacking: false,
            position: [0.0; 3],
        }
    }
}

pub struct Room {
    id: RoomId,
    name: String,
    map: String,
    visibility: Visibility,
    access_code: Option<String>,
    max_players: u8,
    round_time: u32,
    remaining_secs: u32,
    secs_since_spawn: u32,
    status: RoomStatus,
    /// Join order; the host is always `members[0]`
    members: Vec<Member>,
    weapons: Vec<WeaponSpawn>,
    rules: RoomRules,
    catalog: Arc<WeaponCatalog>,
    rng: ChaCha8Rng,
    created_at: DateTime<Utc>,
}

impl Room {
    /// Create a waiting room with `host` as its only member
    pub fn new(
        id: RoomId,
        host: Entrant,
        settings: RoomSettings,
        rules: RoomRules,
        catalog: Arc<WeaponCatalog>,
        seed: u64,
    ) -> (Self, Vec<Outbound>) {
        let settings = settings.clamped();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let access_code = match settings.visibility {
            Visibility::Private => Some(
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(ACCESS_CODE_LEN)
                    .map(|b| char::from(b).to_ascii_uppercase())
                    .collect(),
            ),
            Visibility::Public => None,
        };
        let name = settings
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}'s room", host.nickname));
        let host_id = host.id;

        let room = Self {
            id,
            name,
            map: settings.map,
            visibility: settings.visibility,
            access_code,
            max_players: settings.max_players,
            round_time: settings.round_time,
            remaining_secs: settings.round_time,
            secs_since_spawn: 0,
            status: RoomStatus::Waiting,
            members: vec![Member::new(host)],
            weapons: Vec::new(),
            rules,
            catalog,
            rng,
            created_at: Utc::now(),
        };

        info!(room_id = %id, host_id = %host_id, visibility = ?room.visibility, "Room created");

        let out = vec![
            Outbound::To(
                host_id,
                ServerMsg::RoomCreated {
                    room: room.info(),
                    access_code: room.access_code.clone(),
                },
            ),
            Outbound::All(room.roster()),
        ];
        (room, out)
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.members.first().map(|m| m.id)
    }

    pub fn is_host(&self, who: PlayerId) -> bool {
        self.host_id() == Some(who)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn access_code(&self) -> Option<&str> {
        self.access_code.as_deref()
    }

    pub fn member(&self, who: PlayerId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == who)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn weapons(&self) -> &[WeaponSpawn] {
        &self.weapons
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn member_mut(&mut self, who: PlayerId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == who)
    }

    fn is_consumable(&self, weapon_id: &str) -> bool {
        self.catalog.get(weapon_id).is_some_and(|w| w.is_consumable())
    }

    fn require_member(&self, who: PlayerId) -> Result<(), RoomError> {
        match self.member(who) {
            Some(_) => Ok(()),
            None => Err(RoomError::RoomNotFound),
        }
    }

    fn require_host(&self, who: PlayerId) -> Result<(), RoomError> {
        self.require_member(who)?;
        if self.is_host(who) {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn transition(&mut self, next: RoomStatus) -> Result<(), RoomError> {
        if !self.status.can_transition_to(next) {
            return Err(RoomError::InvalidTransition);
        }
        info!(room_id = %self.id, from = ?self.status, to = ?next, "Room status changed");
        self.status = next;
        Ok(())
    }

    fn member_infos(&self) -> Vec<MemberInfo> {
        let host = self.host_id();
        self.members
            .iter()
            .map(|m| MemberInfo {
                id: m.id,
                nickname: m.nickname.clone(),
                character: m.character.clone(),
                ready: m.ready,
                is_host: Some(m.id) == host,
            })
            .collect()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            map: self.map.clone(),
            visibility: self.visibility,
            status: self.status,
            host_id: self.host_id().unwrap_or_default(),
            max_players: self.max_players,
            round_time: self.round_time,
            players: self.member_infos(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            map: self.map.clone(),
            visibility: self.visibility,
            status: self.status,
            players: self.members.len(),
            max_players: self.max_players,
        }
    }

    pub fn scores(&self) -> Vec<ScoreEntry> {
        self.members
            .iter()
            .map(|m| ScoreEntry {
                player_id: m.id,
                nickname: m.nickname.clone(),
                kills: m.kills,
                deaths: m.deaths,
            })
            .collect()
    }

    fn roster(&self) -> ServerMsg {
        ServerMsg::UpdatePlayers {
            players: self.member_infos(),
            max_players: self.max_players,
            host_id: self.host_id().unwrap_or_default(),
        }
    }

    /// Add a player to a waiting room
    pub fn join(&mut self, entrant: Entrant, code: Option<&str>) -> Result<Vec<Outbound>, RoomError> {
        if self.member(entrant.id).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress);
        }
        if self.members.len() >= self.max_players as usize {
            return Err(RoomError::RoomFull);
        }
        if let Some(expected) = self.access_code.as_deref() {
            let matches = code.is_some_and(|c| c.trim().eq_ignore_ascii_case(expected));
            if !matches {
                return Err(RoomError::InvalidPrivateCode);
            }
        }

        let id = entrant.id;
        let player = MemberInfo {
            id,
            nickname: entrant.nickname.clone(),
            character: entrant.character.clone(),
            ready: false,
            is_host: false,
        };
        self.members.push(Member::new(entrant));
        info!(room_id = %self.id, player_id = %id, members = self.members.len(), "Player joined room");

        Ok(vec![
            Outbound::To(id, ServerMsg::RoomJoined { room: self.info() }),
            Outbound::AllExcept(id, ServerMsg::PlayerJoined { player }),
            Outbound::All(self.roster()),
        ])
    }

    /// Toggle a member's ready flag
    pub fn toggle_ready(&mut self, who: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress);
        }
        let member = self.member_mut(who).ok_or(RoomError::RoomNotFound)?;
        member.ready = !member.ready;

        let mut out = vec![Outbound::All(self.roster())];
        if self.is_host(who) && self.all_ready() {
            out.push(Outbound::To(who, ServerMsg::StartPermitted));
        }
        Ok(out)
    }

    fn all_ready(&self) -> bool {
        self.members.iter().all(|m| m.ready)
    }

    /// Host starts the match
    pub fn start(&mut self, who: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        self.require_host(who)?;
        if !self.status.can_transition_to(RoomStatus::Playing) {
            return Err(RoomError::InvalidTransition);
        }
        if !self.all_ready() {
            return Err(RoomError::AllNotReady);
        }
        self.transition(RoomStatus::Playing)?;

        for member in self.members.iter_mut() {
            member.hp = MATCH_START_HP;
            member.reported_hp = MATCH_START_HP;
            member.kills = 0;
            member.deaths = 0;
            member.equipped_weapon = None;
            member.is_attacking = false;
        }
        self.remaining_secs = self.round_time;
        self.secs_since_spawn = 0;
        self.weapons = spawn_pool::generate(&self.catalog, &mut self.rng, self.rules.weapon_spawn_count);

        Ok(vec![Outbound::All(ServerMsg::StartGame {
            map: self.map.clone(),
            players: self.member_infos(),
            weapons: self.weapons.clone(),
            round_time: self.round_time,
        })])
    }

    /// Record a member's latest state and relay it to everyone else
    ///
    /// The client's hp is kept as `reported_hp`; frames sent before an
    /// `hpUpdate` arrived must not undo it.
    pub fn game_update(&mut self, who: PlayerId, update: PlayerUpdate) -> Result<Vec<Outbound>, RoomError> {
        let member = self.member_mut(who).ok_or(RoomError::RoomNotFound)?;
        member.position = update.position;
        member.equipped_weapon = update.equipped_weapon.clone();
        member.is_attacking = update.is_attacking;
        member.reported_hp = update.hp.max(0.0);
        Ok(vec![Outbound::AllExcept(
            who,
            ServerMsg::GameUpdate {
                player_id: who,
                state: update,
            },
        )])
    }

    /// Apply a client-reported hit to the target's canonical hp
    ///
    /// The report is trusted as-is; neither the reporter nor the attacker is
    /// checked against the target's position.
    pub fn report_damage(
        &mut self,
        reporter: PlayerId,
        target: PlayerId,
        amount: f32,
        attacker: Option<PlayerId>,
    ) -> Result<Vec<Outbound>, RoomError> {
        self.require_member(reporter)?;
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidTransition);
        }
        let Some(victim) = self.member_mut(target) else {
            debug!(%target, "Damage report for unknown target ignored");
            return Ok(Vec::new());
        };

        let was_alive = victim.hp > 0.0;
        victim.hp = (victim.hp - amount.max(0.0)).max(0.0);
        let hp = victim.hp;
        let killed = was_alive && hp <= 0.0;
        if killed {
            victim.deaths += 1;
        }
        let victim_name = victim.nickname.clone();
        debug!(room_id = %self.id, %reporter, %target, amount, hp, "Damage reported");

        let mut out = vec![Outbound::All(ServerMsg::HpUpdate {
            player_id: target,
            hp,
            attacker_id: attacker,
        })];

        if killed {
            let credited = attacker.filter(|a| *a != target);
            let attacker_name = match credited.and_then(|a| self.member_mut(a)) {
                Some(killer) => {
                    killer.kills += 1;
                    Some(killer.nickname.clone())
                }
                None => None,
            };
            info!(room_id = %self.id, victim = %target, attacker = ?credited, "Player killed");

            out.push(Outbound::All(ServerMsg::PlayerKilled {
                victim_id: target,
                attacker_id: credited,
            }));
            out.push(Outbound::All(ServerMsg::KillFeed {
                victim: victim_name,
                attacker: attacker_name,
            }));
            out.push(Outbound::All(ServerMsg::UpdateScores {
                scores: self.scores(),
            }));
        }
        Ok(out)
    }

    /// Bring a dead member back at full canonical hp
    ///
    /// Living members are left untouched, so a duplicate or early request
    /// cannot heal anyone.
    pub fn respawn(&mut self, who: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        self.require_member(who)?;
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidTransition);
        }
        let room_id = self.id;
        let Some(member) = self.member_mut(who).filter(|m| m.hp <= 0.0) else {
            return Ok(Vec::new());
        };
        member.hp = MATCH_START_HP;
        member.reported_hp = MATCH_START_HP;
        info!(%room_id, player_id = %who, "Player respawned");

        Ok(vec![Outbound::All(ServerMsg::HpUpdate {
            player_id: who,
            hp: MATCH_START_HP,
            attacker_id: None,
        })])
    }

    /// Remove a weapon from the pool; unknown ids are ignored
    pub fn pickup_weapon(&mut self, who: PlayerId, uuid: Uuid) -> Result<Vec<Outbound>, RoomError> {
        self.require_member(who)?;
        let Some(index) = self.weapons.iter().position(|w| w.uuid == uuid) else {
            return Ok(Vec::new());
        };
        let weapon = self.weapons.remove(index);

        let consumable = self.is_consumable(&weapon.weapon_id);
        if let Some(member) = self.member_mut(who) {
            if !consumable {
                member.equipped_weapon = Some(weapon.weapon_id.clone());
            }
        }

        Ok(vec![Outbound::All(ServerMsg::WeaponPickedUp {
            uuid,
            weapon_id: weapon.weapon_id,
            player_id: who,
        })])
    }

    /// Add a client-dropped weapon to the pool
    pub fn spawn_weapon(
        &mut self,
        who: PlayerId,
        uuid: Option<Uuid>,
        weapon_id: &str,
        position: Vec2,
    ) -> Result<Vec<Outbound>, RoomError> {
        self.require_member(who)?;
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidTransition);
        }
        let archetype = self.catalog.lookup(weapon_id)?;
        let uuid = uuid.unwrap_or_else(Uuid::new_v4);
        if self.weapons.iter().any(|w| w.uuid == uuid) {
            return Ok(Vec::new());
        }

        let weapon = WeaponSpawn {
            uuid,
            weapon_id: archetype.id,
            position,
        };
        self.weapons.push(weapon.clone());
        Ok(vec![Outbound::All(ServerMsg::WeaponSpawned { weapon })])
    }

    /// Remove a member; the next member in join order inherits host
    pub fn leave(&mut self, who: PlayerId) -> Vec<Outbound> {
        let Some(index) = self.members.iter().position(|m| m.id == who) else {
            return Vec::new();
        };
        let was_host = index == 0;
        self.members.remove(index);
        info!(room_id = %self.id, player_id = %who, members = self.members.len(), "Player left room");

        let mut out = vec![Outbound::Detach(who)];
        if self.members.is_empty() {
            return out;
        }

        out.push(Outbound::All(ServerMsg::PlayerLeft { player_id: who }));
        if was_host {
            if let Some(host_id) = self.host_id() {
                info!(room_id = %self.id, %host_id, "Host reassigned");
                out.push(Outbound::All(ServerMsg::HostChanged { host_id }));
            }
        }
        out.push(Outbound::All(self.roster()));
        out
    }

    /// Host kicks the member in slot `index`, or closes that empty slot
    pub fn close_slot(&mut self, who: PlayerId, index: usize) -> Result<Vec<Outbound>, RoomError> {
        self.require_host(who)?;
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress);
        }
        if index == 0 || index >= self.max_players as usize {
            return Err(RoomError::InvalidSlot);
        }

        if let Some(kicked) = self.members.get(index).map(|m| m.id) {
            let mut out = vec![Outbound::To(kicked, ServerMsg::Kicked { room_id: self.id })];
            out.extend(self.leave(kicked));
            return Ok(out);
        }

        // Empty slot: shrink capacity, never below the current roster or the minimum.
        let floor = (self.members.len() as u8).max(crate::ws::protocol::MIN_PLAYERS);
        if self.max_players <= floor {
            return Err(RoomError::InvalidSlot);
        }
        self.max_players -= 1;
        Ok(vec![Outbound::All(self.roster())])
    }

    pub fn increase_max_players(&mut self, who: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        self.require_host(who)?;
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress);
        }
        if self.max_players >= MAX_PLAYERS {
            return Err(RoomError::InvalidSlot);
        }
        self.max_players += 1;
        Ok(vec![Outbound::All(self.roster())])
    }

    /// One second of round time; no-op unless playing
    pub fn tick_second(&mut self) -> Vec<Outbound> {
        if self.status != RoomStatus::Playing {
            return Vec::new();
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        let mut out = vec![Outbound::All(ServerMsg::UpdateTimer {
            seconds_remaining: self.remaining_secs,
        })];

        if self.remaining_secs == 0 {
            if self.transition(RoomStatus::Ended).is_ok() {
                out.push(Outbound::All(ServerMsg::GameEnd {
                    scores: self.scores(),
                }));
            }
            return out;
        }

        self.secs_since_spawn += 1;
        if self.rules.weapon_respawn_secs > 0 && self.secs_since_spawn >= self.rules.weapon_respawn_secs {
            self.secs_since_spawn = 0;
            let random_count = self
                .weapons
                .iter()
                .filter(|w| !self.is_consumable(&w.weapon_id))
                .count();
            if random_count < self.rules.weapon_spawn_count {
                if let Some(weapon) = spawn_pool::random_spawn(&self.catalog, &mut self.rng) {
                    self.weapons.push(weapon.clone());
                    out.push(Outbound::All(ServerMsg::WeaponSpawned { weapon }));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrant(name: &str) -> Entrant {
        Entrant {
            id: Uuid::new_v4(),
            nickname: name.to_string(),
            character: "knight".to_string(),
        }
    }

    fn room_with(settings: RoomSettings) -> (Room, PlayerId) {
        let host = entrant("host");
        let host_id = host.id;
        let (room, _) = Room::new(
            Uuid::new_v4(),
            host,
            settings,
            RoomRules::default(),
            Arc::new(WeaponCatalog::builtin()),
            3,
        );
        (room, host_id)
    }

    fn room() -> (Room, PlayerId) {
        room_with(RoomSettings::default())
    }

    /// Room in `playing` with the host and one guest
    fn playing_room() -> (Room, PlayerId, PlayerId) {
        let (mut room, host) = room();
        let guest = entrant("guest");
        let guest_id = guest.id;
        room.join(guest, None).unwrap();
        room.toggle_ready(guest_id).unwrap();
        room.toggle_ready(host).unwrap();
        room.start(host).unwrap();
        (room, host, guest_id)
    }

    fn count<F: Fn(&ServerMsg) -> bool>(out: &[Outbound], pred: F) -> usize {
        out.iter()
            .filter(|o| match o {
                Outbound::All(m) | Outbound::AllExcept(_, m) | Outbound::To(_, m) => pred(m),
                Outbound::Detach(_) => false,
            })
            .count()
    }

    #[test]
    fn test_room_full_leaves_membership_unchanged() {
        let (mut room, _) = room_with(RoomSettings {
            max_players: 2,
            ..RoomSettings::default()
        });
        room.join(entrant("b"), None).unwrap();

        let err = room.join(entrant("c"), None).unwrap_err();

        assert_eq!(err, RoomError::RoomFull);
        assert_eq!(room.member_count(), 2);
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let (mut room, host) = room();
        let again = Entrant {
            id: host,
            nickname: "host".into(),
            character: "knight".into(),
        };
        assert_eq!(room.join(again, None), Err(RoomError::AlreadyInRoom));
    }

    #[test]
    fn test_private_room_requires_code() {
        let (mut room, _) = room_with(RoomSettings {
            visibility: Visibility::Private,
            ..RoomSettings::default()
        });
        let code = room.access_code().unwrap().to_string();
        assert_eq!(code.len(), ACCESS_CODE_LEN);

        assert_eq!(room.join(entrant("b"), None), Err(RoomError::InvalidPrivateCode));
        assert_eq!(room.join(entrant("b"), Some("WRONG1")), Err(RoomError::InvalidPrivateCode));
        assert!(room.join(entrant("b"), Some(&code.to_lowercase())).is_ok());
    }

    #[test]
    fn test_host_ready_with_everyone_ready_permits_start() {
        let (mut room, host) = room();
        let guest = entrant("guest");
        let guest_id = guest.id;
        room.join(guest, None).unwrap();

        let out = room.toggle_ready(host).unwrap();
        assert_eq!(count(&out, |m| *m == ServerMsg::StartPermitted), 0);

        room.toggle_ready(guest_id).unwrap();
        room.toggle_ready(host).unwrap();
        let out = room.toggle_ready(host).unwrap();
        assert!(out.contains(&Outbound::To(host, ServerMsg::StartPermitted)));
        assert_eq!(room.status(), RoomStatus::Waiting);
    }

    #[test]
    fn test_start_guards() {
        let (mut room, host) = room();
        let guest = entrant("guest");
        let guest_id = guest.id;
        room.join(guest, None).unwrap();

        assert_eq!(room.start(guest_id), Err(RoomError::NotHost));
        assert_eq!(room.start(host), Err(RoomError::AllNotReady));
        assert_eq!(room.status(), RoomStatus::Waiting);
    }

    #[test]
    fn test_start_broadcasts_pool() {
        let (room, _, _) = playing_room();
        assert_eq!(room.status(), RoomStatus::Playing);
        assert_eq!(room.weapons().len(), 11);
        assert_eq!(room.remaining_secs(), 180);
    }

    #[test]
    fn test_start_twice_fails_without_mutation() {
        let (mut room, host, _) = playing_room();
        let weapons = room.weapons().to_vec();

        assert_eq!(room.start(host), Err(RoomError::InvalidTransition));
        assert_eq!(room.status(), RoomStatus::Playing);
        assert_eq!(room.weapons(), weapons.as_slice());
    }

    #[test]
    fn test_four_quarter_hits_kill_exactly_once() {
        let (mut room, host, guest) = playing_room();
        let mut kills = 0;
        for _ in 0..4 {
            let out = room.report_damage(host, guest, 25.0, Some(host)).unwrap();
            kills += count(&out, |m| matches!(m, ServerMsg::PlayerKilled { .. }));
        }
        let out = room.report_damage(host, guest, 25.0, Some(host)).unwrap();
        kills += count(&out, |m| matches!(m, ServerMsg::PlayerKilled { .. }));

        assert_eq!(kills, 1);
        assert_eq!(room.member(guest).unwrap().hp, 0.0);
        assert_eq!(room.member(guest).unwrap().deaths, 1);
        assert_eq!(room.member(host).unwrap().kills, 1);
    }

    fn frame(hp: f32) -> PlayerUpdate {
        PlayerUpdate {
            position: [0.0; 3],
            rotation: 0.0,
            animation: None,
            hp,
            equipped_weapon: None,
            is_attacking: false,
        }
    }

    #[test]
    fn test_late_frame_does_not_revive_dead_member() {
        let (mut room, host, guest) = playing_room();
        for _ in 0..4 {
            room.report_damage(host, guest, 25.0, Some(host)).unwrap();
        }
        // Sent by the victim before it saw the killing hpUpdate
        room.game_update(guest, frame(25.0)).unwrap();
        assert_eq!(room.member(guest).unwrap().hp, 0.0);

        let out = room.report_damage(host, guest, 25.0, Some(host)).unwrap();
        assert_eq!(count(&out, |m| matches!(m, ServerMsg::PlayerKilled { .. })), 0);
        assert_eq!(room.member(guest).unwrap().deaths, 1);
        assert_eq!(room.member(host).unwrap().kills, 1);
    }

    #[test]
    fn test_frames_never_raise_canonical_hp() {
        let (mut room, host, guest) = playing_room();
        room.report_damage(host, guest, 60.0, Some(host)).unwrap();
        room.game_update(guest, frame(120.0)).unwrap();
        assert_eq!(room.member(guest).unwrap().hp, 40.0);
    }

    #[test]
    fn test_respawn_restores_dead_member_only() {
        let (mut room, host, guest) = playing_room();
        room.report_damage(host, guest, 30.0, Some(host)).unwrap();
        assert!(room.respawn(guest).unwrap().is_empty());
        assert_eq!(room.member(guest).unwrap().hp, 70.0);

        room.report_damage(host, guest, 70.0, Some(host)).unwrap();
        let out = room.respawn(guest).unwrap();
        assert_eq!(
            out,
            vec![Outbound::All(ServerMsg::HpUpdate {
                player_id: guest,
                hp: MATCH_START_HP,
                attacker_id: None,
            })]
        );

        // A new life can be taken again
        let out = room.report_damage(host, guest, 100.0, Some(host)).unwrap();
        assert_eq!(count(&out, |m| matches!(m, ServerMsg::PlayerKilled { .. })), 1);
        assert_eq!(room.member(guest).unwrap().deaths, 2);
    }

    #[test]
    fn test_respawn_outside_match_is_invalid() {
        let (mut room, host) = room();
        assert_eq!(room.respawn(host), Err(RoomError::InvalidTransition));
    }

    #[test]
    fn test_damage_broadcasts_hp_to_everyone() {
        let (mut room, host, guest) = playing_room();
        let out = room.report_damage(guest, guest, 30.0, Some(host)).unwrap();
        assert_eq!(
            out,
            vec![Outbound::All(ServerMsg::HpUpdate {
                player_id: guest,
                hp: 70.0,
                attacker_id: Some(host),
            })]
        );
    }

    #[test]
    fn test_game_update_relays_to_others_and_records_state() {
        let (mut room, host, guest) = playing_room();
        let update = PlayerUpdate {
            position: [1.0, 0.0, 2.0],
            rotation: 0.5,
            animation: Some("Run".to_string()),
            hp: 140.0,
            equipped_weapon: Some("sword".to_string()),
            is_attacking: true,
        };

        let out = room.game_update(guest, update.clone()).unwrap();

        assert_eq!(
            out,
            vec![Outbound::AllExcept(
                guest,
                ServerMsg::GameUpdate {
                    player_id: guest,
                    state: update,
                },
            )]
        );
        let member = room.member(guest).unwrap();
        assert_eq!(member.hp, MATCH_START_HP);
        assert_eq!(member.reported_hp, 140.0);
        assert_eq!(member.equipped_weapon.as_deref(), Some("sword"));
        assert!(member.is_attacking);
        assert_eq!(room.member(host).unwrap().position, [0.0; 3]);
    }

    #[test]
    fn test_damage_outside_match_is_invalid() {
        let (mut room, host) = room();
        assert_eq!(
            room.report_damage(host, host, 10.0, None),
            Err(RoomError::InvalidTransition)
        );
    }

    #[test]
    fn test_damage_to_unknown_target_is_ignored() {
        let (mut room, host, _) = playing_room();
        assert_eq!(room.report_damage(host, Uuid::new_v4(), 10.0, None), Ok(Vec::new()));
    }

    #[test]
    fn test_pickup_is_idempotent() {
        let (mut room, host, _) = playing_room();
        let weapon = room
            .weapons()
            .iter()
            .find(|w| w.weapon_id != "potion")
            .cloned()
            .unwrap();

        let out = room.pickup_weapon(host, weapon.uuid).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            room.member(host).unwrap().equipped_weapon.as_deref(),
            Some(weapon.weapon_id.as_str())
        );
        assert_eq!(room.pickup_weapon(host, weapon.uuid), Ok(Vec::new()));
        assert_eq!(room.weapons().len(), 10);
    }

    #[test]
    fn test_spawn_unknown_weapon_fails() {
        let (mut room, host, _) = playing_room();
        let err = room.spawn_weapon(host, None, "laser_sword", Vec2::ZERO).unwrap_err();
        assert_eq!(err, RoomError::UnknownWeapon("laser_sword".into()));
        assert_eq!(room.weapons().len(), 11);
    }

    #[test]
    fn test_host_leaving_promotes_next_member() {
        let (mut room, host) = room();
        let guest = entrant("guest");
        let guest_id = guest.id;
        room.join(guest, None).unwrap();

        let out = room.leave(host);

        assert!(out.contains(&Outbound::All(ServerMsg::HostChanged { host_id: guest_id })));
        assert!(room.is_host(guest_id));
    }

    #[test]
    fn test_last_member_leaving_empties_room() {
        let (mut room, host) = room();
        let out = room.leave(host);
        assert_eq!(out, vec![Outbound::Detach(host)]);
        assert!(room.is_empty());
    }

    #[test]
    fn test_close_slot_kicks_member() {
        let (mut room, host) = room();
        let guest = entrant("guest");
        let guest_id = guest.id;
        room.join(guest, None).unwrap();

        assert_eq!(room.close_slot(host, 0), Err(RoomError::InvalidSlot));
        assert_eq!(room.close_slot(guest_id, 1), Err(RoomError::NotHost));

        let out = room.close_slot(host, 1).unwrap();
        assert!(out.contains(&Outbound::Detach(guest_id)));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_close_empty_slot_shrinks_capacity() {
        let (mut room, host) = room();
        room.close_slot(host, 3).unwrap();
        assert_eq!(room.max_players(), 3);
        room.close_slot(host, 2).unwrap();
        assert_eq!(room.close_slot(host, 1), Err(RoomError::InvalidSlot));
        assert_eq!(room.close_slot(host, 9), Err(RoomError::InvalidSlot));
    }

    #[test]
    fn test_increase_max_players_caps_at_eight() {
        let (mut room, host) = room_with(RoomSettings {
            max_players: 7,
            ..RoomSettings::default()
        });
        room.increase_max_players(host).unwrap();
        assert_eq!(room.max_players(), 8);
        assert_eq!(room.increase_max_players(host), Err(RoomError::InvalidSlot));
    }

    #[test]
    fn test_join_after_start_is_rejected() {
        let (mut room, _, _) = playing_room();
        assert_eq!(room.join(entrant("late"), None), Err(RoomError::GameInProgress));
    }

    #[test]
    fn test_timer_ends_match_with_scores() {
        let (mut room, _) = room();
        // Timer does nothing while waiting.
        assert!(room.tick_second().is_empty());

        let (mut room, _, _) = playing_room();
        let mut ended = 0;
        for _ in 0..180 {
            let out = room.tick_second();
            ended += count(&out, |m| matches!(m, ServerMsg::GameEnd { .. }));
        }
        assert_eq!(ended, 1);
        assert_eq!(room.status(), RoomStatus::Ended);
        assert!(room.tick_second().is_empty());
        assert_eq!(room.join(entrant("late"), None), Err(RoomError::GameInProgress));
    }

    #[test]
    fn test_start_after_end_fails_without_mutation() {
        let (mut room, host, guest) = playing_room();
        room.report_damage(host, guest, 100.0, Some(host)).unwrap();
        for _ in 0..180 {
            room.tick_second();
        }
        assert_eq!(room.status(), RoomStatus::Ended);
        let weapons = room.weapons().to_vec();

        assert_eq!(room.start(host), Err(RoomError::InvalidTransition));
        assert_eq!(room.status(), RoomStatus::Ended);
        assert_eq!(room.weapons(), weapons.as_slice());
        assert_eq!(room.remaining_secs(), 0);
        assert_eq!(room.member(guest).unwrap().hp, 0.0);
        assert_eq!(room.member(host).unwrap().kills, 1);
    }

    #[test]
    fn test_periodic_respawn_refills_pool() {
        let (mut room, host, _) = playing_room();
        let picked: Vec<Uuid> = room
            .weapons()
            .iter()
            .filter(|w| w.weapon_id != "potion")
            .take(3)
            .map(|w| w.uuid)
            .collect();
        for uuid in picked {
            room.pickup_weapon(host, uuid).unwrap();
        }
        assert_eq!(room.weapons().len(), 8);

        let mut spawned = 0;
        for _ in 0..10 {
            let out = room.tick_second();
            spawned += count(&out, |m| matches!(m, ServerMsg::WeaponSpawned { .. }));
        }
        assert_eq!(spawned, 1);
        assert_eq!(room.weapons().len(), 9);
    }
}
