//! Local combat simulation
//!
//! Runs the attacking client's view of a fight: its own actor, training NPCs
//! and proxies for remote players. Hits against remote players are predicted
//! locally and surfaced as [`DamageReport`]s for the caller to send to the
//! room; the room's `hpUpdate` broadcasts are fed back through
//! [`LocalArena::apply_hp_update`].

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use super::actor::{ActorEvent, AttackRejected, CombatActor};
use super::geometry::Vec2;
use super::hit_volume::{DamageOutcome, Damageable, HitEvent};
use super::orchestrator::{AttackOrchestrator, CombatContext};
use super::registry::{ActorId, ActorRegistry};

/// Stand-in for a player simulated on another client
#[derive(Debug, Clone)]
pub struct RemoteProxy {
    id: ActorId,
    position: Vec2,
    hp: f32,
}

impl RemoteProxy {
    pub fn hp(&self) -> f32 {
        self.hp
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn set_hp(&mut self, hp: f32) {
        self.hp = hp.max(0.0);
    }
}

impl Damageable for RemoteProxy {
    fn actor_id(&self) -> ActorId {
        self.id
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn can_take_damage(&self) -> bool {
        self.hp > 0.0
    }

    fn take_damage(&mut self, amount: f32) -> DamageOutcome {
        if !self.can_take_damage() {
            return DamageOutcome::Ignored;
        }
        self.hp = (self.hp - amount.max(0.0)).max(0.0);
        if self.hp == 0.0 {
            DamageOutcome::Killed
        } else {
            DamageOutcome::Damaged { hp: self.hp }
        }
    }
}

/// Any participant in the local simulation
#[derive(Debug, Clone)]
pub enum Combatant {
    Local(CombatActor),
    Remote(RemoteProxy),
}

impl Combatant {
    fn as_damageable(&mut self) -> &mut dyn Damageable {
        match self {
            Combatant::Local(actor) => actor,
            Combatant::Remote(proxy) => proxy,
        }
    }
}

/// Predicted hit to forward to the room as `playerDamage`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageReport {
    pub target: Uuid,
    pub attacker: Uuid,
    pub amount: f32,
}

/// Output of one simulation step
#[derive(Debug, Default)]
pub struct ArenaTick {
    pub hits: Vec<HitEvent>,
    pub reports: Vec<DamageReport>,
    pub actor_events: Vec<(ActorId, ActorEvent)>,
}

pub struct LocalArena {
    actors: ActorRegistry<Combatant>,
    orchestrator: AttackOrchestrator,
    net_ids: HashMap<ActorId, Uuid>,
    by_net_id: HashMap<Uuid, ActorId>,
}

impl LocalArena {
    pub fn new(ctx: CombatContext) -> Self {
        Self {
            actors: ActorRegistry::new(),
            orchestrator: AttackOrchestrator::new(ctx),
            net_ids: HashMap::new(),
            by_net_id: HashMap::new(),
        }
    }

    /// Add the locally controlled player
    pub fn spawn_player(&mut self, player_id: Uuid, spawn_point: Vec2) -> ActorId {
        let id = self
            .actors
            .insert_with(|id| Combatant::Local(CombatActor::player(id, spawn_point)));
        self.bind(id, player_id);
        id
    }

    /// Add a training NPC; NPC hits never leave this arena
    pub fn spawn_npc(&mut self, position: Vec2, max_hp: f32) -> ActorId {
        self.actors
            .insert_with(|id| Combatant::Local(CombatActor::npc(id, position, max_hp)))
    }

    pub fn spawn_remote(&mut self, player_id: Uuid, position: Vec2, hp: f32) -> ActorId {
        let id = self.actors.insert_with(|id| {
            Combatant::Remote(RemoteProxy {
                id,
                position,
                hp,
            })
        });
        self.bind(id, player_id);
        id
    }

    fn bind(&mut self, id: ActorId, player_id: Uuid) {
        self.net_ids.insert(id, player_id);
        self.by_net_id.insert(player_id, id);
    }

    /// Remove an actor; its in-flight volumes keep resolving
    pub fn remove(&mut self, id: ActorId) -> Option<Combatant> {
        if let Some(player_id) = self.net_ids.remove(&id) {
            self.by_net_id.remove(&player_id);
        }
        self.actors.remove(id)
    }

    pub fn remove_player(&mut self, player_id: Uuid) -> Option<Combatant> {
        let id = self.by_net_id.get(&player_id).copied()?;
        self.remove(id)
    }

    pub fn actor(&self, id: ActorId) -> Option<&CombatActor> {
        match self.actors.get(id)? {
            Combatant::Local(actor) => Some(actor),
            Combatant::Remote(_) => None,
        }
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut CombatActor> {
        match self.actors.get_mut(id)? {
            Combatant::Local(actor) => Some(actor),
            Combatant::Remote(_) => None,
        }
    }

    pub fn remote_mut(&mut self, player_id: Uuid) -> Option<&mut RemoteProxy> {
        let id = *self.by_net_id.get(&player_id)?;
        match self.actors.get_mut(id)? {
            Combatant::Remote(proxy) => Some(proxy),
            Combatant::Local(_) => None,
        }
    }

    pub fn actor_for(&self, player_id: Uuid) -> Option<ActorId> {
        self.by_net_id.get(&player_id).copied()
    }

    pub fn live_volumes(&self) -> usize {
        self.orchestrator.live_count()
    }

    /// Request an attack from a local actor
    pub fn trigger_attack(&mut self, id: ActorId) -> Result<(), AttackRejected> {
        match self.actor_mut(id) {
            Some(actor) => actor.try_attack(),
            None => Err(AttackRejected::Dead),
        }
    }

    /// Advance every actor and hit volume by `dt` seconds
    pub fn tick(&mut self, dt: f32) -> ArenaTick {
        let mut out = ArenaTick::default();

        for (id, combatant) in self.actors.iter_mut() {
            let Combatant::Local(actor) = combatant else {
                continue;
            };
            for event in actor.update(dt) {
                if let ActorEvent::AttackSpawned(params) = &event {
                    self.orchestrator.spawn_or_warn(params.clone());
                }
                out.actor_events.push((id, event));
            }
        }

        let mut targets: Vec<&mut dyn Damageable> = self
            .actors
            .iter_mut()
            .map(|(_, combatant)| combatant.as_damageable())
            .collect();
        out.hits = self.orchestrator.tick(dt, &mut targets);
        drop(targets);

        for hit in &out.hits {
            if let Some(Combatant::Local(attacker)) = self.actors.get_mut(hit.attacker) {
                attacker.record_struck(hit.target);
            }
            if !hit.outcome.landed() {
                continue;
            }
            debug!(attacker = %hit.attacker, target = %hit.target, damage = hit.damage, "Hit");
            if let (Some(&attacker), Some(&target)) =
                (self.net_ids.get(&hit.attacker), self.net_ids.get(&hit.target))
            {
                out.reports.push(DamageReport {
                    target,
                    attacker,
                    amount: hit.damage,
                });
            }
        }

        // Events raised while taking damage this tick
        for (id, combatant) in self.actors.iter_mut() {
            if let Combatant::Local(actor) = combatant {
                let events = actor.drain_events();
                out.actor_events.extend(events.into_iter().map(|e| (id, e)));
            }
        }

        out
    }

    /// Reconcile with an authoritative `hpUpdate`
    pub fn apply_hp_update(&mut self, player_id: Uuid, hp: f32) {
        let Some(id) = self.by_net_id.get(&player_id).copied() else {
            warn!(%player_id, "hpUpdate for unknown player");
            return;
        };
        match self.actors.get_mut(id) {
            Some(Combatant::Local(actor)) => actor.apply_authoritative_hp(hp),
            Some(Combatant::Remote(proxy)) => proxy.set_hp(hp),
            None => {}
        }
    }
}
