//! Combat actor state machine
//!
//! Drives one fighter (player or NPC) through `Idle -> Attacking -> Idle`,
//! `HitStun` after taking damage, and `Dead -> Idle` after the respawn delay.
//! Attacks are not resolved here: when a swing reaches its damage window the
//! actor emits [`ActorEvent::AttackSpawned`] and the caller hands the params
//! to the [`AttackOrchestrator`](super::orchestrator::AttackOrchestrator).

use std::collections::HashSet;

use super::geometry::Vec2;
use super::hit_volume::{DamageOutcome, Damageable, DEFAULT_HIT_RADIUS};
use super::orchestrator::AttackParams;
use super::registry::ActorId;
use super::weapon::{FireMode, StatKind, WeaponArchetype, BASE_ATTACK_COOLDOWN};

/// Hit points at zero stamina
pub const BASE_MAX_HP: f32 = 100.0;
/// Seconds an actor ignores damage after being hit
pub const HIT_STUN_SECS: f32 = 0.5;
/// Seconds between death and respawn
pub const RESPAWN_DELAY_SECS: f32 = 5.0;
/// Length of one swing or shot animation
pub const SWING_SECS: f32 = 0.5;
/// Bonus damage per strength point
pub const DAMAGE_PER_STRENGTH: f32 = 5.0;
/// Cooldown reduction per agility point
pub const COOLDOWN_REDUCTION_PER_AGILITY: f32 = 0.1;
/// Max HP increase per stamina point, relative to the base
pub const HP_BONUS_PER_STAMINA: f32 = 0.1;
/// Floor for max HP however low stamina goes
pub const MIN_MAX_HP: f32 = 1.0;

/// Animation clip names understood by clients
pub mod clips {
    pub const IDLE: &str = "Idle";
    pub const SLASH: &str = "Sword_Slash";
    pub const AERIAL_SLASH: &str = "Sword_Attack_Jump";
    pub const SHOOT: &str = "Gun_Shoot";
    pub const RELOAD: &str = "Gun_Reload";
    pub const RECEIVE_HIT: &str = "Receive_Hit";
    pub const DEATH: &str = "Death";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatState {
    Idle,
    Attacking,
    HitStun,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Player,
    Npc,
}

/// Attribute points raised by consumables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActorStats {
    pub strength: i32,
    pub agility: i32,
    pub stamina: i32,
}

impl ActorStats {
    fn apply(&mut self, stat: StatKind, amount: i32) {
        match stat {
            StatKind::Strength => self.strength += amount,
            StatKind::Agility => self.agility += amount,
            StatKind::Stamina => self.stamina += amount,
        }
    }
}

/// Why an attack request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttackRejected {
    #[error("actor is dead")]
    Dead,
    #[error("actor is recovering from a hit")]
    InHitStun,
    #[error("attack already in progress")]
    AlreadyAttacking,
    #[error("attack on cooldown")]
    CoolingDown,
    #[error("weapon is reloading")]
    Reloading,
}

/// Observable side effects of actor updates
#[derive(Debug, Clone, PartialEq)]
pub enum ActorEvent {
    AnimationRequested(&'static str),
    /// Remaining health as a fraction of max HP
    HealthChanged(f32),
    AttackSpawned(AttackParams),
    Died,
    Respawned,
    StatsChanged(ActorStats),
    Reloaded,
}

/// Normalized window inside a swing during which the hit volume appears
#[derive(Debug, Clone, Copy, PartialEq)]
struct SwingTiming {
    /// Fraction of the swing at which the volume spawns
    strike_at: f32,
}

impl SwingTiming {
    fn for_attack(weapon: &WeaponArchetype, airborne: bool) -> Self {
        let strike_at = if weapon.is_ranged() {
            5.0 / 12.0
        } else if airborne {
            10.0 / 12.0
        } else {
            11.0 / 12.0
        };
        Self { strike_at }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Swing {
    elapsed: f32,
    timing: SwingTiming,
    facing: Vec2,
    airborne: bool,
    spawned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Magazine {
    rounds: u32,
    reload_remaining: Option<f32>,
}

/// A fighter in the local simulation
#[derive(Debug, Clone)]
pub struct CombatActor {
    id: ActorId,
    kind: ActorKind,
    position: Vec2,
    facing: Vec2,
    spawn_point: Vec2,
    airborne: bool,
    trigger_held: bool,

    hp: f32,
    base_max_hp: f32,
    stats: ActorStats,
    state: CombatState,

    cooldown_remaining: f32,
    hit_stun_remaining: f32,
    respawn_remaining: f32,
    swing: Option<Swing>,

    weapon: Option<WeaponArchetype>,
    magazine: Option<Magazine>,
    /// Targets hit by the current swing
    struck: HashSet<ActorId>,

    events: Vec<ActorEvent>,
}

impl CombatActor {
    pub fn player(id: ActorId, spawn_point: Vec2) -> Self {
        Self::new(id, ActorKind::Player, spawn_point, BASE_MAX_HP)
    }

    /// Training target with its own HP pool
    pub fn npc(id: ActorId, position: Vec2, max_hp: f32) -> Self {
        Self::new(id, ActorKind::Npc, position, max_hp)
    }

    fn new(id: ActorId, kind: ActorKind, spawn_point: Vec2, base_max_hp: f32) -> Self {
        Self {
            id,
            kind,
            position: spawn_point,
            facing: Vec2::FORWARD,
            spawn_point,
            airborne: false,
            trigger_held: false,
            hp: base_max_hp,
            base_max_hp,
            stats: ActorStats::default(),
            state: CombatState::Idle,
            cooldown_remaining: 0.0,
            hit_stun_remaining: 0.0,
            respawn_remaining: 0.0,
            swing: None,
            weapon: None,
            magazine: None,
            struck: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn state(&self) -> CombatState {
        self.state
    }

    pub fn hp(&self) -> f32 {
        self.hp
    }

    pub fn max_hp(&self) -> f32 {
        (self.base_max_hp * (1.0 + HP_BONUS_PER_STAMINA * self.stats.stamina as f32)).max(MIN_MAX_HP)
    }

    pub fn health_fraction(&self) -> f32 {
        let max = self.max_hp();
        if max > 0.0 {
            self.hp / max
        } else {
            0.0
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state == CombatState::Dead
    }

    pub fn stats(&self) -> ActorStats {
        self.stats
    }

    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn weapon(&self) -> Option<&WeaponArchetype> {
        self.weapon.as_ref()
    }

    pub fn rounds(&self) -> Option<u32> {
        self.magazine.map(|m| m.rounds)
    }

    pub fn is_reloading(&self) -> bool {
        self.magazine.is_some_and(|m| m.reload_remaining.is_some())
    }

    pub fn cooldown_remaining(&self) -> f32 {
        self.cooldown_remaining
    }

    /// Targets already hit by the current swing
    ///
    /// Kept for presentation such as hit markers. Each hit volume does its
    /// own dedup, so nothing here gates damage.
    pub fn struck_targets(&self) -> &HashSet<ActorId> {
        &self.struck
    }

    pub fn record_struck(&mut self, target: ActorId) {
        self.struck.insert(target);
    }

    fn active_weapon(&self) -> WeaponArchetype {
        self.weapon.clone().unwrap_or_else(WeaponArchetype::bare_hand)
    }

    /// Damage per hit including the strength bonus
    pub fn attack_damage(&self) -> f32 {
        let base = self
            .weapon
            .as_ref()
            .map(|w| w.damage)
            .unwrap_or(super::weapon::BARE_HAND_DAMAGE);
        base + DAMAGE_PER_STRENGTH * self.stats.strength as f32
    }

    pub fn attack_radius(&self) -> f32 {
        self.weapon
            .as_ref()
            .map(|w| w.reach)
            .unwrap_or(super::weapon::BARE_HAND_RADIUS)
    }

    pub fn attack_half_angle(&self) -> f32 {
        self.weapon
            .as_ref()
            .map(|w| w.arc_half_angle)
            .unwrap_or(super::weapon::BARE_HAND_HALF_ANGLE)
    }

    /// Seconds between attacks with the current weapon and agility
    pub fn attack_cooldown(&self) -> f32 {
        let multiplier = self
            .weapon
            .as_ref()
            .map(|w| w.attack_speed_multiplier)
            .unwrap_or(1.0);
        let agility = (1.0 - COOLDOWN_REDUCTION_PER_AGILITY * self.stats.agility as f32).max(0.1);
        BASE_ATTACK_COOLDOWN / multiplier * agility
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Zero-length directions keep the previous facing
    pub fn set_facing(&mut self, facing: Vec2) {
        if let Some(dir) = facing.try_normalize() {
            self.facing = dir;
        }
    }

    pub fn set_airborne(&mut self, airborne: bool) {
        self.airborne = airborne;
    }

    pub fn set_spawn_point(&mut self, spawn_point: Vec2) {
        self.spawn_point = spawn_point;
    }

    /// Held triggers keep firing automatic weapons
    pub fn set_trigger(&mut self, held: bool) {
        self.trigger_held = held;
    }

    /// Equip a weapon, or apply it immediately when it is a consumable
    pub fn equip(&mut self, weapon: WeaponArchetype) {
        if weapon.is_consumable() {
            if let Some(effect) = weapon.stat_effect {
                self.apply_stat(effect.stat, effect.amount);
            }
            return;
        }

        self.magazine = weapon.ranged.map(|r| Magazine {
            rounds: r.magazine_size,
            reload_remaining: None,
        });
        self.weapon = Some(weapon);
    }

    /// Drop the current weapon and fall back to bare hands
    pub fn unequip(&mut self) -> Option<WeaponArchetype> {
        self.magazine = None;
        self.weapon.take()
    }

    pub fn apply_stat(&mut self, stat: StatKind, amount: i32) {
        let old_max = self.max_hp();
        self.stats.apply(stat, amount);
        if stat == StatKind::Stamina && !self.is_dead() {
            // Keep the same fraction of health when max HP changes.
            let ratio = if old_max > 0.0 { self.hp / old_max } else { 1.0 };
            self.hp = (ratio * self.max_hp()).clamp(0.0, self.max_hp());
            self.events.push(ActorEvent::HealthChanged(self.health_fraction()));
        }
        self.events.push(ActorEvent::StatsChanged(self.stats));
    }

    /// Start reloading the current ranged weapon
    pub fn reload(&mut self) -> bool {
        let reload_time = match self.weapon.as_ref().and_then(|w| w.ranged) {
            Some(r) => r.reload_time,
            None => return false,
        };
        match self.magazine.as_mut() {
            Some(mag) if mag.reload_remaining.is_none() => {
                mag.reload_remaining = Some(reload_time);
                self.events.push(ActorEvent::AnimationRequested(clips::RELOAD));
                true
            }
            _ => false,
        }
    }

    /// Begin an attack in the current facing
    pub fn try_attack(&mut self) -> Result<(), AttackRejected> {
        match self.state {
            CombatState::Dead => return Err(AttackRejected::Dead),
            CombatState::HitStun => return Err(AttackRejected::InHitStun),
            CombatState::Attacking => return Err(AttackRejected::AlreadyAttacking),
            CombatState::Idle => {}
        }
        if self.cooldown_remaining > 0.0 {
            return Err(AttackRejected::CoolingDown);
        }

        if let Some(mag) = self.magazine {
            if mag.reload_remaining.is_some() {
                return Err(AttackRejected::Reloading);
            }
            if mag.rounds == 0 {
                self.reload();
                return Err(AttackRejected::Reloading);
            }
        }

        let weapon = self.active_weapon();
        if let Some(mag) = self.magazine.as_mut() {
            mag.rounds -= 1;
        }

        let clip = if weapon.is_ranged() {
            clips::SHOOT
        } else if self.airborne {
            clips::AERIAL_SLASH
        } else {
            clips::SLASH
        };

        self.struck.clear();
        self.cooldown_remaining = self.attack_cooldown();
        self.swing = Some(Swing {
            elapsed: 0.0,
            timing: SwingTiming::for_attack(&weapon, self.airborne),
            facing: self.facing,
            airborne: self.airborne,
            spawned: false,
        });
        self.state = CombatState::Attacking;
        self.events.push(ActorEvent::AnimationRequested(clip));
        Ok(())
    }

    /// Advance timers by `dt` seconds and return the events produced since
    /// the last update
    pub fn update(&mut self, dt: f32) -> Vec<ActorEvent> {
        self.cooldown_remaining = (self.cooldown_remaining - dt).max(0.0);
        self.tick_reload(dt);

        match self.state {
            CombatState::Dead => {
                self.respawn_remaining -= dt;
                if self.respawn_remaining <= 0.0 {
                    self.respawn();
                }
            }
            CombatState::HitStun => {
                self.hit_stun_remaining -= dt;
                if self.hit_stun_remaining <= 0.0 {
                    self.hit_stun_remaining = 0.0;
                    self.state = CombatState::Idle;
                }
            }
            CombatState::Attacking => self.tick_swing(dt),
            CombatState::Idle => {}
        }

        if self.state == CombatState::Idle && self.trigger_held && self.is_automatic() {
            // Refusals just mean the next shot is not ready yet.
            let _ = self.try_attack();
        }

        self.drain_events()
    }

    /// Take events raised outside `update`, e.g. by incoming damage
    pub fn drain_events(&mut self) -> Vec<ActorEvent> {
        std::mem::take(&mut self.events)
    }

    fn is_automatic(&self) -> bool {
        self.weapon
            .as_ref()
            .and_then(|w| w.ranged)
            .is_some_and(|r| r.fire_mode == FireMode::Auto)
    }

    fn tick_reload(&mut self, dt: f32) {
        let magazine_size = match self.weapon.as_ref().and_then(|w| w.ranged) {
            Some(r) => r.magazine_size,
            None => return,
        };
        if let Some(mag) = self.magazine.as_mut() {
            if let Some(remaining) = mag.reload_remaining {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    mag.rounds = magazine_size;
                    mag.reload_remaining = None;
                    self.events.push(ActorEvent::Reloaded);
                } else {
                    mag.reload_remaining = Some(remaining);
                }
            }
        }
    }

    fn tick_swing(&mut self, dt: f32) {
        let damage = self.attack_damage();
        let Some(swing) = self.swing.as_mut() else {
            self.state = CombatState::Idle;
            return;
        };
        swing.elapsed += dt;
        let progress = swing.elapsed / SWING_SECS;

        if !swing.spawned && progress >= swing.timing.strike_at {
            swing.spawned = true;
            self.events.push(ActorEvent::AttackSpawned(AttackParams {
                attacker: self.id,
                origin: self.position,
                facing: swing.facing,
                weapon_id: self.weapon.as_ref().map(|w| w.id.clone()),
                damage,
                airborne: swing.airborne,
            }));
        }

        if progress >= 1.0 {
            self.swing = None;
            self.state = CombatState::Idle;
        }
    }

    fn die(&mut self) {
        if self.state == CombatState::Dead {
            return;
        }
        self.hp = 0.0;
        self.state = CombatState::Dead;
        self.swing = None;
        self.trigger_held = false;
        self.hit_stun_remaining = 0.0;
        self.respawn_remaining = RESPAWN_DELAY_SECS;
        self.events.push(ActorEvent::HealthChanged(0.0));
        self.events.push(ActorEvent::AnimationRequested(clips::DEATH));
        self.events.push(ActorEvent::Died);
    }

    /// Bring the actor back at its spawn point with full health
    pub fn respawn(&mut self) {
        self.hp = self.max_hp();
        self.position = self.spawn_point;
        self.state = CombatState::Idle;
        self.cooldown_remaining = 0.0;
        self.hit_stun_remaining = 0.0;
        self.respawn_remaining = 0.0;
        self.swing = None;
        self.struck.clear();
        self.events.push(ActorEvent::HealthChanged(1.0));
        self.events.push(ActorEvent::AnimationRequested(clips::IDLE));
        self.events.push(ActorEvent::Respawned);
    }

    /// Adopt an HP value decided by the server
    pub fn apply_authoritative_hp(&mut self, hp: f32) {
        if self.is_dead() {
            return;
        }
        let hp = hp.clamp(0.0, self.max_hp());
        if hp <= 0.0 {
            self.die();
            return;
        }
        if hp != self.hp {
            self.hp = hp;
            self.events.push(ActorEvent::HealthChanged(self.health_fraction()));
        }
    }
}

impl Damageable for CombatActor {
    fn actor_id(&self) -> ActorId {
        self.id
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn hit_radius(&self) -> f32 {
        DEFAULT_HIT_RADIUS
    }

    fn can_take_damage(&self) -> bool {
        !matches!(self.state, CombatState::Dead | CombatState::HitStun)
    }

    fn take_damage(&mut self, amount: f32) -> DamageOutcome {
        if !self.can_take_damage() {
            return DamageOutcome::Ignored;
        }

        self.hp = (self.hp - amount.max(0.0)).clamp(0.0, self.max_hp());
        if self.hp <= 0.0 {
            self.die();
            return DamageOutcome::Killed;
        }

        self.swing = None;
        self.state = CombatState::HitStun;
        self.hit_stun_remaining = HIT_STUN_SECS;
        self.events.push(ActorEvent::AnimationRequested(clips::RECEIVE_HIT));
        self.events.push(ActorEvent::HealthChanged(self.health_fraction()));
        DamageOutcome::Damaged { hp: self.hp }
    }
}
