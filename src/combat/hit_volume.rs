//! Transient hit volumes
//!
//! A hit volume is spawned for every attack and resolved against the set of
//! damage-receiving actors on each tick until it is destroyed. Two shapes are
//! supported:
//!
//! - sectors (melee swings, grounded or aerial) evaluate on their first tick,
//!   strike at most one target, then either vanish or linger briefly so a
//!   debug overlay can show the miss
//! - traveling circles (projectiles) advance along their facing and test a
//!   circle against each target's hit radius until they hit or run out of
//!   range

use std::collections::HashSet;

use super::geometry::{circles_overlap, in_sector, Vec2};
use super::registry::ActorId;
use super::weapon::{SpecialEffect, WeaponArchetype};

/// Radius of the body circle used for projectile tests
pub const DEFAULT_HIT_RADIUS: f32 = 0.7;
/// How long a sector that missed stays around for visualisation (seconds)
pub const SECTOR_LINGER_SECS: f32 = 0.2;
/// Splash radius relative to the projectile radius
pub const EXPLOSION_RADIUS_FACTOR: f32 = 2.0;
/// Splash damage relative to the direct hit
pub const EXPLOSION_DAMAGE_FACTOR: f32 = 0.5;

/// Result of applying damage to an actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// The actor refused the damage (dead or in hit-stun)
    Ignored,
    Damaged { hp: f32 },
    Killed,
}

impl DamageOutcome {
    pub fn landed(self) -> bool {
        !matches!(self, DamageOutcome::Ignored)
    }
}

/// Anything a hit volume can strike
pub trait Damageable {
    fn actor_id(&self) -> ActorId;

    fn position(&self) -> Vec2;

    fn hit_radius(&self) -> f32 {
        DEFAULT_HIT_RADIUS
    }

    /// False while dead or recovering from a previous hit
    fn can_take_damage(&self) -> bool;

    fn take_damage(&mut self, amount: f32) -> DamageOutcome;
}

/// Identifier of a live hit volume, unique per orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub u64);

/// Geometry of a hit volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeShape {
    /// Ground swing
    Sector { half_angle: f32 },
    /// Swing started while airborne; resolves like a sector
    AerialSector { half_angle: f32 },
    /// Projectile moving `speed` units per second for at most `range` units
    TravelingCircle { speed: f32, range: f32 },
}

impl VolumeShape {
    /// Derive shape and radius from a weapon and the attacker's stance
    pub fn for_attack(weapon: &WeaponArchetype, airborne: bool) -> (VolumeShape, f32) {
        match weapon.ranged {
            Some(ranged) if weapon.is_ranged() => (
                VolumeShape::TravelingCircle {
                    speed: ranged.projectile_speed,
                    range: weapon.reach,
                },
                ranged.projectile_size,
            ),
            _ if airborne => (
                VolumeShape::AerialSector {
                    half_angle: weapon.arc_half_angle,
                },
                weapon.reach,
            ),
            _ => (
                VolumeShape::Sector {
                    half_angle: weapon.arc_half_angle,
                },
                weapon.reach,
            ),
        }
    }

    fn is_sector(self) -> bool {
        !matches!(self, VolumeShape::TravelingCircle { .. })
    }
}

/// Whether a hit was the primary strike or explosion splash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Direct,
    Splash,
}

/// A single accepted or refused strike
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvent {
    pub volume: VolumeId,
    pub attacker: ActorId,
    pub target: ActorId,
    pub damage: f32,
    pub kind: HitKind,
    pub outcome: DamageOutcome,
    pub at: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Sector not yet evaluated, or projectile in flight
    Active,
    /// Sector missed and is held for display only
    Lingering { remaining: f32 },
    Destroyed,
}

/// A live attack volume
#[derive(Debug, Clone)]
pub struct HitVolume {
    id: VolumeId,
    attacker: ActorId,
    weapon_id: String,
    origin: Vec2,
    facing: Vec2,
    shape: VolumeShape,
    radius: f32,
    damage: f32,
    effect: SpecialEffect,
    traveled: f32,
    struck: HashSet<ActorId>,
    phase: Phase,
}

impl HitVolume {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VolumeId,
        attacker: ActorId,
        weapon: &WeaponArchetype,
        origin: Vec2,
        facing: Vec2,
        shape: VolumeShape,
        radius: f32,
        damage: f32,
    ) -> Self {
        Self {
            id,
            attacker,
            weapon_id: weapon.id.clone(),
            origin,
            facing: facing.normalize_or(Vec2::FORWARD),
            shape,
            radius,
            damage,
            effect: weapon.special_effect,
            traveled: 0.0,
            struck: HashSet::new(),
            phase: Phase::Active,
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn attacker(&self) -> ActorId {
        self.attacker
    }

    pub fn weapon_id(&self) -> &str {
        &self.weapon_id
    }

    /// Current center (moves for projectiles)
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn damage(&self) -> f32 {
        self.damage
    }

    pub fn traveled(&self) -> f32 {
        self.traveled
    }

    pub fn has_struck(&self, target: ActorId) -> bool {
        self.struck.contains(&target)
    }

    pub fn is_destroyed(&self) -> bool {
        self.phase == Phase::Destroyed
    }

    /// Sector that missed and only remains for display
    pub fn is_lingering(&self) -> bool {
        matches!(self.phase, Phase::Lingering { .. })
    }

    /// Idempotent; a destroyed volume never resolves again
    pub fn destroy(&mut self) {
        self.phase = Phase::Destroyed;
    }

    /// Advance the volume by `dt` seconds and apply any hits to `targets`.
    ///
    /// Targets are tested in slice order; for sectors the first eligible
    /// target wins.
    pub fn resolve(&mut self, dt: f32, targets: &mut [&mut dyn Damageable]) -> Vec<HitEvent> {
        match self.phase {
            Phase::Destroyed => Vec::new(),
            Phase::Lingering { remaining } => {
                let remaining = remaining - dt;
                self.phase = if remaining <= 0.0 {
                    Phase::Destroyed
                } else {
                    Phase::Lingering { remaining }
                };
                Vec::new()
            }
            Phase::Active if self.shape.is_sector() => self.resolve_sector(targets),
            Phase::Active => self.resolve_projectile(dt, targets),
        }
    }

    fn eligible(&self, target: &dyn Damageable) -> bool {
        target.actor_id() != self.attacker
            && !self.struck.contains(&target.actor_id())
            && target.can_take_damage()
    }

    fn strike(&mut self, target: &mut dyn Damageable, damage: f32, kind: HitKind) -> HitEvent {
        let id = target.actor_id();
        self.struck.insert(id);
        let outcome = target.take_damage(damage);
        HitEvent {
            volume: self.id,
            attacker: self.attacker,
            target: id,
            damage,
            kind,
            outcome,
            at: target.position(),
        }
    }

    fn resolve_sector(&mut self, targets: &mut [&mut dyn Damageable]) -> Vec<HitEvent> {
        let half_angle = match self.shape {
            VolumeShape::Sector { half_angle } | VolumeShape::AerialSector { half_angle } => {
                half_angle
            }
            VolumeShape::TravelingCircle { .. } => return Vec::new(),
        };

        for target in targets.iter_mut() {
            if !self.eligible(&**target) {
                continue;
            }
            if in_sector(self.origin, self.facing, self.radius, half_angle, target.position()) {
                let event = self.strike(&mut **target, self.damage, HitKind::Direct);
                self.destroy();
                return vec![event];
            }
        }

        self.phase = Phase::Lingering {
            remaining: SECTOR_LINGER_SECS,
        };
        Vec::new()
    }

    fn resolve_projectile(&mut self, dt: f32, targets: &mut [&mut dyn Damageable]) -> Vec<HitEvent> {
        let (speed, range) = match self.shape {
            VolumeShape::TravelingCircle { speed, range } => (speed, range),
            _ => return Vec::new(),
        };

        let step = (speed * dt).min((range - self.traveled).max(0.0));
        self.origin += self.facing * step;
        self.traveled += step;

        let mut events = Vec::new();
        let mut detonated = false;
        for target in targets.iter_mut() {
            if !self.eligible(&**target) {
                continue;
            }
            if !circles_overlap(self.origin, self.radius, target.position(), target.hit_radius()) {
                continue;
            }

            events.push(self.strike(&mut **target, self.damage, HitKind::Direct));
            match self.effect {
                SpecialEffect::Piercing => continue,
                SpecialEffect::Explosion => {
                    detonated = true;
                    break;
                }
                _ => {
                    self.destroy();
                    return events;
                }
            }
        }

        if detonated {
            events.extend(self.explode(targets));
            self.destroy();
            return events;
        }

        if self.traveled >= range {
            self.destroy();
        }
        events
    }

    /// Splash every other eligible target around the impact point
    fn explode(&mut self, targets: &mut [&mut dyn Damageable]) -> Vec<HitEvent> {
        let splash_radius = self.radius * EXPLOSION_RADIUS_FACTOR;
        let splash_damage = self.damage * EXPLOSION_DAMAGE_FACTOR;

        let mut events = Vec::new();
        for target in targets.iter_mut() {
            if !self.eligible(&**target) {
                continue;
            }
            if self.origin.distance(target.position()) <= splash_radius {
                events.push(self.strike(&mut **target, splash_damage, HitKind::Splash));
            }
        }
        events
    }
}
