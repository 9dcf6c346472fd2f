//! Training-dummy runs for weapon tuning
//!
//! Swings a weapon at a stationary NPC in a throwaway [`LocalArena`] and
//! reports what landed. Nothing here touches a room.

use serde::{Deserialize, Serialize};

use super::actor::CombatState;
use super::arena::LocalArena;
use super::geometry::Vec2;
use super::orchestrator::CombatContext;
use super::weapon::CatalogError;
use crate::util::time::tick_delta;

/// Effectively unkillable
pub const TRAINING_DUMMY_HP: f32 = 99_999_999.0;
pub const MAX_TRAINING_ATTACKS: u32 = 20;
/// Upper bound on simulated time per run
const MAX_RUN_SECS: f32 = 60.0;

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingRun {
    /// `None` swings bare-handed
    #[serde(default)]
    pub weapon_id: Option<String>,
    /// Dummy position relative to an attacker at the origin facing +y
    pub target: Vec2,
    #[serde(default)]
    pub airborne: bool,
    #[serde(default = "default_attacks")]
    pub attacks: u32,
}

fn default_attacks() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingReport {
    pub weapon_id: Option<String>,
    pub attacks: u32,
    pub hits: u32,
    pub total_damage: f32,
    pub damage_per_attack: f32,
    pub cooldown: f32,
    pub elapsed: f32,
}

/// Run `run.attacks` attacks against a training dummy
pub fn run_training(ctx: &CombatContext, run: &TrainingRun) -> Result<TrainingReport, CatalogError> {
    let weapon = run
        .weapon_id
        .as_deref()
        .map(|id| ctx.catalog.lookup(id))
        .transpose()?;

    let mut arena = LocalArena::new(ctx.clone());
    let attacker = arena.spawn_player(uuid::Uuid::new_v4(), Vec2::ZERO);
    let dummy = arena.spawn_npc(run.target, TRAINING_DUMMY_HP);

    let (damage_per_attack, cooldown) = match arena.actor_mut(attacker) {
        Some(actor) => {
            if let Some(weapon) = weapon {
                actor.equip(weapon);
            }
            actor.set_airborne(run.airborne);
            (actor.attack_damage(), actor.attack_cooldown())
        }
        None => (0.0, 0.0),
    };

    let dt = tick_delta();
    let mut remaining = run.attacks.min(MAX_TRAINING_ATTACKS);
    let attacks = remaining;
    let mut hits = 0;
    let mut total_damage = 0.0;
    let mut elapsed = 0.0;

    while elapsed < MAX_RUN_SECS {
        if remaining > 0 && arena.trigger_attack(attacker).is_ok() {
            remaining -= 1;
        }

        let tick = arena.tick(dt);
        elapsed += dt;
        for hit in tick.hits.iter().filter(|h| h.target == dummy && h.outcome.landed()) {
            hits += 1;
            total_damage += hit.damage;
        }

        let settled = arena
            .actor(attacker)
            .map_or(true, |a| a.state() != CombatState::Attacking);
        if remaining == 0 && settled && arena.live_volumes() == 0 {
            break;
        }
    }

    Ok(TrainingReport {
        weapon_id: run.weapon_id.clone(),
        attacks,
        hits,
        total_damage,
        damage_per_attack,
        cooldown,
        elapsed,
    })
}
