//! Weapon spawn pool generation

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::combat::{Vec2, WeaponCatalog};
use crate::ws::protocol::WeaponSpawn;

/// Random spawns land inside `[-EXTENT, EXTENT]` on both axes
pub const SPAWN_AREA_EXTENT: f32 = 20.0;

/// One random non-consumable at a random position
pub fn random_spawn<R: Rng + ?Sized>(catalog: &WeaponCatalog, rng: &mut R) -> Option<WeaponSpawn> {
    let weapon = catalog.spawnable().choose(rng).copied()?;
    Some(WeaponSpawn {
        uuid: Uuid::new_v4(),
        weapon_id: weapon.id.clone(),
        position: Vec2::new(
            rng.gen_range(-SPAWN_AREA_EXTENT..=SPAWN_AREA_EXTENT),
            rng.gen_range(-SPAWN_AREA_EXTENT..=SPAWN_AREA_EXTENT),
        ),
    })
}

/// Initial pool for a new match: `count` random weapons plus every
/// consumable on its fixed spot
pub fn generate<R: Rng + ?Sized>(catalog: &WeaponCatalog, rng: &mut R, count: usize) -> Vec<WeaponSpawn> {
    let mut pool: Vec<WeaponSpawn> = (0..count)
        .filter_map(|_| random_spawn(catalog, rng))
        .collect();

    pool.extend(catalog.consumables().into_iter().filter_map(|weapon| {
        weapon.fixed_spawn.map(|position| WeaponSpawn {
            uuid: Uuid::new_v4(),
            weapon_id: weapon.id.clone(),
            position,
        })
    }));
    pool
}
