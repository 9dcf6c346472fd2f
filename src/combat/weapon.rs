//! Weapon catalog - immutable archetypes keyed by weapon id

use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::geometry::Vec2;

/// Bare-hand damage per swing
pub const BARE_HAND_DAMAGE: f32 = 10.0;
/// Bare-hand sector radius
pub const BARE_HAND_RADIUS: f32 = 1.5;
/// Bare-hand sector half-angle (90 degree arc)
pub const BARE_HAND_HALF_ANGLE: f32 = PI / 4.0;
/// Cooldown between swings before the attack-speed multiplier is applied (seconds)
pub const BASE_ATTACK_COOLDOWN: f32 = 0.5;
/// Largest stat raise a single consumable may grant
pub const MAX_STAT_EFFECT: i32 = 10;

/// Broad weapon family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponCategory {
    Melee,
    Ranged,
    Consumable,
}

/// What happens when a hit lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEffect {
    #[default]
    None,
    /// Projectile keeps flying after a hit
    Piercing,
    /// Projectile bursts on impact and splashes nearby targets
    Explosion,
    Knockback,
    Stun,
    Bleed,
    ArmorShred,
    Holy,
}

/// Trigger behaviour for ranged weapons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireMode {
    #[default]
    Single,
    /// Keeps firing while the trigger is held
    Auto,
}

/// Projectile and magazine parameters for ranged archetypes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangedParams {
    pub projectile_speed: f32,
    pub projectile_size: f32,
    pub magazine_size: u32,
    /// Seconds to refill an empty magazine
    pub reload_time: f32,
    /// Percent chance to hit, informational only
    pub accuracy: f32,
    #[serde(default)]
    pub fire_mode: FireMode,
}

/// Actor stat touched by a consumable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Strength,
    Agility,
    Stamina,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEffect {
    pub stat: StatKind,
    pub amount: i32,
}

/// Immutable weapon definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponArchetype {
    pub id: String,
    pub name: String,
    pub category: WeaponCategory,
    /// Damage per hit
    pub damage: f32,
    /// Sector radius for melee, travel range for ranged
    pub reach: f32,
    /// Sector half-angle in radians (0 for ranged)
    #[serde(default)]
    pub arc_half_angle: f32,
    pub attack_speed_multiplier: f32,
    #[serde(default)]
    pub special_effect: SpecialEffect,
    #[serde(default)]
    pub ranged: Option<RangedParams>,
    #[serde(default)]
    pub stat_effect: Option<StatEffect>,
    /// Consumables only spawn on their fixed spot
    #[serde(default)]
    pub fixed_spawn: Option<Vec2>,
}

impl WeaponArchetype {
    /// Stats an actor uses with nothing equipped
    pub fn bare_hand() -> Self {
        Self {
            id: "bare_hand".to_string(),
            name: "Bare hand".to_string(),
            category: WeaponCategory::Melee,
            damage: BARE_HAND_DAMAGE,
            reach: BARE_HAND_RADIUS,
            arc_half_angle: BARE_HAND_HALF_ANGLE,
            attack_speed_multiplier: 1.0,
            special_effect: SpecialEffect::None,
            ranged: None,
            stat_effect: None,
            fixed_spawn: None,
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.category == WeaponCategory::Ranged
    }

    pub fn is_consumable(&self) -> bool {
        self.category == WeaponCategory::Consumable
    }

    /// Cooldown between attacks: `base / attack_speed_multiplier`
    pub fn effective_cooldown(&self, base_cooldown: f32) -> f32 {
        base_cooldown / self.attack_speed_multiplier
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: &str| CatalogError::InvalidArchetype {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if !(self.attack_speed_multiplier > 0.0) {
            return Err(invalid("attack_speed_multiplier must be > 0"));
        }
        if !(self.damage >= 0.0) {
            return Err(invalid("damage must be >= 0"));
        }
        if !(self.reach >= 0.0) || !(self.arc_half_angle >= 0.0) {
            return Err(invalid("reach and arc must be >= 0"));
        }
        if self.is_ranged() {
            match self.ranged {
                Some(r) if r.projectile_speed > 0.0 && r.projectile_size >= 0.0 => {}
                _ => return Err(invalid("ranged weapons need projectile parameters")),
            }
        }
        if let Some(effect) = self.stat_effect {
            if !(1..=MAX_STAT_EFFECT).contains(&effect.amount) {
                return Err(invalid("stat effect amount must be between 1 and 10"));
            }
        }
        Ok(())
    }
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown weapon: {0}")]
    UnknownWeapon(String),

    #[error("Invalid weapon {id}: {reason}")]
    InvalidArchetype { id: String, reason: String },

    #[error("Failed to read weapon data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse weapon data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Static registry of weapon archetypes, loaded once at startup
#[derive(Debug, Clone)]
pub struct WeaponCatalog {
    weapons: BTreeMap<String, WeaponArchetype>,
}

impl WeaponCatalog {
    /// Build a catalog from archetypes, rejecting invalid entries
    pub fn from_archetypes(
        archetypes: impl IntoIterator<Item = WeaponArchetype>,
    ) -> Result<Self, CatalogError> {
        let mut weapons = BTreeMap::new();
        for archetype in archetypes {
            archetype.validate()?;
            weapons.insert(archetype.id.clone(), archetype);
        }
        Ok(Self { weapons })
    }

    /// Parse a JSON array of archetypes
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let archetypes: Vec<WeaponArchetype> = serde_json::from_str(json)?;
        Self::from_archetypes(archetypes)
    }

    /// Load a catalog from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Look up an archetype by id
    pub fn lookup(&self, id: &str) -> Result<WeaponArchetype, CatalogError> {
        self.weapons
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownWeapon(id.to_string()))
    }

    /// Borrow an archetype by id
    pub fn get(&self, id: &str) -> Option<&WeaponArchetype> {
        self.weapons.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.weapons.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }

    /// All archetypes in id order
    pub fn iter(&self) -> impl Iterator<Item = &WeaponArchetype> {
        self.weapons.values()
    }

    /// Archetypes eligible for random spawn positions
    pub fn spawnable(&self) -> Vec<&WeaponArchetype> {
        self.weapons.values().filter(|w| !w.is_consumable()).collect()
    }

    /// Consumables, which only spawn on their fixed spots
    pub fn consumables(&self) -> Vec<&WeaponArchetype> {
        self.weapons.values().filter(|w| w.is_consumable()).collect()
    }

    /// The built-in weapon table
    pub fn builtin() -> Self {
        let melee = |id: &str,
                     name: &str,
                     damage: f32,
                     reach: f32,
                     arc: f32,
                     speed: f32,
                     effect: SpecialEffect| {
            WeaponArchetype {
                id: id.to_string(),
                name: name.to_string(),
                category: WeaponCategory::Melee,
                damage,
                reach,
                arc_half_angle: arc / 2.0,
                attack_speed_multiplier: speed,
                special_effect: effect,
                ranged: None,
                stat_effect: None,
                fixed_spawn: None,
            }
        };
        let ranged = |id: &str,
                      name: &str,
                      damage: f32,
                      range: f32,
                      speed: f32,
                      effect: SpecialEffect,
                      params: RangedParams| WeaponArchetype {
            id: id.to_string(),
            name: name.to_string(),
            category: WeaponCategory::Ranged,
            damage,
            reach: range,
            arc_half_angle: 0.0,
            attack_speed_multiplier: speed,
            special_effect: effect,
            ranged: Some(params),
            stat_effect: None,
            fixed_spawn: None,
        };
        let gun = |projectile_speed: f32,
                   projectile_size: f32,
                   magazine_size: u32,
                   reload_time: f32,
                   accuracy: f32,
                   fire_mode: FireMode| {
            RangedParams {
                projectile_speed,
                projectile_size,
                magazine_size,
                reload_time,
                accuracy,
                fire_mode,
            }
        };

        use SpecialEffect as E;
        let archetypes = vec![
            melee("sword", "Sword", 25.0, 2.0, PI / 3.0, 1.8, E::None),
            melee("doubleaxe", "Double Axe", 30.0, 2.2, PI / 2.5, 1.5, E::Knockback),
            melee("dagger", "Dagger", 15.0, 1.5, PI / 2.0, 2.5, E::Bleed),
            melee("hammer", "Hammer", 50.0, 2.5, PI / 2.2, 0.8, E::Stun),
            melee("greatsword", "Greatsword", 45.0, 2.6, PI / 3.1, 1.0, E::None),
            melee("handaxe", "Hand Axe", 20.0, 1.8, PI / 2.1, 2.0, E::None),
            melee("doubleaxe_golden", "Golden Double Axe", 40.0, 2.3, PI / 2.4, 1.6, E::Knockback),
            melee("dagger_golden", "Golden Dagger", 25.0, 1.6, PI / 1.8, 3.0, E::Bleed),
            melee("hammer_golden", "Golden Hammer", 70.0, 2.8, PI / 2.1, 0.9, E::Stun),
            melee("greatsword_golden", "Golden Greatsword", 60.0, 2.8, PI / 3.0, 1.1, E::ArmorShred),
            melee("sword_golden", "Golden Sword", 35.0, 2.1, PI / 2.8, 2.0, E::Holy),
            ranged("pistol", "Pistol", 20.0, 10.0, 2.0, E::None,
                gun(40.0, 0.2, 12, 1.5, 85.0, FireMode::Single)),
            ranged("smg", "Submachine Gun", 18.0, 12.0, 8.0, E::None,
                gun(30.0, 0.4, 30, 2.5, 75.0, FireMode::Auto)),
            ranged("shotgun", "Shotgun", 35.0, 8.0, 1.5, E::Explosion,
                gun(30.0, 0.4, 8, 3.0, 60.0, FireMode::Single)),
            ranged("sniper", "Sniper Rifle", 80.0, 30.0, 0.5, E::Piercing,
                gun(60.0, 0.2, 5, 4.0, 95.0, FireMode::Single)),
            ranged("assault", "Assault Rifle", 30.0, 20.0, 6.0, E::None,
                gun(30.0, 0.4, 25, 3.5, 80.0, FireMode::Auto)),
            WeaponArchetype {
                id: "potion".to_string(),
                name: "Potion".to_string(),
                category: WeaponCategory::Consumable,
                damage: 0.0,
                reach: 0.5,
                arc_half_angle: 0.0,
                attack_speed_multiplier: 1.0,
                special_effect: E::None,
                ranged: None,
                stat_effect: Some(StatEffect {
                    stat: StatKind::Strength,
                    amount: 1,
                }),
                fixed_spawn: Some(Vec2::new(0.0, 4.0)),
            },
        ];

        let weapons = archetypes.into_iter().map(|w| (w.id.clone(), w)).collect();
        Self { weapons }
    }

    /// Built-in table, or the JSON file at `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }
}

impl Default for WeaponCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
