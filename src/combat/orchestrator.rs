//! Attack orchestration - turns attack requests into hit volumes and ticks them

use std::sync::Arc;

use tracing::{debug, warn};

use super::geometry::Vec2;
use super::hit_volume::{Damageable, HitEvent, HitVolume, VolumeId, VolumeShape};
use super::registry::ActorId;
use super::weapon::{CatalogError, WeaponArchetype, WeaponCatalog};

/// Everything needed to spawn one attack
#[derive(Debug, Clone, PartialEq)]
pub struct AttackParams {
    pub attacker: ActorId,
    pub origin: Vec2,
    pub facing: Vec2,
    /// `None` attacks with bare hands
    pub weapon_id: Option<String>,
    /// Damage after the attacker's stat bonuses
    pub damage: f32,
    pub airborne: bool,
}

/// Optional overlay that draws live hit volumes
pub trait DebugVisualizer: Send + Sync {
    fn draw(&self, volume: &HitVolume);

    fn erase(&self, id: VolumeId);
}

/// Draws nothing
#[derive(Debug, Default)]
pub struct NoopVisualizer;

impl DebugVisualizer for NoopVisualizer {
    fn draw(&self, _volume: &HitVolume) {}

    fn erase(&self, _id: VolumeId) {}
}

/// Emits volume geometry as trace events
#[derive(Debug, Default)]
pub struct TracingVisualizer;

impl DebugVisualizer for TracingVisualizer {
    fn draw(&self, volume: &HitVolume) {
        debug!(
            volume = volume.id().0,
            attacker = %volume.attacker(),
            x = volume.origin().x,
            y = volume.origin().y,
            radius = volume.radius(),
            shape = ?volume.shape(),
            "Hit volume"
        );
    }

    fn erase(&self, id: VolumeId) {
        debug!(volume = id.0, "Hit volume removed");
    }
}

/// Shared services for attack resolution
#[derive(Clone)]
pub struct CombatContext {
    pub catalog: Arc<WeaponCatalog>,
    pub visualizer: Arc<dyn DebugVisualizer>,
}

impl CombatContext {
    pub fn new(catalog: Arc<WeaponCatalog>) -> Self {
        Self {
            catalog,
            visualizer: Arc::new(NoopVisualizer),
        }
    }

    pub fn with_debug_hitboxes(mut self, enabled: bool) -> Self {
        self.visualizer = if enabled {
            Arc::new(TracingVisualizer)
        } else {
            Arc::new(NoopVisualizer)
        };
        self
    }
}

/// Owns every live hit volume
pub struct AttackOrchestrator {
    ctx: CombatContext,
    volumes: Vec<HitVolume>,
    next_id: u64,
}

impl AttackOrchestrator {
    pub fn new(ctx: CombatContext) -> Self {
        Self {
            ctx,
            volumes: Vec::new(),
            next_id: 1,
        }
    }

    pub fn catalog(&self) -> &WeaponCatalog {
        &self.ctx.catalog
    }

    /// Spawn a hit volume for an attack
    ///
    /// Fails with [`CatalogError::UnknownWeapon`] when the weapon id is not in
    /// the catalog; no volume is created in that case.
    pub fn spawn(&mut self, params: AttackParams) -> Result<VolumeId, CatalogError> {
        let weapon = match params.weapon_id.as_deref() {
            Some(id) => self.ctx.catalog.lookup(id)?,
            None => WeaponArchetype::bare_hand(),
        };
        let (shape, radius) = VolumeShape::for_attack(&weapon, params.airborne);

        let id = VolumeId(self.next_id);
        self.next_id += 1;

        let volume = HitVolume::new(
            id,
            params.attacker,
            &weapon,
            params.origin,
            params.facing,
            shape,
            radius,
            params.damage,
        );
        self.ctx.visualizer.draw(&volume);
        self.volumes.push(volume);
        Ok(id)
    }

    /// Spawn an attack, logging and dropping it when the weapon is unknown
    pub fn spawn_or_warn(&mut self, params: AttackParams) -> Option<VolumeId> {
        let attacker = params.attacker;
        match self.spawn(params) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%attacker, "Attack aborted: {}", e);
                None
            }
        }
    }

    /// Resolve every live volume against `targets`, then drop destroyed ones
    pub fn tick(&mut self, dt: f32, targets: &mut [&mut dyn Damageable]) -> Vec<HitEvent> {
        let mut events = Vec::new();
        for volume in self.volumes.iter_mut() {
            events.extend(volume.resolve(dt, targets));
            if !volume.is_destroyed() {
                self.ctx.visualizer.draw(volume);
            }
        }

        let visualizer = &self.ctx.visualizer;
        self.volumes.retain(|volume| {
            if volume.is_destroyed() {
                visualizer.erase(volume.id());
                false
            } else {
                true
            }
        });
        events
    }

    pub fn get(&self, id: VolumeId) -> Option<&HitVolume> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    pub fn live_count(&self) -> usize {
        self.volumes.len()
    }

    /// Destroy every volume spawned by `attacker`
    pub fn cancel_from(&mut self, attacker: ActorId) {
        for volume in self.volumes.iter_mut().filter(|v| v.attacker() == attacker) {
            volume.destroy();
        }
    }
}
