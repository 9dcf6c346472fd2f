//! Combat resolution - weapons, hit volumes, actors

pub mod actor;
pub mod arena;
pub mod geometry;
pub mod hit_volume;
pub mod orchestrator;
pub mod registry;
pub mod training;
pub mod weapon;

pub use actor::{ActorEvent, AttackRejected, CombatActor, CombatState};
pub use arena::{DamageReport, LocalArena};
pub use geometry::Vec2;
pub use hit_volume::{DamageOutcome, Damageable, HitEvent, HitVolume};
pub use orchestrator::{AttackOrchestrator, AttackParams, CombatContext};
pub use registry::{ActorId, ActorRegistry};
pub use training::{run_training, TrainingReport, TrainingRun};
pub use weapon::{CatalogError, WeaponArchetype, WeaponCatalog};
