//! Application state shared across routes

use std::sync::Arc;

use crate::combat::{CatalogError, CombatContext, WeaponCatalog};
use crate::config::Config;
use crate::game::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<WeaponCatalog>,
    pub combat: CombatContext,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, CatalogError> {
        let config = Arc::new(config);

        let catalog = Arc::new(WeaponCatalog::load(config.weapon_data_path.as_deref())?);

        // Shared with clients that simulate combat in-process
        let combat = CombatContext::new(Arc::clone(&catalog)).with_debug_hitboxes(config.debug_hitboxes);

        let rooms = Arc::new(RoomRegistry::new(Arc::clone(&catalog), config.room_rules()));

        Ok(Self {
            config,
            catalog,
            combat,
            rooms,
        })
    }
}
