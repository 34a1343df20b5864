// ============================================================================
// ecs_saveload
// ============================================================================

//! Versioned snapshot persistence for an entity-component store.
//!
//! Components marked [`SaveableComponent`] are gathered into a per-save
//! document store; on load every component record is upgraded by the
//! [`MigrationRegistry`] from the version it was saved under to the running
//! application version before it is decoded and re-attached.
//!
//! ```no_run
//! use ecs_saveload::{
//!     MigrationBuilder, MigrationRegistry, SaveLoadParameters, SaveLoadService, Saveable,
//!     SaveableComponent, World,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Health {
//!     current: u32,
//! }
//!
//! impl SaveableComponent for Health {
//!     const TYPE_NAME: &'static str = "game::Health";
//! }
//!
//! # fn main() -> ecs_saveload::Result<()> {
//! let migrations = Arc::new(MigrationRegistry::new());
//! MigrationBuilder::for_component::<Health>()
//!     .from_version("1.0.0")
//!     .to_version("1.1.0")
//!     .rename_field("hp", "current")
//!     .register(&migrations)?;
//!
//! let params = SaveLoadParameters::new("1.1.0", "saves");
//! let service = SaveLoadService::new(params, migrations)?.with_component::<Health>()?;
//!
//! let mut world = World::new();
//! let player = world.create_entity();
//! world.insert(player, Saveable);
//! world.insert(player, Health { current: 10 });
//!
//! service.save(&mut world, "slot-1")?;
//! service.load(&mut world, "slot-1")?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod migration;
pub mod snapshot;
pub mod storage;
pub mod world;

pub use config::SaveLoadParameters;
pub use core::{Document, Result, SaveLoadError, Version, from_document, to_document};
pub use migration::{MigrationBuilder, MigrationFn, MigrationRegistry, MigrationStep};
pub use snapshot::{
    ComponentRegistry, LoadEvent, OperationKind, OperationReport, OperationStatus, ProgressSink,
    RequestSender, SaveLoadRequest, SaveLoadService, SaveableComponent, spawn_worker,
};
pub use world::{Entity, Saveable, ScopeBound, WasLoadedFromSave, World};
