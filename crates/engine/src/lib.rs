//! Garden layout engine: draft/live models, species and mutation
//! normalization, requirement planning, the apply loop and the saved layout
//! library.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod layout;
pub mod library;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod remote;
pub mod requirements;
pub mod service;

pub use adapter::{GardenGeometry, InventoryItem, InventorySnapshot, ItemKind};
pub use config::{ApplyCancel, ApplyLimits, ApplyOptions, ApplyTiming};
pub use error::LayoutError;
pub use library::LayoutLibrary;
pub use memory::MemoryRemote;
pub use model::{GardenState, IgnoredTiles, SavedLayout, TileObject, TileRef};
pub use normalize::Normalizer;
pub use reconcile::{apply_garden_server, apply_garden_server_with_potting, ApplyOutcome, ApplyReport};
pub use remote::{RemoteState, RemoteStore};
pub use requirements::{PlanterPotRequirement, RequirementEntry};
pub use service::{ActionResult, ApplyGardenOptions, ApplyGardenResult, GardenLayoutService};

#[cfg(test)]
mod tests;
