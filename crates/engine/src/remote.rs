use crate::adapter::{self, GardenGeometry, InventorySnapshot};
use crate::model::{GardenState, TileObject};
use crate::normalize::Normalizer;
use garden_layout_protocol::{labels, GameCommand};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// The page store bridge: named state slots plus the outgoing game channel.
///
/// Reads may be stale and writes are not transactional. Callers re-read
/// instead of trusting anything they computed earlier.
pub trait RemoteStore: Send + Sync {
    /// Snapshot of a named slot, `None` when the slot is not registered yet.
    fn select(&self, label: &str) -> impl Future<Output = Option<Value>> + Send;

    /// Replaces a named slot wholesale.
    fn set(&self, label: &str, value: Value) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Fire-and-forget game command.
    fn send_to_game(&self, command: GameCommand)
        -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<S: RemoteStore> RemoteStore for Arc<S> {
    fn select(&self, label: &str) -> impl Future<Output = Option<Value>> + Send {
        (**self).select(label)
    }

    fn set(&self, label: &str, value: Value) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).set(label, value)
    }

    fn send_to_game(
        &self,
        command: GameCommand,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).send_to_game(command)
    }
}

/// Typed, normalized view over a [`RemoteStore`].
pub struct RemoteState<'a, S> {
    store: &'a S,
    norm: &'a Normalizer,
}

impl<'a, S: RemoteStore> RemoteState<'a, S> {
    pub fn new(store: &'a S, norm: &'a Normalizer) -> Self {
        Self { store, norm }
    }

    /// Live garden with canonical species names. Eggs are kept.
    pub async fn garden(&self) -> Option<GardenState> {
        let raw = self.store.select(labels::STATE).await?;
        let mut garden = adapter::garden_from_value(&raw)?;
        for obj in garden
            .tile_objects
            .values_mut()
            .chain(garden.boardwalk_tile_objects.values_mut())
        {
            if let TileObject::Plant(plant) = obj {
                plant.species = self.norm.species(&plant.species);
            }
        }
        Some(garden)
    }

    /// Inventory with canonical species names on plant-like items. An
    /// unavailable inventory reads as empty.
    pub async fn inventory(&self) -> InventorySnapshot {
        let Some(raw) = self.store.select(labels::INVENTORY).await else {
            return InventorySnapshot::default();
        };
        let mut inv = adapter::inventory_from_value(&raw);
        for item in &mut inv.items {
            if matches!(
                item.kind,
                adapter::ItemKind::Plant | adapter::ItemKind::Seed | adapter::ItemKind::Produce
            ) {
                item.key = self.norm.species(&item.key);
            }
        }
        inv
    }

    pub async fn geometry(&self) -> GardenGeometry {
        let raw = self.store.select(labels::MAP).await;
        adapter::geometry_from_value(raw.as_ref())
    }

    pub async fn raw_state(&self) -> Option<Value> {
        self.store.select(labels::STATE).await
    }

    /// Writes `garden` straight into the state slot. No reconciliation.
    pub async fn overwrite_garden(&self, garden: &GardenState) -> anyhow::Result<()> {
        let raw = self.store.select(labels::STATE).await;
        let value = adapter::write_garden(raw, garden);
        self.store.set(labels::STATE, value).await
    }

    pub async fn restore_state(&self, snapshot: Value) -> anyhow::Result<()> {
        self.store.set(labels::STATE, snapshot).await
    }

    pub async fn send(&self, command: GameCommand) -> anyhow::Result<()> {
        tracing::debug!(target: "garden_layout::remote", command = command.name(), "send");
        self.store.send_to_game(command).await
    }
}
