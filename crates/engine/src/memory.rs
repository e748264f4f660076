//! In-process stand-in for the page store and game connection.
//!
//! Commands follow the game's rules closely enough to exercise the apply
//! loop: a pot needs a plant, a free slot and a Planter Pot charge; planting
//! needs the item and an empty tile; and so on. Rejected commands are
//! recorded and otherwise dropped, like the real server does. With a read
//! lag, commands only take effect after that many further `select` calls.

use crate::adapter::{self, InventoryItem, InventorySnapshot, ItemKind};
use crate::catalog::PLANTER_POT_TOOL_ID;
use crate::model::{GardenState, PlantObject, PlantSlot, TileObject, TileRef};
use crate::remote::RemoteStore;
use garden_layout_protocol::{labels, Envelope, GameCommand};
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SimState {
    garden: GardenState,
    inventory: InventorySnapshot,
    map: Option<Value>,
    /// Keeps whatever else the state snapshot carried around the garden.
    state_extra: Option<Value>,
    sent: Vec<GameCommand>,
    rejected: Vec<GameCommand>,
    queue: VecDeque<(u64, GameCommand)>,
    reads: u64,
    lag: u64,
    next_item: u64,
    garden_available: bool,
    fail_sends: bool,
    /// Dirt slots where `PlantGardenPlant` is always refused.
    refused_plant_slots: BTreeSet<u32>,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<SimState>,
}

impl MemoryRemote {
    pub fn new(garden: GardenState, inventory: InventorySnapshot) -> Self {
        Self {
            state: Mutex::new(SimState {
                garden,
                inventory,
                garden_available: true,
                ..SimState::default()
            }),
        }
    }

    /// Commands take effect only after `reads` further `select` calls.
    pub fn with_read_lag(self, reads: u64) -> Self {
        self.lock().lag = reads;
        self
    }

    pub fn with_map(self, map: Value) -> Self {
        self.lock().map = Some(map);
        self
    }

    /// `select("stateAtom")` returns nothing, as before the hook captured it.
    pub fn without_garden(self) -> Self {
        self.lock().garden_available = false;
        self
    }

    /// Every `send_to_game` fails, as with a dropped connection.
    pub fn failing_sends(self) -> Self {
        self.lock().fail_sends = true;
        self
    }

    /// The game refuses to plant on `slot`, as when the tile is locked.
    pub fn refusing_plants_on(self, slot: u32) -> Self {
        self.lock().refused_plant_slots.insert(slot);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock only means a test panicked mid-command.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn garden(&self) -> GardenState {
        let mut state = self.lock();
        state.flush_all();
        state.garden.clone()
    }

    pub fn inventory(&self) -> InventorySnapshot {
        let mut state = self.lock();
        state.flush_all();
        state.inventory.clone()
    }

    /// Every command sent, accepted or not, in send order.
    pub fn sent(&self) -> Vec<GameCommand> {
        self.lock().sent.clone()
    }

    pub fn rejected(&self) -> Vec<GameCommand> {
        let mut state = self.lock();
        state.flush_all();
        state.rejected.clone()
    }

    pub fn clear_sent(&self) {
        let mut state = self.lock();
        state.sent.clear();
        state.rejected.clear();
    }
}

impl SimState {
    fn flush_ready(&mut self) {
        while let Some((ready_at, _)) = self.queue.front() {
            if *ready_at > self.reads {
                break;
            }
            if let Some((_, command)) = self.queue.pop_front() {
                self.execute(command);
            }
        }
    }

    fn flush_all(&mut self) {
        while let Some((_, command)) = self.queue.pop_front() {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: GameCommand) {
        let accepted = match &command {
            GameCommand::PotPlant { slot } => self.pot_plant(*slot),
            GameCommand::PlantGardenPlant { slot, item_id } => self.plant(*slot, item_id),
            GameCommand::PlaceDecor {
                tile_type,
                local_tile_index,
                decor_id,
                rotation,
            } => self.place_decor(
                TileRef {
                    tile_type: *tile_type,
                    index: *local_tile_index,
                },
                decor_id,
                *rotation,
            ),
            GameCommand::PickupDecor {
                tile_type,
                local_tile_index,
            } => self.pickup_decor(TileRef {
                tile_type: *tile_type,
                index: *local_tile_index,
            }),
        };
        if !accepted {
            self.rejected.push(command);
        }
    }

    fn pot_plant(&mut self, slot: u32) -> bool {
        let tile = TileRef::dirt(slot);
        let Some(TileObject::Plant(_)) = self.garden.object(tile) else {
            return false;
        };
        if self.inventory.free_slots() == 0 {
            return false;
        }
        let Some(pots) = self
            .inventory
            .items
            .iter_mut()
            .find(|i| i.kind == ItemKind::Tool && i.key == PLANTER_POT_TOOL_ID && i.quantity > 0)
        else {
            return false;
        };
        pots.quantity -= 1;
        self.inventory
            .items
            .retain(|i| !(i.kind == ItemKind::Tool && i.quantity == 0));

        let Some(TileObject::Plant(plant)) = self.garden.clear(tile) else {
            return false;
        };
        self.next_item += 1;
        let mut mutations: Vec<String> = Vec::new();
        for m in plant.slots.iter().flat_map(|s| s.mutations.iter()) {
            if !mutations.contains(m) {
                mutations.push(m.clone());
            }
        }
        self.inventory.items.push(InventoryItem {
            id: format!("potted-{}", self.next_item),
            kind: ItemKind::Plant,
            key: plant.species,
            quantity: 1,
            mutations,
            slots: plant.slots,
        });
        true
    }

    fn plant(&mut self, slot: u32, item_id: &str) -> bool {
        let tile = TileRef::dirt(slot);
        if self.refused_plant_slots.contains(&slot) || self.garden.object(tile).is_some() {
            return false;
        }
        let Some(pos) = self
            .inventory
            .items
            .iter()
            .position(|i| i.id == item_id && i.kind == ItemKind::Plant)
        else {
            return false;
        };
        let item = self.inventory.items.remove(pos);
        let slots = if item.slots.is_empty() {
            vec![PlantSlot::new(item.key.clone(), item.mutations.clone())]
        } else {
            item.slots
        };
        self.garden.set(
            tile,
            TileObject::Plant(PlantObject {
                species: item.key,
                seed_key: None,
                planted_at: 0,
                matured_at: 0,
                slots,
                glc_mutations: Vec::new(),
            }),
        );
        true
    }

    fn place_decor(&mut self, tile: TileRef, decor_id: &str, rotation: i32) -> bool {
        if self.garden.object(tile).is_some() {
            return false;
        }
        let Some(pos) = self
            .inventory
            .items
            .iter()
            .position(|i| i.kind == ItemKind::Decor && i.key == decor_id && i.quantity > 0)
        else {
            return false;
        };
        self.inventory.items[pos].quantity -= 1;
        if self.inventory.items[pos].quantity == 0 {
            self.inventory.items.remove(pos);
        }
        self.garden.set(
            tile,
            TileObject::Decor(crate::model::DecorObject {
                decor_id: decor_id.to_string(),
                rotation,
            }),
        );
        true
    }

    fn pickup_decor(&mut self, tile: TileRef) -> bool {
        let Some(TileObject::Decor(decor)) = self.garden.object(tile) else {
            return false;
        };
        let decor_id = decor.decor_id.clone();
        let stack = self
            .inventory
            .items
            .iter_mut()
            .find(|i| i.kind == ItemKind::Decor && i.key == decor_id);
        match stack {
            Some(stack) => stack.quantity += 1,
            None => {
                if self.inventory.free_slots() == 0 {
                    return false;
                }
                self.inventory.items.push(InventoryItem::decor(decor_id, 1));
            }
        }
        self.garden.clear(tile);
        true
    }

    fn state_value(&self) -> Value {
        adapter::write_garden(
            Some(
                self.state_extra
                    .clone()
                    .unwrap_or_else(|| json!({ "garden": {} })),
            ),
            &self.garden,
        )
    }
}

impl RemoteStore for MemoryRemote {
    async fn select(&self, label: &str) -> Option<Value> {
        let mut state = self.lock();
        state.reads += 1;
        state.flush_ready();
        match label {
            labels::STATE if state.garden_available => Some(state.state_value()),
            labels::INVENTORY => Some(adapter::inventory_to_value(&state.inventory)),
            labels::MAP => state.map.clone(),
            _ => None,
        }
    }

    async fn set(&self, label: &str, value: Value) -> anyhow::Result<()> {
        let mut state = self.lock();
        match label {
            labels::STATE => {
                state.flush_all();
                if let Some(garden) = adapter::garden_from_value(&value) {
                    state.garden = garden;
                }
                state.state_extra = Some(value);
                state.garden_available = true;
            }
            labels::INVENTORY => state.inventory = adapter::inventory_from_value(&value),
            labels::MAP => state.map = Some(value),
            _ => {}
        }
        Ok(())
    }

    async fn send_to_game(&self, command: GameCommand) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.fail_sends {
            anyhow::bail!("game connection is closed");
        }
        let wire = Envelope::new(command.clone()).to_wire()?;
        tracing::trace!(%wire, "memory remote received command");
        state.sent.push(command.clone());
        if state.lag == 0 {
            state.execute(command);
        } else {
            let ready_at = state.reads + state.lag;
            state.queue.push_back((ready_at, command));
        }
        Ok(())
    }
}
