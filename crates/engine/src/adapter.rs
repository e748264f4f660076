//! Edge adapter between raw store snapshots and the strict model types.
//!
//! The page store hands out loosely shaped JSON whose field names have
//! drifted between game releases. Everything past this module only sees
//! `GardenState`, `InventorySnapshot` and `GardenGeometry`.

use crate::catalog::{DEFAULT_INVENTORY_CAPACITY, PLANTER_POT_TOOL_ID};
use crate::model::{
    DecorObject, EggObject, GardenState, IgnoredTiles, PlantObject, PlantSlot, TileMap, TileObject,
};
use garden_layout_protocol::TileType;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

fn str_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|n| obj.get(*n).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

fn int_field(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|n| {
        let v = obj.get(*n)?;
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
    })
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A tile index must be a finite, non-negative integer.
fn tile_index(v: &Value) -> Option<u32> {
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).ok();
    }
    if let Some(f) = v.as_f64() {
        if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
            return Some(f as u32);
        }
        return None;
    }
    v.as_str().and_then(|s| s.trim().parse::<u32>().ok())
}

fn slots_from_value(v: Option<&Value>, species: &str) -> Vec<PlantSlot> {
    let Some(arr) = v.and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(Value::as_object)
        .map(|slot| PlantSlot {
            species: str_field(slot, &["species"]).unwrap_or(species).to_string(),
            start_time: int_field(slot, &["startTime"]).unwrap_or(0),
            end_time: int_field(slot, &["endTime"]).unwrap_or(0),
            target_scale: slot
                .get("targetScale")
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            mutations: string_list(slot.get("mutations")),
        })
        .collect()
}

pub fn tile_object_from_value(v: &Value) -> Option<TileObject> {
    let obj = v.as_object()?;
    let kind = str_field(obj, &["objectType", "type"])?.to_ascii_lowercase();
    match kind.as_str() {
        "plant" => {
            let species = str_field(obj, &["species", "plantSpecies", "seedKey"])?.to_string();
            let mut slots = slots_from_value(obj.get("slots"), &species);
            if slots.is_empty() {
                // Older snapshots keep mutations on the object itself.
                let mutations = string_list(obj.get("mutations"));
                slots.push(PlantSlot::new(species.clone(), mutations));
            }
            Some(TileObject::Plant(PlantObject {
                seed_key: str_field(obj, &["seedKey"]).map(str::to_string),
                planted_at: int_field(obj, &["plantedAt"]).unwrap_or(0),
                matured_at: int_field(obj, &["maturedAt"]).unwrap_or(0),
                slots,
                glc_mutations: string_list(obj.get("glcMutations")),
                species,
            }))
        }
        "decor" => Some(TileObject::Decor(DecorObject {
            decor_id: str_field(obj, &["decorId", "id"])?.to_string(),
            rotation: int_field(obj, &["rotation"])
                .and_then(|r| i32::try_from(r).ok())
                .unwrap_or(0),
        })),
        "egg" => Some(TileObject::Egg(EggObject {
            egg_id: str_field(obj, &["eggId", "id"])?.to_string(),
            planted_at: int_field(obj, &["plantedAt"]).unwrap_or(0),
            matured_at: int_field(obj, &["maturedAt"]).unwrap_or(0),
        })),
        _ => None,
    }
}

pub fn tile_map_from_value(v: Option<&Value>) -> TileMap {
    let mut out = TileMap::new();
    match v {
        Some(Value::Object(map)) => {
            for (key, obj) in map {
                let Some(index) = key.trim().parse::<u32>().ok() else {
                    continue;
                };
                if let Some(obj) = tile_object_from_value(obj) {
                    out.insert(index, obj);
                }
            }
        }
        // Dense arrays show up in some snapshots; holes are `null` or `{}`.
        Some(Value::Array(arr)) => {
            for (index, obj) in arr.iter().enumerate() {
                let Ok(index) = u32::try_from(index) else {
                    break;
                };
                if let Some(obj) = tile_object_from_value(obj) {
                    out.insert(index, obj);
                }
            }
        }
        _ => {}
    }
    out
}

fn index_set(v: Option<&Value>) -> BTreeSet<u32> {
    v.and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(tile_index).collect())
        .unwrap_or_default()
}

pub fn ignored_from_value(v: Option<&Value>) -> IgnoredTiles {
    let Some(obj) = v.and_then(Value::as_object) else {
        return IgnoredTiles::default();
    };
    IgnoredTiles {
        dirt: index_set(obj.get("dirt")),
        boardwalk: index_set(obj.get("boardwalk")),
    }
}

/// Where the garden lives inside a raw state snapshot.
fn garden_path(v: &Value) -> Option<Vec<&'static str>> {
    let obj = v.as_object()?;
    if obj.contains_key("tileObjects") || obj.contains_key("boardwalkTileObjects") {
        return Some(Vec::new());
    }
    if obj.get("garden").is_some_and(Value::is_object) {
        return Some(vec!["garden"]);
    }
    let nested = v.pointer("/child/data/garden");
    if nested.is_some_and(Value::is_object) {
        return Some(vec!["child", "data", "garden"]);
    }
    None
}

fn value_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(v, |cur, key| cur.get(*key))
}

/// Parses a garden from a raw snapshot, or from a bare `GardenState`-shaped
/// object (editor drafts, import files).
pub fn garden_from_value(v: &Value) -> Option<GardenState> {
    let path = garden_path(v)?;
    let garden = value_at(v, &path)?;
    Some(GardenState {
        tile_objects: tile_map_from_value(garden.get("tileObjects")),
        boardwalk_tile_objects: tile_map_from_value(garden.get("boardwalkTileObjects")),
        ignored_tiles: ignored_from_value(garden.get("ignoredTiles")),
    })
}

pub fn garden_to_value(garden: &GardenState) -> Value {
    serde_json::to_value(garden).unwrap_or_else(|_| json!({}))
}

/// Replaces the garden inside `raw_state`, keeping the rest of the snapshot.
/// Without a recognizable snapshot the garden is written under `garden`.
pub fn write_garden(raw_state: Option<Value>, garden: &GardenState) -> Value {
    let mut body = garden_to_value(garden);
    if let Some(obj) = body.as_object_mut() {
        obj.remove("ignoredTiles");
    }
    let Some(mut state) = raw_state else {
        return json!({ "garden": body });
    };
    match garden_path(&state) {
        Some(path) if path.is_empty() => body,
        Some(path) => {
            let mut cur = &mut state;
            for key in &path {
                cur = match cur.get_mut(*key) {
                    Some(next) => next,
                    None => return json!({ "garden": body }),
                };
            }
            *cur = body;
            state
        }
        None => {
            if let Some(obj) = state.as_object_mut() {
                obj.insert("garden".to_string(), body);
                state
            } else {
                json!({ "garden": body })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Plant,
    Seed,
    Decor,
    Tool,
    Egg,
    Produce,
    Other,
}

impl ItemKind {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "plant" => Self::Plant,
            "seed" => Self::Seed,
            "decor" => Self::Decor,
            "tool" => Self::Tool,
            "egg" => Self::Egg,
            "produce" | "crop" => Self::Produce,
            _ => Self::Other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Plant => "Plant",
            Self::Seed => "Seed",
            Self::Decor => "Decor",
            Self::Tool => "Tool",
            Self::Egg => "Egg",
            Self::Produce => "Produce",
            Self::Other => "Other",
        }
    }
}

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub kind: ItemKind,
    /// Species for plants and seeds, decor id, tool id, or egg id.
    pub key: String,
    pub quantity: u32,
    pub mutations: Vec<String>,
    /// Growth slots of a potted plant; replanting restores them.
    #[serde(default)]
    pub slots: Vec<PlantSlot>,
}

impl InventoryItem {
    pub fn plant(id: impl Into<String>, species: impl Into<String>, mutations: &[&str]) -> Self {
        let species = species.into();
        let mutations: Vec<String> = mutations.iter().map(|m| m.to_string()).collect();
        Self {
            id: id.into(),
            kind: ItemKind::Plant,
            slots: vec![PlantSlot::new(species.clone(), mutations.clone())],
            key: species,
            quantity: 1,
            mutations,
        }
    }

    pub fn decor(decor_id: impl Into<String>, quantity: u32) -> Self {
        let decor_id = decor_id.into();
        Self {
            id: format!("decor:{decor_id}"),
            kind: ItemKind::Decor,
            key: decor_id,
            quantity,
            mutations: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn tool(tool_id: impl Into<String>, quantity: u32) -> Self {
        let tool_id = tool_id.into();
        Self {
            id: format!("tool:{tool_id}"),
            kind: ItemKind::Tool,
            key: tool_id,
            quantity,
            mutations: Vec::new(),
            slots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub items: Vec<InventoryItem>,
    pub capacity: usize,
}

impl Default for InventorySnapshot {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            capacity: DEFAULT_INVENTORY_CAPACITY,
        }
    }
}

impl InventorySnapshot {
    pub fn new(items: Vec<InventoryItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    pub fn plants(&self) -> impl Iterator<Item = &InventoryItem> + '_ {
        self.items.iter().filter(|i| i.kind == ItemKind::Plant)
    }

    pub fn planter_pot_charges(&self) -> u32 {
        self.items
            .iter()
            .filter(|i| i.kind == ItemKind::Tool && i.key == PLANTER_POT_TOOL_ID)
            .map(|i| i.quantity)
            .sum()
    }
}

fn inventory_item_from_value(v: &Value, position: usize) -> Option<InventoryItem> {
    let obj = v.as_object()?;
    let kind = ItemKind::parse(str_field(obj, &["itemType", "type", "objectType"])?);
    let key = match kind {
        ItemKind::Plant | ItemKind::Seed | ItemKind::Produce => {
            str_field(obj, &["species", "plantSpecies", "seedKey", "name"])
        }
        ItemKind::Decor => str_field(obj, &["decorId", "name"]),
        ItemKind::Tool => str_field(obj, &["toolId", "name"]),
        ItemKind::Egg => str_field(obj, &["eggId", "name"]),
        ItemKind::Other => str_field(obj, &["name", "id"]),
    }?
    .to_string();
    let slots = slots_from_value(obj.get("slots"), &key);
    let mut mutations = string_list(obj.get("mutations"));
    if mutations.is_empty() {
        let mut seen = BTreeSet::new();
        for m in slots.iter().flat_map(|s| s.mutations.iter()) {
            if seen.insert(m.clone()) {
                mutations.push(m.clone());
            }
        }
    }
    let id = str_field(obj, &["id", "itemId"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{key}:{position}", kind.as_str().to_ascii_lowercase()));
    Some(InventoryItem {
        id,
        kind,
        key,
        quantity: int_field(obj, &["quantity", "count"])
            .and_then(|q| u32::try_from(q).ok())
            .unwrap_or(1),
        mutations,
        slots,
    })
}

pub fn inventory_from_value(v: &Value) -> InventorySnapshot {
    let (items, capacity) = match v {
        Value::Array(arr) => (Some(arr), None),
        Value::Object(obj) => (
            obj.get("items").and_then(Value::as_array),
            int_field(obj, &["capacity", "maxItems"]),
        ),
        _ => (None, None),
    };
    InventorySnapshot {
        items: items
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .filter_map(|(i, item)| inventory_item_from_value(item, i))
                    .collect()
            })
            .unwrap_or_default(),
        capacity: capacity
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(DEFAULT_INVENTORY_CAPACITY),
    }
}

/// Raw snapshot shape the page store uses for inventories.
pub fn inventory_to_value(inv: &InventorySnapshot) -> Value {
    let items: Vec<Value> = inv
        .items
        .iter()
        .map(|item| {
            let key_field = match item.kind {
                ItemKind::Decor => "decorId",
                ItemKind::Tool => "toolId",
                ItemKind::Egg => "eggId",
                ItemKind::Other => "name",
                _ => "species",
            };
            let mut obj = Map::new();
            obj.insert("id".to_string(), json!(item.id));
            obj.insert("itemType".to_string(), json!(item.kind.as_str()));
            obj.insert(key_field.to_string(), json!(item.key));
            obj.insert("quantity".to_string(), json!(item.quantity));
            if item.kind == ItemKind::Plant {
                obj.insert(
                    "slots".to_string(),
                    serde_json::to_value(&item.slots).unwrap_or_else(|_| json!([])),
                );
            }
            if !item.mutations.is_empty() {
                obj.insert("mutations".to_string(), json!(item.mutations));
            }
            Value::Object(obj)
        })
        .collect();
    json!({ "items": items, "capacity": inv.capacity })
}

/// Grid coordinates of every local tile index, per tile type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GardenGeometry {
    pub dirt: Vec<(i32, i32)>,
    pub boardwalk: Vec<(i32, i32)>,
}

pub const DEFAULT_DIRT_COLUMNS: i32 = 20;
pub const DEFAULT_DIRT_ROWS: i32 = 10;

impl GardenGeometry {
    /// Plain row-major dirt grid; used when no map snapshot is available.
    pub fn fallback() -> Self {
        let dirt = (0..DEFAULT_DIRT_ROWS)
            .flat_map(|y| (0..DEFAULT_DIRT_COLUMNS).map(move |x| (x, y)))
            .collect();
        Self {
            dirt,
            boardwalk: Vec::new(),
        }
    }

    pub fn coords(&self, tile_type: TileType) -> &[(i32, i32)] {
        match tile_type {
            TileType::Dirt => &self.dirt,
            TileType::Boardwalk => &self.boardwalk,
        }
    }

    /// Left-right mirror of `index` across the x-bounds of its grid. Tiles
    /// without a partner at the mirrored coordinate map to themselves.
    pub fn mirror_index(&self, tile_type: TileType, index: u32) -> u32 {
        self.mirror_table(tile_type)
            .get(&index)
            .copied()
            .unwrap_or(index)
    }

    pub fn mirror_table(&self, tile_type: TileType) -> HashMap<u32, u32> {
        let coords = self.coords(tile_type);
        let (Some(min_x), Some(max_x)) = (
            coords.iter().map(|c| c.0).min(),
            coords.iter().map(|c| c.0).max(),
        ) else {
            return HashMap::new();
        };
        let by_coord: HashMap<(i32, i32), u32> = coords
            .iter()
            .enumerate()
            .filter_map(|(i, c)| u32::try_from(i).ok().map(|i| (*c, i)))
            .collect();
        by_coord
            .iter()
            .filter_map(|((x, y), index)| {
                by_coord
                    .get(&(min_x + max_x - x, *y))
                    .map(|mirrored| (*index, *mirrored))
            })
            .collect()
    }
}

pub fn geometry_from_value(v: Option<&Value>) -> GardenGeometry {
    let Some(obj) = v.and_then(Value::as_object) else {
        return GardenGeometry::fallback();
    };
    let Some(cols) = int_field(obj, &["cols", "columns", "width"]).filter(|c| *c > 0) else {
        return GardenGeometry::fallback();
    };
    let project = |name: &str| -> Vec<(i32, i32)> {
        obj.get(name)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(tile_index)
                    .map(|g| {
                        let g = i64::from(g);
                        ((g % cols) as i32, (g / cols) as i32)
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let dirt = project("dirtTiles");
    if dirt.is_empty() {
        return GardenGeometry::fallback();
    }
    GardenGeometry {
        dirt,
        boardwalk: project("boardwalkTiles"),
    }
}
