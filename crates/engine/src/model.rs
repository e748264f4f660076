use garden_layout_protocol::TileType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Local tile index -> object on that tile. Empty tiles are absent.
pub type TileMap = BTreeMap<u32, TileObject>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantSlot {
    pub species: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default = "default_scale")]
    pub target_scale: f64,
    #[serde(default)]
    pub mutations: Vec<String>,
}

fn default_scale() -> f64 {
    1.0
}

impl PlantSlot {
    pub fn new(species: impl Into<String>, mutations: Vec<String>) -> Self {
        Self {
            species: species.into(),
            start_time: 0,
            end_time: 0,
            target_scale: 1.0,
            mutations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantObject {
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_key: Option<String>,
    #[serde(default)]
    pub planted_at: i64,
    #[serde(default)]
    pub matured_at: i64,
    #[serde(default)]
    pub slots: Vec<PlantSlot>,
    /// Mutations the layout author wants on this tile. Authoring metadata only;
    /// live plants carry their mutations in `slots`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glc_mutations: Vec<String>,
}

impl PlantObject {
    /// Draft plant with a single slot and the given desired mutations.
    pub fn desired(species: impl Into<String>, mutations: &[&str]) -> Self {
        let species = species.into();
        Self {
            slots: vec![PlantSlot::new(species.clone(), Vec::new())],
            species,
            seed_key: None,
            planted_at: 0,
            matured_at: 0,
            glc_mutations: mutations.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Live plant whose single slot carries `mutations`.
    pub fn grown(species: impl Into<String>, mutations: &[&str]) -> Self {
        let species = species.into();
        Self {
            slots: vec![PlantSlot::new(
                species.clone(),
                mutations.iter().map(|m| m.to_string()).collect(),
            )],
            species,
            seed_key: None,
            planted_at: 0,
            matured_at: 0,
            glc_mutations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorObject {
    pub decor_id: String,
    #[serde(default)]
    pub rotation: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EggObject {
    pub egg_id: String,
    #[serde(default)]
    pub planted_at: i64,
    #[serde(default)]
    pub matured_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "objectType", rename_all = "lowercase")]
pub enum TileObject {
    Plant(PlantObject),
    Decor(DecorObject),
    Egg(EggObject),
}

impl TileObject {
    pub fn plant(species: impl Into<String>, mutations: &[&str]) -> Self {
        Self::Plant(PlantObject::desired(species, mutations))
    }

    pub fn decor(decor_id: impl Into<String>) -> Self {
        Self::Decor(DecorObject {
            decor_id: decor_id.into(),
            rotation: 0,
        })
    }

    pub fn egg(egg_id: impl Into<String>) -> Self {
        Self::Egg(EggObject {
            egg_id: egg_id.into(),
            planted_at: 0,
            matured_at: 0,
        })
    }

    pub fn is_egg(&self) -> bool {
        matches!(self, Self::Egg(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredTiles {
    #[serde(default)]
    pub dirt: BTreeSet<u32>,
    #[serde(default)]
    pub boardwalk: BTreeSet<u32>,
}

impl IgnoredTiles {
    pub fn get(&self, tile_type: TileType) -> &BTreeSet<u32> {
        match tile_type {
            TileType::Dirt => &self.dirt,
            TileType::Boardwalk => &self.boardwalk,
        }
    }

    pub fn get_mut(&mut self, tile_type: TileType) -> &mut BTreeSet<u32> {
        match tile_type {
            TileType::Dirt => &mut self.dirt,
            TileType::Boardwalk => &mut self.boardwalk,
        }
    }

    pub fn contains(&self, tile: TileRef) -> bool {
        self.get(tile.tile_type).contains(&tile.index)
    }

    pub fn insert(&mut self, tile: TileRef) {
        self.get_mut(tile.tile_type).insert(tile.index);
    }
}

/// A tile on one of the two grids of a garden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRef {
    pub tile_type: TileType,
    pub index: u32,
}

impl TileRef {
    pub fn dirt(index: u32) -> Self {
        Self {
            tile_type: TileType::Dirt,
            index,
        }
    }

    pub fn boardwalk(index: u32) -> Self {
        Self {
            tile_type: TileType::Boardwalk,
            index,
        }
    }
}

impl std::fmt::Display for TileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.tile_type, self.index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenState {
    #[serde(default)]
    pub tile_objects: TileMap,
    #[serde(default)]
    pub boardwalk_tile_objects: TileMap,
    #[serde(default)]
    pub ignored_tiles: IgnoredTiles,
}

impl GardenState {
    pub fn tiles(&self, tile_type: TileType) -> &TileMap {
        match tile_type {
            TileType::Dirt => &self.tile_objects,
            TileType::Boardwalk => &self.boardwalk_tile_objects,
        }
    }

    pub fn tiles_mut(&mut self, tile_type: TileType) -> &mut TileMap {
        match tile_type {
            TileType::Dirt => &mut self.tile_objects,
            TileType::Boardwalk => &mut self.boardwalk_tile_objects,
        }
    }

    pub fn object(&self, tile: TileRef) -> Option<&TileObject> {
        self.tiles(tile.tile_type).get(&tile.index)
    }

    pub fn set(&mut self, tile: TileRef, object: TileObject) {
        self.tiles_mut(tile.tile_type).insert(tile.index, object);
    }

    pub fn clear(&mut self, tile: TileRef) -> Option<TileObject> {
        self.tiles_mut(tile.tile_type).remove(&tile.index)
    }

    pub fn is_ignored(&self, tile: TileRef) -> bool {
        self.ignored_tiles.contains(tile)
    }

    /// Occupied tiles of both grids that are not ignored, dirt first.
    pub fn active_objects(&self) -> impl Iterator<Item = (TileRef, &TileObject)> + '_ {
        TileType::ALL.into_iter().flat_map(move |tile_type| {
            self.tiles(tile_type)
                .iter()
                .map(move |(index, obj)| (TileRef { tile_type, index: *index }, obj))
                .filter(move |(tile, _)| !self.is_ignored(*tile))
        })
    }

    pub fn contains_eggs(&self) -> bool {
        self.tile_objects.values().any(TileObject::is_egg)
            || self.boardwalk_tile_objects.values().any(TileObject::is_egg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLayout {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub garden: GardenState,
}
