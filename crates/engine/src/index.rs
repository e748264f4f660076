//! Read-side scans over inventory and garden snapshots.
//!
//! None of these mutate their input. Garden scans skip every tile listed in
//! the layout's `ignored` set, whatever is on it.

use crate::adapter::{InventorySnapshot, ItemKind};
use crate::model::{GardenState, IgnoredTiles, TileObject, TileRef};
use crate::normalize::{mutation_key, MutationSet, Normalizer};
use garden_layout_protocol::TileType;
use std::collections::BTreeMap;

/// Plant item ids grouped by canonical species.
pub fn read_plant_inventory_by_species(
    inv: &InventorySnapshot,
    norm: &Normalizer,
) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in inv.plants() {
        out.entry(norm.species(&item.key))
            .or_default()
            .push(item.id.clone());
    }
    out
}

/// Plant item ids grouped by species, then by mutation key.
pub fn read_plant_inventory_with_mutations(
    inv: &InventorySnapshot,
    norm: &Normalizer,
) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let mut out: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for item in inv.plants() {
        let species = norm.species(&item.key);
        let key = mutation_key(&species, &norm.mutation_set(&item.mutations));
        out.entry(species)
            .or_default()
            .entry(key)
            .or_default()
            .push(item.id.clone());
    }
    out
}

/// Decor stack sizes by decor id.
pub fn read_decor_inventory(inv: &InventorySnapshot) -> BTreeMap<String, u32> {
    let mut out = BTreeMap::new();
    for item in inv.items.iter().filter(|i| i.kind == ItemKind::Decor) {
        *out.entry(item.key.clone()).or_insert(0) += item.quantity;
    }
    out
}

/// A live plant on a dirt tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GardenPlant {
    pub tile: TileRef,
    pub species: String,
    pub mutations: MutationSet,
}

impl GardenPlant {
    pub fn key(&self) -> String {
        mutation_key(&self.species, &self.mutations)
    }
}

/// All non-ignored live plants, in tile order.
pub fn garden_plants(garden: &GardenState, ignored: &IgnoredTiles, norm: &Normalizer) -> Vec<GardenPlant> {
    garden
        .tiles(TileType::Dirt)
        .iter()
        .map(|(index, obj)| (TileRef::dirt(*index), obj))
        .filter(|(tile, _)| !ignored.contains(*tile))
        .filter_map(|(tile, obj)| match obj {
            TileObject::Plant(plant) => Some(GardenPlant {
                tile,
                species: norm.species(&plant.species),
                mutations: norm.plant_mutations(plant),
            }),
            _ => None,
        })
        .collect()
}

pub fn count_garden_plants(
    garden: &GardenState,
    ignored: &IgnoredTiles,
    norm: &Normalizer,
) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for plant in garden_plants(garden, ignored, norm) {
        *out.entry(plant.species).or_insert(0) += 1;
    }
    out
}

/// Counts keyed by `species::mutations`.
pub fn count_garden_plants_by_mutation(
    garden: &GardenState,
    ignored: &IgnoredTiles,
    norm: &Normalizer,
) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for plant in garden_plants(garden, ignored, norm) {
        *out.entry(plant.key()).or_insert(0) += 1;
    }
    out
}

fn decor_tiles<'a>(
    garden: &'a GardenState,
    ignored: &'a IgnoredTiles,
) -> impl Iterator<Item = (TileRef, &'a str)> + 'a {
    TileType::ALL.into_iter().flat_map(move |tile_type| {
        garden
            .tiles(tile_type)
            .iter()
            .filter_map(move |(index, obj)| match obj {
                TileObject::Decor(d) => Some((TileRef { tile_type, index: *index }, d.decor_id.as_str())),
                _ => None,
            })
            .filter(move |(tile, _)| !ignored.contains(*tile))
    })
}

/// Decors on both grids by decor id.
pub fn count_garden_decors(garden: &GardenState, ignored: &IgnoredTiles) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for (_, decor_id) in decor_tiles(garden, ignored) {
        *out.entry(decor_id.to_string()).or_insert(0) += 1;
    }
    out
}

/// Dirt tile indices holding each species.
pub fn collect_garden_plant_slots(
    garden: &GardenState,
    ignored: &IgnoredTiles,
    norm: &Normalizer,
) -> BTreeMap<String, Vec<u32>> {
    let mut out: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for plant in garden_plants(garden, ignored, norm) {
        out.entry(plant.species).or_default().push(plant.tile.index);
    }
    out
}

/// Tiles holding each decor id, dirt before boardwalk.
pub fn collect_garden_decor_slots(
    garden: &GardenState,
    ignored: &IgnoredTiles,
) -> BTreeMap<String, Vec<TileRef>> {
    let mut out: BTreeMap<String, Vec<TileRef>> = BTreeMap::new();
    for (tile, decor_id) in decor_tiles(garden, ignored) {
        out.entry(decor_id.to_string()).or_default().push(tile);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InventoryItem;
    use crate::model::PlantObject;

    fn live() -> GardenState {
        let mut g = GardenState::default();
        g.tile_objects.insert(0, TileObject::Plant(PlantObject::grown("Carrot", &["Gold"])));
        g.tile_objects.insert(1, TileObject::Plant(PlantObject::grown("carrot plant", &[])));
        g.tile_objects.insert(2, TileObject::Plant(PlantObject::grown("Carrot", &["golden"])));
        g.tile_objects.insert(3, TileObject::decor("Bench"));
        g.tile_objects.insert(4, TileObject::egg("CommonEgg"));
        g.boardwalk_tile_objects.insert(0, TileObject::decor("Bench"));
        g.boardwalk_tile_objects.insert(1, TileObject::decor("Lantern"));
        g
    }

    #[test]
    fn garden_counters_normalize_and_skip_ignored() {
        let norm = Normalizer::new();
        let mut ignored = IgnoredTiles::default();
        ignored.dirt.insert(1);
        ignored.boardwalk.insert(1);

        let g = live();
        assert_eq!(count_garden_plants(&g, &ignored, &norm).get("Carrot"), Some(&2));
        let by_mut = count_garden_plants_by_mutation(&g, &ignored, &norm);
        assert_eq!(by_mut.get("Carrot::Gold"), Some(&2));
        assert_eq!(by_mut.get("Carrot::"), None);

        let decors = count_garden_decors(&g, &ignored);
        assert_eq!(decors.get("Bench"), Some(&2));
        assert_eq!(decors.get("Lantern"), None);

        assert_eq!(collect_garden_plant_slots(&g, &ignored, &norm)["Carrot"], vec![0, 2]);
        assert_eq!(
            collect_garden_decor_slots(&g, &ignored)["Bench"],
            vec![TileRef::dirt(3), TileRef::boardwalk(0)]
        );
    }

    #[test]
    fn inventory_readers_group_by_species_and_mutations() {
        let norm = Normalizer::new();
        let inv = InventorySnapshot::new(vec![
            InventoryItem::plant("a", "Carrot Seed", &[]),
            InventoryItem::plant("b", "Carrot", &["wet", "gold"]),
            InventoryItem::plant("c", "Carrot", &["Gold", "Wet"]),
            InventoryItem::decor("Bench", 2),
            InventoryItem::decor("Bench", 1),
        ]);
        assert_eq!(read_plant_inventory_by_species(&inv, &norm)["Carrot"], vec!["a", "b", "c"]);
        let with_muts = read_plant_inventory_with_mutations(&inv, &norm);
        assert_eq!(with_muts["Carrot"]["Carrot::Gold+Wet"], vec!["b", "c"]);
        assert_eq!(with_muts["Carrot"]["Carrot::"], vec!["a"]);
        assert_eq!(read_decor_inventory(&inv)["Bench"], 3);
    }
}
