use crate::adapter::GardenGeometry;
use crate::config::MAX_GLC_MUTATIONS;
use crate::model::{DecorObject, GardenState, TileMap, TileObject};
use crate::normalize::Normalizer;
use garden_layout_protocol::TileType;
use std::collections::BTreeSet;

/// Cleans a garden for use as a draft: eggs are dropped, boardwalk keeps
/// decor only, and desired mutations are canonicalized (one per group, at
/// most three). Ignored tile sets are already unique and sorted by
/// construction.
pub fn sanitize_garden(garden: &GardenState, norm: &Normalizer) -> GardenState {
    let clean = |tiles: &TileMap, plants: bool| -> TileMap {
        tiles
            .iter()
            .filter(|(_, obj)| !obj.is_egg())
            .filter(|(_, obj)| plants || !matches!(obj, TileObject::Plant(_)))
            .map(|(index, obj)| {
                let obj = match obj {
                    TileObject::Plant(plant) => {
                        let mut plant = plant.clone();
                        plant.glc_mutations =
                            norm.clean_glc_mutations(&plant.glc_mutations, MAX_GLC_MUTATIONS);
                        TileObject::Plant(plant)
                    }
                    other => other.clone(),
                };
                (*index, obj)
            })
            .collect()
    };
    GardenState {
        tile_objects: clean(&garden.tile_objects, true),
        boardwalk_tile_objects: clean(&garden.boardwalk_tile_objects, false),
        ignored_tiles: garden.ignored_tiles.clone(),
    }
}

fn mirror_rotation(rotation: i32) -> i32 {
    (360 - rotation.rem_euclid(360)) % 360
}

/// Mirrors a layout left-right, for one grid or both.
///
/// Eggs stay where they are since they cannot be moved, and a mirrored object
/// never replaces one. Ignored tiles are mirrored with the same table.
pub fn invert_layout(
    draft: &GardenState,
    tile_type: Option<TileType>,
    geometry: &GardenGeometry,
) -> GardenState {
    let mut out = draft.clone();
    let types: Vec<TileType> = match tile_type {
        Some(t) => vec![t],
        None => TileType::ALL.to_vec(),
    };
    for tile_type in types {
        let table = geometry.mirror_table(tile_type);
        let mirror = |index: u32| table.get(&index).copied().unwrap_or(index);

        let source = draft.tiles(tile_type);
        let mut mirrored: TileMap = source
            .iter()
            .filter(|(_, obj)| obj.is_egg())
            .map(|(index, obj)| (*index, obj.clone()))
            .collect();
        for (index, obj) in source.iter().filter(|(_, obj)| !obj.is_egg()) {
            let target = mirror(*index);
            if mirrored.contains_key(&target) {
                continue;
            }
            let obj = match obj {
                TileObject::Decor(d) => TileObject::Decor(DecorObject {
                    decor_id: d.decor_id.clone(),
                    rotation: mirror_rotation(d.rotation),
                }),
                other => other.clone(),
            };
            mirrored.insert(target, obj);
        }
        *out.tiles_mut(tile_type) = mirrored;

        let ignored: BTreeSet<u32> = draft
            .ignored_tiles
            .get(tile_type)
            .iter()
            .map(|i| mirror(*i))
            .collect();
        *out.ignored_tiles.get_mut(tile_type) = ignored;
    }
    out
}

/// Garden to write for a direct overwrite: the live garden with every
/// non-ignored draft tile stamped on top. Live eggs are never replaced.
pub fn merge_for_overwrite(live: &GardenState, draft: &GardenState) -> GardenState {
    let mut merged = live.clone();
    merged.ignored_tiles = Default::default();
    for (tile, obj) in draft.active_objects() {
        if obj.is_egg() || live.object(tile).is_some_and(TileObject::is_egg) {
            continue;
        }
        merged.set(tile, obj.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::geometry_from_value;
    use crate::model::{PlantObject, TileRef};

    fn sample() -> GardenState {
        let mut g = GardenState::default();
        let mut plant = PlantObject::desired("Carrot", &["golden", "rainbow", "wet", "amberlit", "Frozen"]);
        plant.planted_at = 17;
        plant.slots[0].target_scale = 1.5;
        g.tile_objects.insert(0, TileObject::Plant(plant));
        g.tile_objects.insert(1, TileObject::egg("MythicalEgg"));
        g.tile_objects.insert(2, TileObject::Decor(DecorObject { decor_id: "Bench".into(), rotation: 90 }));
        g.boardwalk_tile_objects.insert(4, TileObject::egg("CommonEgg"));
        g.ignored_tiles.dirt.extend([9, 3]);
        g
    }

    #[test]
    fn sanitize_strips_eggs_and_cleans_mutations() {
        let norm = Normalizer::new();
        let clean = sanitize_garden(&sample(), &norm);
        assert!(!clean.contains_eggs());
        let Some(TileObject::Plant(p)) = clean.tile_objects.get(&0) else {
            panic!("plant kept");
        };
        assert_eq!(p.glc_mutations, vec!["Gold", "Wet", "Ambershine"]);
        assert_eq!(clean.ignored_tiles.dirt.iter().copied().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn sanitize_keeps_only_decor_on_boardwalk() {
        let norm = Normalizer::new();
        let mut g = GardenState::default();
        g.boardwalk_tile_objects
            .insert(0, TileObject::Plant(PlantObject::desired("Carrot", &[])));
        g.boardwalk_tile_objects
            .insert(1, TileObject::Decor(DecorObject { decor_id: "Lantern".into(), rotation: 0 }));
        let clean = sanitize_garden(&g, &norm);
        assert_eq!(clean.boardwalk_tile_objects.len(), 1);
        assert!(clean.boardwalk_tile_objects.contains_key(&1));
    }

    #[test]
    fn sanitize_survives_a_json_round_trip() {
        let norm = Normalizer::new();
        let once = sanitize_garden(&sample(), &norm);
        let text = serde_json::to_string(&once).unwrap();
        let parsed: GardenState = serde_json::from_str(&text).unwrap();
        assert_eq!(sanitize_garden(&parsed, &norm), once);
    }

    #[test]
    fn invert_mirrors_objects_and_ignored_but_not_eggs() {
        let geo = geometry_from_value(Some(&serde_json::json!({
            "cols": 10, "dirtTiles": [0, 1, 2, 3], "boardwalkTiles": [10, 19]
        })));
        let mut g = GardenState::default();
        g.tile_objects.insert(0, TileObject::plant("Carrot", &[]));
        g.tile_objects.insert(1, TileObject::egg("CommonEgg"));
        g.tile_objects.insert(2, TileObject::Decor(DecorObject { decor_id: "Bench".into(), rotation: 90 }));
        g.boardwalk_tile_objects.insert(0, TileObject::decor("Lantern"));
        g.ignored_tiles.dirt.insert(3);

        let dirt_only = invert_layout(&g, Some(TileType::Dirt), &geo);
        assert_eq!(dirt_only.tile_objects.get(&3), Some(&TileObject::plant("Carrot", &[])));
        assert_eq!(dirt_only.tile_objects.get(&1), Some(&TileObject::egg("CommonEgg")));
        // Bench on x=2 mirrors onto x=1, where the egg stays.
        assert_eq!(dirt_only.tile_objects.len(), 2);
        assert_eq!(dirt_only.ignored_tiles.dirt.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(dirt_only.boardwalk_tile_objects, g.boardwalk_tile_objects);

        let both = invert_layout(&g, None, &geo);
        assert_eq!(both.boardwalk_tile_objects.get(&1), Some(&TileObject::decor("Lantern")));
        let twice = invert_layout(&both, None, &geo);
        assert_eq!(twice.boardwalk_tile_objects, g.boardwalk_tile_objects);
    }

    #[test]
    fn invert_flips_decor_rotation() {
        assert_eq!(mirror_rotation(90), 270);
        assert_eq!(mirror_rotation(0), 0);
        assert_eq!(mirror_rotation(180), 180);
        assert_eq!(mirror_rotation(-90), 90);
    }

    #[test]
    fn overwrite_keeps_live_eggs_and_untouched_tiles() {
        let mut live = GardenState::default();
        live.tile_objects.insert(0, TileObject::egg("CommonEgg"));
        live.tile_objects.insert(5, TileObject::decor("Bench"));
        let mut draft = GardenState::default();
        draft.tile_objects.insert(0, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(1, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(2, TileObject::decor("Lantern"));
        draft.ignored_tiles.dirt.insert(2);

        let merged = merge_for_overwrite(&live, &draft);
        assert!(merged.object(TileRef::dirt(0)).is_some_and(TileObject::is_egg));
        assert_eq!(merged.object(TileRef::dirt(1)), Some(&TileObject::plant("Carrot", &[])));
        assert_eq!(merged.object(TileRef::dirt(2)), None);
        assert_eq!(merged.object(TileRef::dirt(5)), Some(&TileObject::decor("Bench")));
    }
}
