//! What a draft needs versus what the player has.
//!
//! Plant availability is a linked allocation: one physical plant, in the
//! inventory or still in the garden, can satisfy only one demand. The
//! allocation is greedy and deterministic. It is not a maximum matching, and
//! the availability counts shown to the player depend on it staying exactly
//! this greedy.

use crate::adapter::InventorySnapshot;
use crate::index::{self, GardenPlant};
use crate::model::{GardenState, TileObject, TileRef};
use crate::normalize::{MutationSet, Normalizer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementKind {
    Plant,
    Decor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementEntry {
    pub kind: RequirementKind,
    /// Canonical species or decor id.
    pub key: String,
    pub mutations: Vec<String>,
    pub needed: usize,
    pub have: usize,
}

impl RequirementEntry {
    pub fn missing(&self) -> usize {
        self.needed.saturating_sub(self.have)
    }

    pub fn label(&self) -> String {
        if self.mutations.is_empty() {
            self.key.clone()
        } else {
            format!("{} ({})", self.key, self.mutations.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSource {
    Inventory(String),
    Garden(TileRef),
}

/// One physical plant that could fill a demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantInstance {
    pub source: InstanceSource,
    pub mutations: MutationSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationDemand {
    pub mutations: MutationSet,
    pub needed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandAllocation {
    pub mutations: MutationSet,
    pub needed: usize,
    /// Indices into the instance list, in claim order.
    pub claimed: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAllocation {
    /// Mutation-specific demands in the order they were served.
    pub groups: Vec<DemandAllocation>,
    /// Instances left for the plain (no-mutation) demand.
    pub remaining: Vec<usize>,
}

/// Serves mutation-specific demands most-specific first (set size desc, then
/// needed desc). Each demand takes superset instances with the fewest
/// mutations first, so heavily mutated plants stay available for stricter
/// demands. Demands with an empty set are not served here; whatever is left
/// in the pool is their availability.
pub fn allocate_linked(instances: &[PlantInstance], demands: &[MutationDemand]) -> LinkedAllocation {
    let mut order: Vec<&MutationDemand> = demands.iter().filter(|d| !d.mutations.is_empty()).collect();
    order.sort_by(|a, b| {
        b.mutations
            .len()
            .cmp(&a.mutations.len())
            .then(b.needed.cmp(&a.needed))
    });

    let mut pool: Vec<usize> = (0..instances.len()).collect();
    let mut groups = Vec::with_capacity(order.len());
    for demand in order {
        let mut candidates: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|i| demand.mutations.is_subset(&instances[*i].mutations))
            .collect();
        candidates.sort_by_key(|i| instances[*i].mutations.len());
        candidates.truncate(demand.needed);
        pool.retain(|i| !candidates.contains(i));
        groups.push(DemandAllocation {
            mutations: demand.mutations.clone(),
            needed: demand.needed,
            claimed: candidates,
        });
    }
    LinkedAllocation {
        groups,
        remaining: pool,
    }
}

/// Desired plant tiles grouped species -> mutation set -> count.
fn plant_demands(draft: &GardenState, norm: &Normalizer) -> BTreeMap<String, BTreeMap<MutationSet, usize>> {
    let mut out: BTreeMap<String, BTreeMap<MutationSet, usize>> = BTreeMap::new();
    for (_, obj) in draft.active_objects() {
        if let TileObject::Plant(plant) = obj {
            *out.entry(norm.species(&plant.species))
                .or_default()
                .entry(norm.desired_mutations(plant))
                .or_insert(0) += 1;
        }
    }
    out
}

fn decor_demands(draft: &GardenState) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for (_, obj) in draft.active_objects() {
        if let TileObject::Decor(d) = obj {
            *out.entry(d.decor_id.clone()).or_insert(0) += 1;
        }
    }
    out
}

/// Inventory plants followed by live garden plants of `species`.
pub fn plant_instances(
    species: &str,
    inv: &InventorySnapshot,
    live_plants: &[GardenPlant],
    norm: &Normalizer,
) -> Vec<PlantInstance> {
    let from_inventory = inv
        .plants()
        .filter(|item| norm.species(&item.key) == species)
        .map(|item| PlantInstance {
            source: InstanceSource::Inventory(item.id.clone()),
            mutations: norm.mutation_set(&item.mutations),
        });
    let from_garden = live_plants
        .iter()
        .filter(|p| p.species == species)
        .map(|p| PlantInstance {
            source: InstanceSource::Garden(p.tile),
            mutations: p.mutations.clone(),
        });
    from_inventory.chain(from_garden).collect()
}

/// Needed vs have for every plant and decor the draft asks for.
pub fn requirement_summary(
    draft: &GardenState,
    live: &GardenState,
    inv: &InventorySnapshot,
    norm: &Normalizer,
) -> Vec<RequirementEntry> {
    let ignored = &draft.ignored_tiles;
    let live_plants = index::garden_plants(live, ignored, norm);
    let mut out = Vec::new();

    for (species, groups) in plant_demands(draft, norm) {
        let instances = plant_instances(&species, inv, &live_plants, norm);
        let demands: Vec<MutationDemand> = groups
            .iter()
            .map(|(mutations, needed)| MutationDemand {
                mutations: mutations.clone(),
                needed: *needed,
            })
            .collect();
        let allocation = allocate_linked(&instances, &demands);
        for (mutations, needed) in groups {
            let have = if mutations.is_empty() {
                allocation.remaining.len()
            } else {
                allocation
                    .groups
                    .iter()
                    .find(|g| g.mutations == mutations)
                    .map(|g| g.claimed.len())
                    .unwrap_or(0)
            };
            out.push(RequirementEntry {
                kind: RequirementKind::Plant,
                key: species.clone(),
                mutations: mutations.into_iter().collect(),
                needed,
                have,
            });
        }
    }

    let inv_decor = index::read_decor_inventory(inv);
    let garden_decor = index::count_garden_decors(live, ignored);
    for (decor_id, needed) in decor_demands(draft) {
        let have = inv_decor.get(&decor_id).copied().unwrap_or(0) as usize
            + garden_decor.get(&decor_id).copied().unwrap_or(0);
        out.push(RequirementEntry {
            kind: RequirementKind::Decor,
            key: decor_id,
            mutations: Vec::new(),
            needed,
            have,
        });
    }
    out
}

/// Entries the player is short on.
pub fn missing_items(summary: &[RequirementEntry]) -> Vec<RequirementEntry> {
    summary.iter().filter(|e| e.missing() > 0).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanterPotRequirement {
    pub needed: usize,
    pub owned: u32,
}

impl PlanterPotRequirement {
    pub fn shortfall(&self) -> usize {
        self.needed.saturating_sub(self.owned as usize)
    }
}

/// Planter pot charges needed to apply `draft` over `live`.
///
/// Every draft tile holding a plant that does not already satisfy it costs
/// one pot to clear. Unsatisfied plant demands are then served from free
/// supply (inventory plants and the plants being cleared), and only the
/// remainder drawn from garden plants outside the draft costs an extra pot.
pub fn calculate_planter_pots_needed(
    draft: &GardenState,
    live: &GardenState,
    inv: &InventorySnapshot,
    norm: &Normalizer,
) -> usize {
    let ignored = &draft.ignored_tiles;
    let mut clears = 0usize;
    let mut freed: Vec<(String, MutationSet)> = Vec::new();
    let mut demands: BTreeMap<String, Vec<MutationSet>> = BTreeMap::new();

    for (tile, desired) in draft.active_objects() {
        if desired.is_egg() {
            continue;
        }
        let current = live.object(tile);
        if norm.satisfies(current, desired) {
            continue;
        }
        if let Some(TileObject::Plant(occupant)) = current {
            clears += 1;
            freed.push((norm.species(&occupant.species), norm.plant_mutations(occupant)));
        }
        if let TileObject::Plant(plant) = desired {
            demands
                .entry(norm.species(&plant.species))
                .or_default()
                .push(norm.desired_mutations(plant));
        }
    }

    let mut free: Vec<(String, MutationSet)> = inv
        .plants()
        .map(|i| (norm.species(&i.key), norm.mutation_set(&i.mutations)))
        .collect();
    free.extend(freed);

    let mut surplus: Vec<(String, MutationSet)> = index::garden_plants(live, ignored, norm)
        .into_iter()
        .filter(|p| draft.object(p.tile).is_none())
        .map(|p| (p.species, p.mutations))
        .collect();

    let mut relocations = 0usize;
    for (species, mut wanted) in demands {
        wanted.sort_by(|a, b| b.len().cmp(&a.len()));
        for mutations in wanted {
            if take_fewest(&mut free, &species, &mutations) {
                continue;
            }
            if take_fewest(&mut surplus, &species, &mutations) {
                relocations += 1;
            }
        }
    }
    clears + relocations
}

fn take_fewest(pool: &mut Vec<(String, MutationSet)>, species: &str, required: &MutationSet) -> bool {
    let best = pool
        .iter()
        .enumerate()
        .filter(|(_, (s, m))| s == species && required.is_subset(m))
        .min_by_key(|(_, (_, m))| m.len())
        .map(|(i, _)| i);
    match best {
        Some(i) => {
            pool.remove(i);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InventoryItem;
    use crate::catalog::PLANTER_POT_TOOL_ID;
    use crate::model::PlantObject;

    fn set(items: &[&str]) -> MutationSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn instance(id: &str, muts: &[&str]) -> PlantInstance {
        PlantInstance {
            source: InstanceSource::Inventory(id.to_string()),
            mutations: set(muts),
        }
    }

    #[test]
    fn most_specific_demand_claims_first_and_takes_fewest_extras() {
        let instances = vec![
            instance("ab", &["A", "B"]),
            instance("a", &["A"]),
            instance("abc", &["A", "B", "C"]),
        ];
        let demands = vec![
            MutationDemand { mutations: set(&["A"]), needed: 1 },
            MutationDemand { mutations: set(&["A", "B", "C"]), needed: 1 },
        ];
        let alloc = allocate_linked(&instances, &demands);
        assert_eq!(alloc.groups[0].mutations, set(&["A", "B", "C"]));
        assert_eq!(alloc.groups[0].claimed, vec![2]);
        assert_eq!(alloc.groups[1].mutations, set(&["A"]));
        assert_eq!(alloc.groups[1].claimed, vec![1]);
        assert_eq!(alloc.remaining, vec![0]);
    }

    #[test]
    fn greedy_order_is_kept_even_when_not_optimal() {
        // {A,B} is served first and takes the first of two equally sized
        // instances, which leaves nothing for {A,C}. A matching could serve both.
        let instances = vec![instance("abc", &["A", "B", "C"]), instance("abd", &["A", "B", "D"])];
        let demands = vec![
            MutationDemand { mutations: set(&["A", "B"]), needed: 1 },
            MutationDemand { mutations: set(&["A", "C"]), needed: 1 },
        ];
        let alloc = allocate_linked(&instances, &demands);
        assert_eq!(alloc.groups[0].claimed, vec![0]);
        assert!(alloc.groups[1].claimed.is_empty());
        assert_eq!(alloc.remaining, vec![1]);
    }

    #[test]
    fn summary_links_inventory_and_garden_instances() {
        let norm = Normalizer::new();
        let mut draft = GardenState::default();
        draft.tile_objects.insert(0, TileObject::plant("Carrot", &["Gold"]));
        draft.tile_objects.insert(1, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(2, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(3, TileObject::decor("Bench"));
        draft.boardwalk_tile_objects.insert(0, TileObject::decor("Bench"));

        let mut live = GardenState::default();
        live.tile_objects.insert(5, TileObject::Plant(PlantObject::grown("Carrot", &["Gold"])));
        live.tile_objects.insert(6, TileObject::decor("Bench"));

        let inv = InventorySnapshot::new(vec![
            InventoryItem::plant("p1", "Carrot", &[]),
            InventoryItem::plant("p2", "Carrot", &["Gold", "Wet"]),
        ]);

        let summary = requirement_summary(&draft, &live, &inv, &norm);
        let plain = summary.iter().find(|e| e.key == "Carrot" && e.mutations.is_empty()).unwrap();
        let gold = summary.iter().find(|e| e.key == "Carrot" && !e.mutations.is_empty()).unwrap();
        // Gold demand takes the garden Gold carrot (fewer extras than Gold+Wet).
        assert_eq!((gold.needed, gold.have), (1, 1));
        assert_eq!((plain.needed, plain.have), (2, 2));
        let bench = summary.iter().find(|e| e.key == "Bench").unwrap();
        assert_eq!((bench.needed, bench.have), (2, 1));
        assert_eq!(missing_items(&summary), vec![bench.clone()]);
        assert_eq!(bench.missing(), 1);
    }

    #[test]
    fn summary_skips_ignored_tiles_on_both_sides() {
        let norm = Normalizer::new();
        let mut draft = GardenState::default();
        draft.tile_objects.insert(0, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(1, TileObject::plant("Carrot", &[]));
        draft.ignored_tiles.dirt.insert(1);
        draft.ignored_tiles.dirt.insert(4);

        let mut live = GardenState::default();
        live.tile_objects.insert(4, TileObject::Plant(PlantObject::grown("Carrot", &[])));

        let summary = requirement_summary(&draft, &live, &InventorySnapshot::default(), &norm);
        assert_eq!(summary.len(), 1);
        assert_eq!((summary[0].needed, summary[0].have), (1, 0));
    }

    #[test]
    fn pots_count_clears_and_surplus_relocations() {
        let norm = Normalizer::new();
        let mut draft = GardenState::default();
        // Tile 0: wrong plant in place, must be potted.
        draft.tile_objects.insert(0, TileObject::plant("Tomato", &[]));
        // Tile 1: wants the carrot sitting on tile 0; the freed carrot covers it.
        draft.tile_objects.insert(1, TileObject::plant("Carrot", &[]));
        // Tile 2: wants a Gold pepper that only exists outside the draft.
        draft.tile_objects.insert(2, TileObject::plant("Pepper", &["Gold"]));
        // Tile 3: already correct.
        draft.tile_objects.insert(3, TileObject::plant("Corn", &[]));

        let mut live = GardenState::default();
        live.tile_objects.insert(0, TileObject::Plant(PlantObject::grown("Carrot", &[])));
        live.tile_objects.insert(3, TileObject::Plant(PlantObject::grown("Corn", &["Wet"])));
        live.tile_objects.insert(9, TileObject::Plant(PlantObject::grown("Pepper", &["Gold"])));

        let inv = InventorySnapshot::new(vec![
            InventoryItem::plant("t", "Tomato", &[]),
            InventoryItem::tool(PLANTER_POT_TOOL_ID, 1),
        ]);
        assert_eq!(calculate_planter_pots_needed(&draft, &live, &inv, &norm), 2);

        let req = PlanterPotRequirement { needed: 2, owned: inv.planter_pot_charges() };
        assert_eq!(req.shortfall(), 1);
    }

    #[test]
    fn pots_not_counted_for_decor_swaps_or_unsourceable_plants() {
        let norm = Normalizer::new();
        let mut draft = GardenState::default();
        draft.tile_objects.insert(0, TileObject::decor("Lantern"));
        draft.tile_objects.insert(1, TileObject::plant("Lemon", &[]));
        let mut live = GardenState::default();
        live.tile_objects.insert(0, TileObject::decor("Bench"));
        assert_eq!(
            calculate_planter_pots_needed(&draft, &live, &InventorySnapshot::default(), &norm),
            0
        );
    }
}
