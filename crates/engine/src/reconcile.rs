//! The apply loop: converge the live garden onto a draft.
//!
//! Every command is fire-and-forget, so progress is only ever observed on the
//! next read. Each pass re-reads the garden and inventory, builds a read-only
//! [`PassPlan`], walks the draft tiles in a fixed order issuing the smallest
//! corrective commands, and records what it did in a [`PassEffects`]
//! accumulator that is folded into the run state when the pass ends. The run
//! stops when a pass changes nothing and nothing is left to do, when the
//! pass budget runs out, or when it is cancelled.

use crate::adapter::{InventoryItem, InventorySnapshot, ItemKind};
use crate::config::{pause, ApplyOptions};
use crate::index::{self, GardenPlant};
use crate::layout::{merge_for_overwrite, sanitize_garden};
use crate::model::{GardenState, TileObject, TileRef};
use crate::normalize::{mutation_key, MutationSet, Normalizer};
use crate::remote::{RemoteState, RemoteStore};
use crate::requirements::calculate_planter_pots_needed;
use garden_layout_protocol::{GameCommand, Notice, TileType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ApplyOutcome {
    /// A pass changed nothing and no target is outstanding.
    Converged,
    /// The pass budget ran out without an error. Not necessarily converged.
    PassLimit,
    /// One forward pass without potting or relocation.
    SinglePass,
    Cancelled,
    #[serde(rename_all = "camelCase")]
    InsufficientPlanterPots { needed: usize, owned: u32 },
    /// The single-pass apply cannot source plants.
    PlantsRequireClearing,
    GardenUnavailable,
    Failed { error: String },
    /// The loop failed and the draft was written over the garden directly.
    FallbackOverwrite { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    pub passes: usize,
    pub commands_sent: usize,
    pub notices: Vec<Notice>,
    pub blocked_tiles: Vec<TileRef>,
    pub abandoned_tiles: Vec<TileRef>,
}

impl ApplyReport {
    fn with_outcome(outcome: ApplyOutcome) -> Self {
        Self {
            outcome,
            passes: 0,
            commands_sent: 0,
            notices: Vec::new(),
            blocked_tiles: Vec::new(),
            abandoned_tiles: Vec::new(),
        }
    }

    /// No fatal error. Does not imply convergence.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.outcome,
            ApplyOutcome::Converged | ApplyOutcome::PassLimit | ApplyOutcome::SinglePass
        )
    }

    pub fn converged(&self) -> bool {
        self.outcome == ApplyOutcome::Converged
    }
}

#[derive(Debug, Clone)]
enum Desired {
    Plant {
        species: String,
        mutations: MutationSet,
        key: String,
    },
    Decor {
        decor_id: String,
        rotation: i32,
    },
}

#[derive(Debug, Clone)]
struct Target {
    tile: TileRef,
    desired: Desired,
    object: TileObject,
}

/// Draft tiles in processing order. Dirt: plants grouped by mutation key,
/// larger mutation sets first, then decors by id; boardwalk decors by id.
/// Tiles of one group stay together so repeated picks hit the same
/// inventory stack. The most specific plant demands claim items first, the
/// same order the requirement summary allocates in.
fn order_targets(draft: &GardenState, norm: &Normalizer) -> Vec<Target> {
    let mut targets: Vec<(u8, usize, String, Target)> = draft
        .active_objects()
        .filter_map(|(tile, obj)| {
            let (rank, specificity, group, desired) = match obj {
                TileObject::Plant(_) if tile.tile_type != TileType::Dirt => return None,
                TileObject::Plant(plant) => {
                    let species = norm.species(&plant.species);
                    let mutations = norm.desired_mutations(plant);
                    let key = mutation_key(&species, &mutations);
                    (
                        0,
                        mutations.len(),
                        key.clone(),
                        Desired::Plant {
                            species,
                            mutations,
                            key,
                        },
                    )
                }
                TileObject::Decor(d) => (
                    1,
                    0,
                    d.decor_id.clone(),
                    Desired::Decor {
                        decor_id: d.decor_id.clone(),
                        rotation: d.rotation,
                    },
                ),
                TileObject::Egg(_) => return None,
            };
            Some((
                rank,
                specificity,
                group,
                Target {
                    tile,
                    desired,
                    object: obj.clone(),
                },
            ))
        })
        .collect();
    targets.sort_by(|a, b| {
        a.3.tile
            .tile_type
            .cmp(&b.3.tile.tile_type)
            .then(a.0.cmp(&b.0))
            .then(b.1.cmp(&a.1))
            .then(a.2.cmp(&b.2))
            .then(a.3.tile.index.cmp(&b.3.tile.index))
    });
    targets.into_iter().map(|(_, _, _, t)| t).collect()
}

/// Read-only view of one pass.
struct PassPlan {
    live: GardenState,
    free_slots: usize,
    pot_charges: u32,
    decor_stock: BTreeMap<String, u32>,
    remaining_by_key: BTreeMap<String, usize>,
    /// Live plants on draft tiles that want something else. Fewest mutations first.
    relocatable: Vec<GardenPlant>,
    /// Live plants on tiles the draft leaves alone. Fewest mutations first.
    surplus: Vec<GardenPlant>,
    misplaced_decors: BTreeMap<String, Vec<TileRef>>,
}

/// What a pass did; folded into the run when the pass ends.
#[derive(Debug, Default)]
struct PassEffects {
    changed: usize,
    vacated: BTreeSet<TileRef>,
    /// Tiles already used as a pickup or pot source this pass.
    taken: BTreeSet<TileRef>,
    consumed: HashSet<String>,
    slots_used: i64,
    pots_used: u32,
    decor_delta: BTreeMap<String, i64>,
    placed_by_key: BTreeMap<String, usize>,
    plants_halted: bool,
    fresh_plants: Option<Vec<InventoryItem>>,
    issued: Vec<(TileRef, String)>,
    inventory_dirty: bool,
}

impl PassEffects {
    fn occupant<'p>(&self, plan: &'p PassPlan, tile: TileRef) -> Option<&'p TileObject> {
        if self.vacated.contains(&tile) {
            None
        } else {
            plan.live.object(tile)
        }
    }

    fn free_slots(&self, plan: &PassPlan) -> i64 {
        plan.free_slots as i64 - self.slots_used
    }

    fn pots_left(&self, plan: &PassPlan) -> i64 {
        i64::from(plan.pot_charges) - i64::from(self.pots_used)
    }

    fn decor_available(&self, plan: &PassPlan, decor_id: &str) -> i64 {
        i64::from(plan.decor_stock.get(decor_id).copied().unwrap_or(0))
            + self.decor_delta.get(decor_id).copied().unwrap_or(0)
    }

    fn remaining(&self, plan: &PassPlan, key: &str) -> usize {
        plan.remaining_by_key
            .get(key)
            .copied()
            .unwrap_or(0)
            .saturating_sub(self.placed_by_key.get(key).copied().unwrap_or(0))
    }
}

#[derive(Debug, Clone)]
struct PendingPlacement {
    attempts: u32,
    item_id: String,
}

struct Run<'a, S> {
    remote: RemoteState<'a, S>,
    norm: &'a Normalizer,
    opts: &'a ApplyOptions,
    draft: GardenState,
    desired: BTreeMap<TileRef, TileObject>,
    blocked: Vec<TileRef>,
    used_inventory_ids: HashSet<String>,
    tile_cooldowns: HashMap<TileRef, u32>,
    pending: HashMap<TileRef, PendingPlacement>,
    abandoned: BTreeSet<TileRef>,
    egg_blocked: BTreeSet<TileRef>,
    plant_items: Vec<InventoryItem>,
    inventory_dirty: bool,
    warned: HashSet<String>,
    notices: Vec<Notice>,
    commands_sent: usize,
    passes: usize,
}

impl<'a, S: RemoteStore> Run<'a, S> {
    fn new(
        store: &'a S,
        norm: &'a Normalizer,
        opts: &'a ApplyOptions,
        draft: GardenState,
        blocked: Vec<TileRef>,
    ) -> Self {
        let desired = draft
            .active_objects()
            .filter(|(_, obj)| !obj.is_egg())
            .map(|(tile, obj)| (tile, obj.clone()))
            .collect();
        Self {
            remote: RemoteState::new(store, norm),
            norm,
            opts,
            draft,
            desired,
            blocked,
            used_inventory_ids: HashSet::new(),
            tile_cooldowns: HashMap::new(),
            pending: HashMap::new(),
            abandoned: BTreeSet::new(),
            egg_blocked: BTreeSet::new(),
            plant_items: Vec::new(),
            inventory_dirty: true,
            warned: HashSet::new(),
            notices: Vec::new(),
            commands_sent: 0,
            passes: 0,
        }
    }

    fn cancelled(&self) -> bool {
        self.opts.cancel.is_cancelled()
    }

    fn warn_once(&mut self, key: impl Into<String>, notice: Notice) {
        if self.warned.insert(key.into()) {
            warn!(target: "garden_layout::apply", message = %notice.message);
            self.notices.push(notice);
        }
    }

    async fn send(&mut self, command: GameCommand) -> anyhow::Result<()> {
        self.remote.send(command).await?;
        self.commands_sent += 1;
        Ok(())
    }

    async fn execute(&mut self) -> anyhow::Result<ApplyOutcome> {
        let targets = order_targets(&self.draft, self.norm);

        let Some(live) = self.remote.garden().await else {
            return Ok(ApplyOutcome::GardenUnavailable);
        };
        let inventory = self.remote.inventory().await;
        let needed = calculate_planter_pots_needed(&self.draft, &live, &inventory, self.norm);
        let owned = inventory.planter_pot_charges();
        if needed > owned as usize {
            self.notices.push(Notice::error(format!(
                "Not enough Planter Pots: need {needed}, have {owned} ({} short)",
                needed - owned as usize
            )));
            return Ok(ApplyOutcome::InsufficientPlanterPots { needed, owned });
        }

        for pass in 1..=self.opts.limits.max_passes {
            if self.cancelled() {
                return Ok(ApplyOutcome::Cancelled);
            }
            self.passes = pass;

            let Some(live) = self.remote.garden().await else {
                return Ok(ApplyOutcome::GardenUnavailable);
            };
            let inventory = self.remote.inventory().await;
            if self.inventory_dirty {
                self.plant_items = inventory.plants().cloned().collect();
                self.inventory_dirty = false;
            }
            self.tile_cooldowns.retain(|_, left| {
                *left = left.saturating_sub(1);
                *left > 0
            });
            self.recheck_pending(&live);

            let plan = self.plan_pass(live, &inventory, &targets);
            let mut fx = PassEffects::default();
            for target in &targets {
                if self.cancelled() {
                    return Ok(ApplyOutcome::Cancelled);
                }
                self.process_tile(&plan, &mut fx, target).await?;
            }

            let changed = fx.changed;
            self.merge(fx);
            debug!(target: "garden_layout::apply", pass, changed, "pass done");

            if changed == 0 {
                if !self.has_pending_targets(&plan.live, &targets) {
                    info!(
                        target: "garden_layout::apply",
                        passes = pass,
                        commands = self.commands_sent,
                        "layout converged"
                    );
                    return Ok(ApplyOutcome::Converged);
                }
                // Nothing moved but work remains: the remote may lag behind.
                self.inventory_dirty = true;
                let delay = if self.tile_cooldowns.is_empty() {
                    self.opts.timing.stuck_pass
                } else {
                    self.opts.timing.inter_pass
                };
                pause(delay).await;
                continue;
            }
            pause(self.opts.timing.inter_pass).await;
        }

        info!(
            target: "garden_layout::apply",
            passes = self.passes,
            commands = self.commands_sent,
            "pass budget exhausted"
        );
        Ok(ApplyOutcome::PassLimit)
    }

    fn recheck_pending(&mut self, live: &GardenState) {
        let max = self.opts.limits.max_placement_attempts;
        let mut settled = Vec::new();
        let mut retry = Vec::new();
        for (tile, pending) in &self.pending {
            let satisfied = self
                .desired
                .get(tile)
                .is_some_and(|want| self.norm.satisfies(live.object(*tile), want));
            if satisfied {
                settled.push(*tile);
            } else if !self.tile_cooldowns.contains_key(tile) {
                if pending.attempts >= max {
                    settled.push(*tile);
                    self.abandoned.insert(*tile);
                }
                retry.push(pending.item_id.clone());
            }
        }
        for tile in settled {
            if self.abandoned.contains(&tile) && self.pending.remove(&tile).is_some() {
                let message = format!("Gave up on {tile} after {max} attempts");
                self.warn_once(format!("abandoned:{tile}"), Notice::warning(message));
            } else {
                self.pending.remove(&tile);
            }
        }
        // The placement never landed; the item may be used again.
        for item_id in retry {
            self.used_inventory_ids.remove(&item_id);
        }
    }

    fn plan_pass(&self, live: GardenState, inv: &InventorySnapshot, targets: &[Target]) -> PassPlan {
        let ignored = &self.draft.ignored_tiles;

        let mut remaining_by_key: BTreeMap<String, usize> = BTreeMap::new();
        for target in targets {
            if let Desired::Plant { key, .. } = &target.desired {
                if !self.tile_cooldowns.contains_key(&target.tile)
                    && !self.norm.satisfies(live.object(target.tile), &target.object)
                {
                    *remaining_by_key.entry(key.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut relocatable = Vec::new();
        let mut surplus = Vec::new();
        for plant in index::garden_plants(&live, ignored, self.norm) {
            match self.desired.get(&plant.tile) {
                Some(want) => {
                    if !self.tile_cooldowns.contains_key(&plant.tile)
                        && !self.norm.satisfies(live.object(plant.tile), want)
                    {
                        relocatable.push(plant);
                    }
                }
                None => surplus.push(plant),
            }
        }
        let fewest_first =
            |a: &GardenPlant, b: &GardenPlant| a.mutations.len().cmp(&b.mutations.len()).then(a.tile.cmp(&b.tile));
        relocatable.sort_by(fewest_first);
        surplus.sort_by(fewest_first);

        let mut misplaced_decors = index::collect_garden_decor_slots(&live, ignored);
        for (decor_id, tiles) in misplaced_decors.iter_mut() {
            tiles.retain(|tile| {
                !matches!(self.desired.get(tile), Some(TileObject::Decor(d)) if d.decor_id == *decor_id)
            });
        }
        misplaced_decors.retain(|_, tiles| !tiles.is_empty());

        PassPlan {
            free_slots: inv.free_slots(),
            pot_charges: inv.planter_pot_charges(),
            decor_stock: index::read_decor_inventory(inv),
            remaining_by_key,
            relocatable,
            surplus,
            misplaced_decors,
            live,
        }
    }

    fn merge(&mut self, fx: PassEffects) {
        self.used_inventory_ids.extend(fx.consumed);
        let cooldown = self.opts.limits.plant_cooldown_passes;
        for (tile, item_id) in fx.issued {
            self.tile_cooldowns.insert(tile, cooldown);
            let entry = self.pending.entry(tile).or_insert(PendingPlacement {
                attempts: 0,
                item_id: item_id.clone(),
            });
            entry.attempts += 1;
            entry.item_id = item_id;
        }
        self.inventory_dirty |= fx.inventory_dirty;
    }

    fn has_pending_targets(&self, live: &GardenState, targets: &[Target]) -> bool {
        targets.iter().any(|t| {
            let current = live.object(t.tile);
            !self.abandoned.contains(&t.tile)
                && !current.is_some_and(TileObject::is_egg)
                && !self.norm.satisfies(current, &t.object)
        })
    }

    async fn process_tile(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        target: &Target,
    ) -> anyhow::Result<()> {
        let tile = target.tile;
        if self.draft.is_ignored(tile) || self.abandoned.contains(&tile) {
            return Ok(());
        }
        if self.norm.satisfies(fx.occupant(plan, tile), &target.object) {
            return Ok(());
        }
        match &target.desired {
            Desired::Plant {
                species,
                mutations,
                key,
            } => {
                if tile.tile_type != TileType::Dirt || self.tile_cooldowns.contains_key(&tile) {
                    return Ok(());
                }
                let max = self.opts.limits.max_placement_attempts;
                if self.pending.get(&tile).is_some_and(|p| p.attempts >= max) {
                    return Ok(());
                }
                self.process_plant(plan, fx, tile, species, mutations, key).await
            }
            Desired::Decor { decor_id, rotation } => {
                self.process_decor(plan, fx, tile, decor_id, *rotation).await
            }
        }
    }

    async fn process_plant(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        tile: TileRef,
        species: &str,
        mutations: &MutationSet,
        key: &str,
    ) -> anyhow::Result<()> {
        if fx.plants_halted {
            return Ok(());
        }
        match fx.occupant(plan, tile) {
            Some(TileObject::Egg(_)) => {
                self.block_egg(tile);
                return Ok(());
            }
            Some(TileObject::Plant(_)) => {
                if !self.pot_occupant(plan, fx, tile).await? {
                    return Ok(());
                }
            }
            Some(TileObject::Decor(d)) => {
                let decor_id = d.decor_id.clone();
                let delay = self.opts.timing.pickup;
                if !self.pickup_decor(plan, fx, tile, &decor_id, delay).await? {
                    return Ok(());
                }
            }
            None => {}
        }
        if fx.plants_halted {
            return Ok(());
        }

        let Some(item_id) = self.source_plant(plan, fx, tile, species, mutations, key).await? else {
            if !fx.plants_halted {
                let label = if mutations.is_empty() {
                    species.to_string()
                } else {
                    let names: Vec<&str> = mutations.iter().map(String::as_str).collect();
                    format!("{species} ({})", names.join(", "))
                };
                self.warn_once(
                    format!("missing:{key}"),
                    Notice::warning(format!("No {label} available to plant")),
                );
            }
            return Ok(());
        };

        self.send(GameCommand::PlantGardenPlant {
            slot: tile.index,
            item_id: item_id.clone(),
        })
        .await?;
        fx.consumed.insert(item_id.clone());
        fx.issued.push((tile, item_id));
        *fx.placed_by_key.entry(key.to_string()).or_insert(0) += 1;
        fx.slots_used -= 1;
        fx.changed += 1;
        fx.inventory_dirty = true;
        pause(self.opts.timing.inter_tile).await;
        Ok(())
    }

    async fn process_decor(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        tile: TileRef,
        decor_id: &str,
        rotation: i32,
    ) -> anyhow::Result<()> {
        match fx.occupant(plan, tile) {
            Some(TileObject::Egg(_)) => {
                self.block_egg(tile);
                return Ok(());
            }
            Some(TileObject::Decor(d)) => {
                let wrong = d.decor_id.clone();
                let delay = self.opts.timing.pickup;
                if !self.pickup_decor(plan, fx, tile, &wrong, delay).await? {
                    return Ok(());
                }
            }
            Some(TileObject::Plant(_)) => {
                if !self.pot_occupant(plan, fx, tile).await? {
                    return Ok(());
                }
            }
            None => {}
        }

        if fx.decor_available(plan, decor_id) <= 0 {
            let source = plan.misplaced_decors.get(decor_id).and_then(|tiles| {
                tiles
                    .iter()
                    .find(|t| **t != tile && !fx.taken.contains(*t))
                    .copied()
            });
            let Some(source) = source else {
                self.warn_once(
                    format!("missing-decor:{decor_id}"),
                    Notice::warning(format!("No {decor_id} available to place")),
                );
                return Ok(());
            };
            let delay = self.opts.timing.relocate;
            if !self.pickup_decor(plan, fx, source, decor_id, delay).await? {
                return Ok(());
            }
        }

        self.send(GameCommand::PlaceDecor {
            tile_type: tile.tile_type,
            local_tile_index: tile.index,
            decor_id: decor_id.to_string(),
            rotation,
        })
        .await?;
        *fx.decor_delta.entry(decor_id.to_string()).or_insert(0) -= 1;
        fx.changed += 1;
        pause(self.opts.timing.place).await;
        Ok(())
    }

    fn block_egg(&mut self, tile: TileRef) {
        if self.egg_blocked.insert(tile) {
            self.warn_once(
                format!("egg:{tile}"),
                Notice::warning(format!("{tile} holds an egg and was left alone")),
            );
        }
    }

    fn has_room(&mut self, plan: &PassPlan, fx: &mut PassEffects) -> bool {
        if fx.free_slots(plan) > 0 {
            return true;
        }
        fx.plants_halted = true;
        self.warn_once(
            "inventory-full",
            Notice::warning("Inventory is full; free a slot so plants can be moved"),
        );
        false
    }

    fn has_pot(&mut self, plan: &PassPlan, fx: &PassEffects) -> bool {
        if fx.pots_left(plan) > 0 {
            return true;
        }
        self.warn_once("no-planter-pots", Notice::warning("Out of Planter Pot charges"));
        false
    }

    /// Pots the plant on `tile` so the tile can be reused.
    async fn pot_occupant(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        tile: TileRef,
    ) -> anyhow::Result<bool> {
        if !self.has_room(plan, fx) || !self.has_pot(plan, fx) {
            return Ok(false);
        }
        self.pot(fx, tile).await?;
        pause(self.opts.timing.pickup).await;
        Ok(true)
    }

    async fn pot(&mut self, fx: &mut PassEffects, tile: TileRef) -> anyhow::Result<()> {
        self.send(GameCommand::PotPlant { slot: tile.index }).await?;
        fx.slots_used += 1;
        fx.pots_used += 1;
        fx.vacated.insert(tile);
        fx.taken.insert(tile);
        fx.changed += 1;
        fx.inventory_dirty = true;
        Ok(())
    }

    async fn pickup_decor(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        tile: TileRef,
        decor_id: &str,
        delay: Duration,
    ) -> anyhow::Result<bool> {
        let stacked = fx.decor_available(plan, decor_id) > 0;
        if !stacked && fx.free_slots(plan) <= 0 {
            self.warn_once(
                "inventory-full",
                Notice::warning("Inventory is full; free a slot so decor can be picked up"),
            );
            return Ok(false);
        }
        self.send(GameCommand::PickupDecor {
            tile_type: tile.tile_type,
            local_tile_index: tile.index,
        })
        .await?;
        if !stacked {
            fx.slots_used += 1;
        }
        *fx.decor_delta.entry(decor_id.to_string()).or_insert(0) += 1;
        fx.vacated.insert(tile);
        fx.taken.insert(tile);
        fx.changed += 1;
        pause(delay).await;
        Ok(true)
    }

    fn find_inventory_plant(&self, fx: &PassEffects, species: &str, mutations: &MutationSet) -> Option<String> {
        let items = fx.fresh_plants.as_deref().unwrap_or(&self.plant_items);
        items
            .iter()
            .filter(|i| i.kind == ItemKind::Plant)
            .filter(|i| !self.used_inventory_ids.contains(&i.id) && !fx.consumed.contains(&i.id))
            .filter(|i| self.norm.species(&i.key) == species)
            .map(|i| (i, self.norm.mutation_set(&i.mutations)))
            .filter(|(_, have)| mutations.is_subset(have))
            .min_by_key(|(_, have)| have.len())
            .map(|(i, _)| i.id.clone())
    }

    /// Inventory first, then a plant relocated out of the garden.
    async fn source_plant(
        &mut self,
        plan: &PassPlan,
        fx: &mut PassEffects,
        tile: TileRef,
        species: &str,
        mutations: &MutationSet,
        key: &str,
    ) -> anyhow::Result<Option<String>> {
        if let Some(id) = self.find_inventory_plant(fx, species, mutations) {
            return Ok(Some(id));
        }

        let usable = |p: &&GardenPlant| p.tile != tile && !fx.taken.contains(&p.tile) && p.species == species;
        let exact = plan.relocatable.iter().filter(usable).find(|p| p.mutations == *mutations);
        let superset = || {
            plan.relocatable
                .iter()
                .filter(usable)
                .find(|p| mutations.is_subset(&p.mutations))
        };
        let source = match exact.or_else(superset) {
            Some(p) => Some(p.clone()),
            None if fx.remaining(plan, key) > 0 => plan
                .surplus
                .iter()
                .filter(usable)
                .find(|p| mutations.is_subset(&p.mutations))
                .cloned(),
            None => None,
        };
        let Some(source) = source else {
            return Ok(None);
        };
        if !self.has_room(plan, fx) || !self.has_pot(plan, fx) {
            return Ok(None);
        }

        debug!(
            target: "garden_layout::apply",
            from = %source.tile,
            to = %tile,
            species,
            "relocating plant"
        );
        self.pot(fx, source.tile).await?;
        pause(self.opts.timing.relocate).await;
        self.await_potted(fx, species, mutations).await
    }

    /// Polls the inventory until a matching potted plant shows up.
    async fn await_potted(
        &mut self,
        fx: &mut PassEffects,
        species: &str,
        mutations: &MutationSet,
    ) -> anyhow::Result<Option<String>> {
        for _ in 0..self.opts.limits.pot_confirm_polls {
            if self.cancelled() {
                return Ok(None);
            }
            let inv = self.remote.inventory().await;
            fx.fresh_plants = Some(inv.plants().cloned().collect());
            if let Some(id) = self.find_inventory_plant(fx, species, mutations) {
                return Ok(Some(id));
            }
            pause(self.opts.timing.pot_confirm).await;
        }
        Ok(None)
    }

    async fn fallback(&self) -> anyhow::Result<()> {
        let live = self.remote.garden().await.unwrap_or_default();
        let merged = merge_for_overwrite(&live, &self.draft);
        self.remote.overwrite_garden(&merged).await
    }

    fn into_report(self, outcome: ApplyOutcome) -> ApplyReport {
        ApplyReport {
            outcome,
            passes: self.passes,
            commands_sent: self.commands_sent,
            notices: self.notices,
            blocked_tiles: self
                .blocked
                .into_iter()
                .chain(self.egg_blocked)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            abandoned_tiles: self.abandoned.into_iter().collect(),
        }
    }
}

/// Converges the live garden onto `draft`, potting and relocating plants as
/// needed. `blocked` tiles are treated as ignored for this run.
pub async fn apply_garden_server_with_potting<S: RemoteStore>(
    store: &S,
    norm: &Normalizer,
    draft: &GardenState,
    blocked: &[TileRef],
    opts: &ApplyOptions,
) -> ApplyReport {
    let mut draft = sanitize_garden(draft, norm);
    for tile in blocked {
        draft.ignored_tiles.insert(*tile);
    }
    let mut run = Run::new(store, norm, opts, draft, blocked.to_vec());
    let outcome = match run.execute().await {
        Ok(outcome) => outcome,
        Err(err) => {
            let error = format!("{err:#}");
            warn!(target: "garden_layout::apply", %error, "apply loop failed");
            if opts.allow_fallback {
                match run.fallback().await {
                    Ok(()) => {
                        run.notices.push(Notice::warning(
                            "Apply hit an error; the layout was written directly instead",
                        ));
                        ApplyOutcome::FallbackOverwrite { error }
                    }
                    Err(fallback_err) => {
                        warn!(target: "garden_layout::apply", error = %format!("{fallback_err:#}"), "fallback overwrite failed");
                        run.notices.push(Notice::error("Apply failed; try again"));
                        ApplyOutcome::Failed { error }
                    }
                }
            } else {
                run.notices.push(Notice::error("Apply failed; try again"));
                ApplyOutcome::Failed { error }
            }
        }
    };
    if outcome == ApplyOutcome::Cancelled {
        run.notices.push(Notice::info("Apply cancelled"));
    }
    run.into_report(outcome)
}

/// One forward pass that only places decor from the inventory. Plant tiles
/// abort the run: sourcing plants needs the potting loop.
pub async fn apply_garden_server<S: RemoteStore>(
    store: &S,
    norm: &Normalizer,
    draft: &GardenState,
    opts: &ApplyOptions,
) -> ApplyReport {
    let draft = sanitize_garden(draft, norm);
    let remote = RemoteState::new(store, norm);
    let Some(live) = remote.garden().await else {
        return ApplyReport::with_outcome(ApplyOutcome::GardenUnavailable);
    };
    let inventory = remote.inventory().await;
    let mut stock = index::read_decor_inventory(&inventory);
    let mut report = ApplyReport::with_outcome(ApplyOutcome::SinglePass);
    report.passes = 1;

    for target in order_targets(&draft, norm) {
        if opts.cancel.is_cancelled() {
            report.outcome = ApplyOutcome::Cancelled;
            return report;
        }
        let current = live.object(target.tile);
        if norm.satisfies(current, &target.object) {
            continue;
        }
        match &target.desired {
            Desired::Plant { .. } => {
                report.notices.push(Notice::error(
                    "Plant tiles need \"clear target tiles\" so plants can be potted and moved",
                ));
                report.outcome = ApplyOutcome::PlantsRequireClearing;
                return report;
            }
            Desired::Decor { decor_id, rotation } => {
                if current.is_some() {
                    continue;
                }
                let left = stock.entry(decor_id.clone()).or_insert(0);
                if *left == 0 {
                    report
                        .notices
                        .push(Notice::warning(format!("No {decor_id} left for {}", target.tile)));
                    continue;
                }
                let command = GameCommand::PlaceDecor {
                    tile_type: target.tile.tile_type,
                    local_tile_index: target.tile.index,
                    decor_id: decor_id.clone(),
                    rotation: *rotation,
                };
                if let Err(err) = remote.send(command).await {
                    report.outcome = ApplyOutcome::Failed {
                        error: format!("{err:#}"),
                    };
                    report.notices.push(Notice::error("Apply failed; try again"));
                    return report;
                }
                *left -= 1;
                report.commands_sent += 1;
                pause(opts.timing.place).await;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_grouped_most_specific_first_then_decor_then_boardwalk() {
        let norm = Normalizer::new();
        let mut draft = GardenState::default();
        draft.tile_objects.insert(0, TileObject::decor("Lantern"));
        draft.tile_objects.insert(1, TileObject::plant("Tomato", &[]));
        draft.tile_objects.insert(2, TileObject::plant("Carrot", &["Gold"]));
        draft.tile_objects.insert(3, TileObject::decor("Bench"));
        draft.tile_objects.insert(4, TileObject::plant("Carrot", &["Gold"]));
        draft.tile_objects.insert(5, TileObject::plant("Carrot", &[]));
        draft.tile_objects.insert(6, TileObject::egg("CommonEgg"));
        draft.boardwalk_tile_objects.insert(0, TileObject::decor("Lantern"));
        draft.boardwalk_tile_objects.insert(1, TileObject::decor("Bench"));
        draft.boardwalk_tile_objects.insert(2, TileObject::plant("Carrot", &[]));

        let order: Vec<TileRef> = order_targets(&draft, &norm).iter().map(|t| t.tile).collect();
        assert_eq!(
            order,
            vec![
                TileRef::dirt(2),
                TileRef::dirt(4),
                TileRef::dirt(5),
                TileRef::dirt(1),
                TileRef::dirt(3),
                TileRef::dirt(0),
                TileRef::boardwalk(1),
                TileRef::boardwalk(0),
            ]
        );
    }

    #[test]
    fn report_success_is_not_convergence() {
        let report = ApplyReport::with_outcome(ApplyOutcome::PassLimit);
        assert!(report.succeeded());
        assert!(!report.converged());
        assert!(!ApplyReport::with_outcome(ApplyOutcome::Cancelled).succeeded());
        assert!(!ApplyReport::with_outcome(ApplyOutcome::InsufficientPlanterPots { needed: 2, owned: 1 }).succeeded());
    }
}
