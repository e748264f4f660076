use super::*;
use crate::catalog::PLANTER_POT_TOOL_ID;
use crate::config::{MAX_PLACEMENT_ATTEMPTS, PLANT_COOLDOWN_PASSES};
use crate::model::{DecorObject, PlantObject};
use garden_layout_protocol::{GameCommand, NoticeLevel, TileType};
use std::path::PathBuf;

fn temp_db(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "garden-layout-{tag}-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ))
}

fn temp_library(tag: &str) -> LayoutLibrary {
    let library = LayoutLibrary::new(temp_db(tag));
    let _ = library.open().expect("open db");
    library
}

fn grown(species: &str, mutations: &[&str]) -> TileObject {
    TileObject::Plant(PlantObject::grown(species, mutations))
}

fn garden(dirt: &[(u32, TileObject)]) -> GardenState {
    let mut g = GardenState::default();
    for (index, obj) in dirt {
        g.tile_objects.insert(*index, obj.clone());
    }
    g
}

fn pots(n: u32) -> InventoryItem {
    InventoryItem::tool(PLANTER_POT_TOOL_ID, n)
}

fn options(max_passes: usize) -> ApplyOptions {
    let mut opts = ApplyOptions::instant();
    opts.limits.max_passes = max_passes;
    opts
}

async fn apply(remote: &MemoryRemote, draft: &GardenState, opts: &ApplyOptions) -> ApplyReport {
    apply_garden_server_with_potting(remote, &Normalizer::new(), draft, &[], opts).await
}

fn service(remote: MemoryRemote, tag: &str) -> GardenLayoutService<MemoryRemote> {
    GardenLayoutService::new(remote, temp_library(tag)).with_timing(ApplyTiming::instant())
}

#[tokio::test]
async fn plants_single_carrot_from_inventory() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::plant("x1", "Carrot", &[])]),
    );
    let draft = garden(&[(3, TileObject::plant("Carrot", &[]))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert_eq!(report.outcome, ApplyOutcome::Converged);
    assert!(report.passes <= 2);
    assert_eq!(
        remote.sent(),
        vec![GameCommand::PlantGardenPlant {
            slot: 3,
            item_id: "x1".to_string()
        }]
    );
    assert!(matches!(
        remote.garden().object(TileRef::dirt(3)),
        Some(TileObject::Plant(p)) if p.species == "Carrot"
    ));
}

#[tokio::test]
async fn second_apply_is_a_no_op() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![
            InventoryItem::plant("x1", "Carrot", &[]),
            InventoryItem::decor("Bench", 1),
        ]),
    );
    let draft = garden(&[
        (3, TileObject::plant("Carrot", &[])),
        (4, TileObject::decor("Bench")),
    ]);

    let first = apply(&remote, &draft, &ApplyOptions::instant()).await;
    assert!(first.converged());
    assert_eq!(remote.sent().len(), 2);

    remote.clear_sent();
    let second = apply(&remote, &draft, &ApplyOptions::instant()).await;
    assert!(second.converged());
    assert_eq!(second.passes, 1);
    assert!(remote.sent().is_empty());
}

#[tokio::test]
async fn wrong_decor_is_picked_up_even_when_replacement_is_missing() {
    let remote = MemoryRemote::new(
        garden(&[(5, TileObject::decor("Bench"))]),
        InventorySnapshot::default(),
    );
    let draft = garden(&[(5, TileObject::decor("Lantern"))]);

    let report = apply(&remote, &draft, &options(8)).await;

    assert!(report.succeeded());
    assert_eq!(report.outcome, ApplyOutcome::PassLimit);
    assert_eq!(
        remote.sent(),
        vec![GameCommand::PickupDecor {
            tile_type: TileType::Dirt,
            local_tile_index: 5
        }]
    );
    assert!(remote.garden().object(TileRef::dirt(5)).is_none());
    let warnings: Vec<_> = report
        .notices
        .iter()
        .filter(|n| n.message.contains("Lantern"))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn eggs_are_never_touched() {
    let remote = MemoryRemote::new(
        garden(&[(2, TileObject::egg("CommonEgg"))]),
        InventorySnapshot::new(vec![InventoryItem::plant("c1", "Carrot", &[]), pots(3)]),
    );
    let draft = garden(&[(2, TileObject::plant("Carrot", &[]))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert!(remote.sent().is_empty());
    assert_eq!(report.blocked_tiles, vec![TileRef::dirt(2)]);
    assert!(remote.garden().object(TileRef::dirt(2)).is_some_and(TileObject::is_egg));
}

#[tokio::test]
async fn ignored_tiles_are_not_read_or_written() {
    let remote = MemoryRemote::new(
        garden(&[(1, grown("Carrot", &[]))]),
        InventorySnapshot::new(vec![pots(5)]),
    );
    let mut draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::decor("Bench")),
    ]);
    draft.ignored_tiles.insert(TileRef::dirt(1));

    let report = apply(&remote, &draft, &options(4)).await;

    assert_eq!(report.outcome, ApplyOutcome::PassLimit);
    assert!(remote.sent().is_empty());
    assert!(matches!(
        remote.garden().object(TileRef::dirt(1)),
        Some(TileObject::Plant(p)) if p.species == "Carrot"
    ));
}

#[tokio::test]
async fn swaps_plants_through_planter_pots() {
    let remote = MemoryRemote::new(
        garden(&[(0, grown("Tomato", &[])), (1, grown("Carrot", &[]))]),
        InventorySnapshot::new(vec![pots(2)]),
    );
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::plant("Tomato", &[])),
    ]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged(), "{report:?}");
    assert!(remote.rejected().is_empty());
    let sent = remote.sent();
    assert_eq!(&sent[..2], &[GameCommand::PotPlant { slot: 0 }, GameCommand::PotPlant { slot: 1 }]);
    assert_eq!(sent.len(), 4);
    let live = remote.garden();
    assert!(matches!(live.object(TileRef::dirt(0)), Some(TileObject::Plant(p)) if p.species == "Carrot"));
    assert!(matches!(live.object(TileRef::dirt(1)), Some(TileObject::Plant(p)) if p.species == "Tomato"));
    assert_eq!(remote.inventory().planter_pot_charges(), 0);
}

#[tokio::test]
async fn prefers_the_least_mutated_matching_plant() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![
            InventoryItem::plant("plain", "Carrot", &[]),
            InventoryItem::plant("gold-wet", "Carrot", &["Gold", "Wet"]),
            InventoryItem::plant("gold", "Carrot", &["Gold"]),
        ]),
    );
    let draft = garden(&[(0, TileObject::plant("Carrot", &["Gold"]))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert_eq!(
        remote.sent(),
        vec![GameCommand::PlantGardenPlant {
            slot: 0,
            item_id: "gold".to_string()
        }]
    );
}

#[tokio::test]
async fn mutated_demand_claims_its_item_before_plain_demand() {
    let live = garden(&[(9, grown("Carrot", &[]))]);
    let inventory = InventorySnapshot::new(vec![InventoryItem::plant("gold", "Carrot", &["Gold"]), pots(5)]);
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::plant("Carrot", &["Gold"])),
    ]);
    let norm = Normalizer::new();
    let summary = requirements::requirement_summary(&draft, &live, &inventory, &norm);
    assert!(requirements::missing_items(&summary).is_empty());

    let remote = MemoryRemote::new(live, inventory);
    let report = apply(&remote, &draft, &options(20)).await;

    assert!(report.converged());
    assert_eq!(
        remote.sent(),
        vec![
            GameCommand::PlantGardenPlant {
                slot: 1,
                item_id: "gold".to_string()
            },
            GameCommand::PotPlant { slot: 9 },
            GameCommand::PlantGardenPlant {
                slot: 0,
                item_id: "potted-1".to_string()
            },
        ]
    );
    let live = remote.garden();
    assert!(matches!(
        live.object(TileRef::dirt(1)),
        Some(TileObject::Plant(p)) if p.slots[0].mutations == vec!["Gold".to_string()]
    ));
    assert!(live.object(TileRef::dirt(0)).is_some());
    assert!(live.object(TileRef::dirt(9)).is_none());
}

#[tokio::test]
async fn boardwalk_plants_are_not_targets() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::plant("c1", "Carrot", &[])]),
    );
    let mut draft = GardenState::default();
    draft
        .boardwalk_tile_objects
        .insert(0, TileObject::plant("Carrot", &[]));

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert_eq!(report.passes, 1);
    assert!(remote.sent().is_empty());
}

#[tokio::test]
async fn refused_placement_is_retried_after_cooldown_then_abandoned() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![
            InventoryItem::plant("c1", "Carrot", &[]),
            InventoryItem::plant("c2", "Carrot", &[]),
        ]),
    )
    .refusing_plants_on(3);
    let draft = garden(&[
        (3, TileObject::plant("Carrot", &[])),
        (4, TileObject::plant("Carrot", &[])),
    ]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    let attempts: Vec<_> = remote
        .sent()
        .into_iter()
        .filter(|c| matches!(c, GameCommand::PlantGardenPlant { slot: 3, .. }))
        .collect();
    assert_eq!(attempts.len(), MAX_PLACEMENT_ATTEMPTS as usize);
    // The released item is offered again on every retry.
    assert!(attempts
        .iter()
        .all(|c| matches!(c, GameCommand::PlantGardenPlant { item_id, .. } if item_id == "c1")));
    // One placement pass, then a retry each time the cooldown runs out.
    let cooldown = PLANT_COOLDOWN_PASSES as usize;
    assert_eq!(report.passes, 1 + cooldown * MAX_PLACEMENT_ATTEMPTS as usize);
    assert_eq!(report.abandoned_tiles, vec![TileRef::dirt(3)]);
    let gave_up: Vec<_> = report
        .notices
        .iter()
        .filter(|n| n.message.contains("Gave up on Dirt #3"))
        .collect();
    assert_eq!(gave_up.len(), 1);
    assert!(remote.garden().object(TileRef::dirt(4)).is_some());
}

#[tokio::test]
async fn refuses_to_start_without_enough_planter_pots() {
    let remote = MemoryRemote::new(
        garden(&[(0, grown("Tomato", &[]))]),
        InventorySnapshot::new(vec![InventoryItem::plant("c1", "Carrot", &[])]),
    );
    let draft = garden(&[(0, TileObject::plant("Carrot", &[]))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert_eq!(
        report.outcome,
        ApplyOutcome::InsufficientPlanterPots { needed: 1, owned: 0 }
    );
    assert!(!report.succeeded());
    assert!(remote.sent().is_empty());
    assert_eq!(report.notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn full_inventory_halts_plant_moves_and_warns_once() {
    let mut inventory = InventorySnapshot::new(vec![pots(1), InventoryItem::plant("c1", "Carrot", &[])]);
    inventory.capacity = 2;
    let remote = MemoryRemote::new(garden(&[(0, grown("Tomato", &[]))]), inventory);
    let draft = garden(&[(0, TileObject::plant("Carrot", &[]))]);

    let report = apply(&remote, &draft, &options(3)).await;

    assert_eq!(report.outcome, ApplyOutcome::PassLimit);
    assert!(remote.sent().is_empty());
    let full = report
        .notices
        .iter()
        .filter(|n| n.message.starts_with("Inventory is full"))
        .count();
    assert_eq!(full, 1);
}

#[tokio::test]
async fn cancelled_run_sends_nothing() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::plant("x1", "Carrot", &[])]),
    );
    let draft = garden(&[(0, TileObject::plant("Carrot", &[]))]);
    let opts = ApplyOptions::instant();
    opts.cancel.cancel();

    let report = apply(&remote, &draft, &opts).await;

    assert_eq!(report.outcome, ApplyOutcome::Cancelled);
    assert!(!report.succeeded());
    assert!(remote.sent().is_empty());
}

#[tokio::test]
async fn lagging_remote_does_not_double_plant() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![
            InventoryItem::plant("c1", "Carrot", &[]),
            InventoryItem::plant("c2", "Carrot", &[]),
        ]),
    )
    .with_read_lag(3);
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::plant("Carrot", &[])),
    ]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert_eq!(remote.sent().len(), 2);
    assert!(remote.rejected().is_empty());
}

#[tokio::test]
async fn moves_a_decor_from_elsewhere_in_the_garden() {
    let remote = MemoryRemote::new(garden(&[(4, TileObject::decor("Bench"))]), InventorySnapshot::default());
    let draft = garden(&[(0, TileObject::decor("Bench"))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert_eq!(
        remote.sent(),
        vec![
            GameCommand::PickupDecor {
                tile_type: TileType::Dirt,
                local_tile_index: 4
            },
            GameCommand::PlaceDecor {
                tile_type: TileType::Dirt,
                local_tile_index: 0,
                decor_id: "Bench".to_string(),
                rotation: 0
            },
        ]
    );
}

#[tokio::test]
async fn places_boardwalk_decor_with_rotation() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::decor("Lantern", 2)]),
    );
    let mut draft = GardenState::default();
    draft.boardwalk_tile_objects.insert(
        2,
        TileObject::Decor(DecorObject {
            decor_id: "Lantern".to_string(),
            rotation: 90,
        }),
    );

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert!(report.converged());
    assert_eq!(
        remote.sent(),
        vec![GameCommand::PlaceDecor {
            tile_type: TileType::Boardwalk,
            local_tile_index: 2,
            decor_id: "Lantern".to_string(),
            rotation: 90
        }]
    );
}

#[tokio::test]
async fn failed_send_falls_back_to_direct_overwrite() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::decor("Bench", 1)]),
    )
    .failing_sends();
    let draft = garden(&[(0, TileObject::decor("Bench"))]);

    let mut opts = ApplyOptions::instant();
    let report = apply(&remote, &draft, &opts).await;
    assert!(matches!(report.outcome, ApplyOutcome::Failed { .. }));
    assert!(remote.garden().object(TileRef::dirt(0)).is_none());

    opts.allow_fallback = true;
    let report = apply(&remote, &draft, &opts).await;
    assert!(matches!(report.outcome, ApplyOutcome::FallbackOverwrite { .. }));
    assert!(!report.succeeded());
    assert!(matches!(
        remote.garden().object(TileRef::dirt(0)),
        Some(TileObject::Decor(d)) if d.decor_id == "Bench"
    ));
}

#[tokio::test]
async fn missing_garden_ends_the_run() {
    let remote = MemoryRemote::new(GardenState::default(), InventorySnapshot::default()).without_garden();
    let draft = garden(&[(0, TileObject::decor("Bench"))]);

    let report = apply(&remote, &draft, &ApplyOptions::instant()).await;

    assert_eq!(report.outcome, ApplyOutcome::GardenUnavailable);
    assert!(!report.succeeded());
}

#[tokio::test]
async fn service_asks_to_clear_occupied_tiles() {
    let live = garden(&(0..7).map(|i| (i, grown("Tomato", &[]))).collect::<Vec<_>>());
    let remote = MemoryRemote::new(live, InventorySnapshot::default());
    let svc = service(remote, "clear-first");
    let draft = garden(&(0..7).map(|i| (i, TileObject::decor("Bench"))).collect::<Vec<_>>());

    let result = svc.apply_garden(&draft, ApplyGardenOptions::default()).await;

    assert!(!result.success);
    assert_eq!(result.blocking_tiles.len(), 7);
    assert_eq!(
        result.notices[0].message,
        "Clear these tiles first: Dirt #0, Dirt #1, Dirt #2, Dirt #3, Dirt #4, +2 more"
    );
    assert!(svc.remote().sent().is_empty());
}

#[tokio::test]
async fn service_clear_mode_runs_the_loop_around_eggs() {
    let live = garden(&[(0, grown("Tomato", &[])), (1, TileObject::egg("CommonEgg"))]);
    let remote = MemoryRemote::new(
        live,
        InventorySnapshot::new(vec![InventoryItem::plant("c1", "Carrot", &[]), pots(1)]),
    );
    let svc = service(remote, "clear-mode");
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::plant("Carrot", &[])),
    ]);
    let opts = ApplyGardenOptions {
        clear_target_tiles: true,
        ..Default::default()
    };

    let result = svc.apply_garden(&draft, opts).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.blocking_tiles, vec![TileRef::dirt(1)]);
    let sent = svc.remote().sent();
    assert!(sent.iter().all(|c| c.target() != (TileType::Dirt, 1)));
    assert_eq!(sent[0], GameCommand::PotPlant { slot: 0 });
    assert!(!svc.cancel_apply());
}

#[tokio::test]
async fn service_limits_bound_the_apply_loop() {
    let remote = MemoryRemote::new(
        garden(&[(5, TileObject::decor("Bench"))]),
        InventorySnapshot::default(),
    );
    let limits = ApplyLimits {
        max_passes: 3,
        ..ApplyLimits::default()
    };
    let svc = service(remote, "limits").with_limits(limits);
    let draft = garden(&[(5, TileObject::decor("Lantern"))]);
    let opts = ApplyGardenOptions {
        clear_target_tiles: true,
        ..Default::default()
    };

    let result = svc.apply_garden(&draft, opts).await;

    let report = result.report.expect("loop ran");
    assert_eq!(report.outcome, ApplyOutcome::PassLimit);
    assert_eq!(report.passes, 3);
    assert_eq!(svc.remote().sent().len(), 1);
}

#[tokio::test]
async fn service_plain_apply_places_decor_but_not_plants() {
    let remote = MemoryRemote::new(
        GardenState::default(),
        InventorySnapshot::new(vec![InventoryItem::decor("Bench", 1)]),
    );
    let svc = service(remote, "plain");

    let decor_only = garden(&[(0, TileObject::decor("Bench"))]);
    let result = svc.apply_garden(&decor_only, ApplyGardenOptions::default()).await;
    assert!(result.success);
    assert_eq!(svc.remote().sent().len(), 1);

    let with_plant = garden(&[(1, TileObject::plant("Carrot", &[]))]);
    let result = svc.apply_garden(&with_plant, ApplyGardenOptions::default()).await;
    assert!(!result.success);
    assert_eq!(
        result.report.map(|r| r.outcome),
        Some(ApplyOutcome::PlantsRequireClearing)
    );
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].key, "Carrot");
}

#[tokio::test]
async fn service_ignore_inventory_writes_directly() {
    let remote = MemoryRemote::new(garden(&[(9, TileObject::egg("CommonEgg"))]), InventorySnapshot::default());
    let svc = service(remote, "overwrite");
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &["Gold"])),
        (9, TileObject::decor("Bench")),
    ]);
    let opts = ApplyGardenOptions {
        ignore_inventory: true,
        ..Default::default()
    };

    // The egg under tile 9 blocks a plain apply.
    let blocked = svc.apply_garden(&draft, opts).await;
    assert!(!blocked.success);

    let mut draft = draft;
    draft.tile_objects.remove(&9);
    let result = svc.apply_garden(&draft, opts).await;
    assert!(result.success);
    assert!(svc.remote().sent().is_empty());
    let live = svc.remote().garden();
    assert!(matches!(live.object(TileRef::dirt(0)), Some(TileObject::Plant(p)) if p.species == "Carrot"));
    assert!(live.object(TileRef::dirt(9)).is_some_and(TileObject::is_egg));
}

#[tokio::test]
async fn preview_restores_the_exact_snapshot() {
    let original = garden(&[(0, grown("Tomato", &[]))]);
    let remote = MemoryRemote::new(original.clone(), InventorySnapshot::default());
    let svc = service(remote, "preview");
    let draft = garden(&[(1, TileObject::decor("Bench"))]);

    assert!(svc.preview_garden(&draft).await.success);
    assert!(svc.preview_active().await);
    assert!(svc.remote().garden().object(TileRef::dirt(1)).is_some());
    assert!(!svc.preview_garden(&draft).await.success);

    assert!(svc.clear_preview().await.success);
    assert!(!svc.preview_active().await);
    assert_eq!(svc.remote().garden(), original);
    assert!(!svc.clear_preview().await.success);
}

#[tokio::test]
async fn service_plans_requirements_and_pots() {
    let live = garden(&[(0, grown("Tomato", &[])), (5, grown("Carrot", &["Gold"]))]);
    let remote = MemoryRemote::new(
        live,
        InventorySnapshot::new(vec![InventoryItem::plant("c1", "Carrot", &[]), pots(1)]),
    );
    let svc = service(remote, "plan");
    let draft = garden(&[
        (0, TileObject::plant("Carrot", &[])),
        (1, TileObject::plant("Carrot", &["Gold"])),
        (2, TileObject::plant("Carrot", &["Gold"])),
    ]);

    let pots = svc.get_planter_pot_requirement(&draft).await;
    assert_eq!(pots.needed, 2);
    assert_eq!(pots.owned, 1);
    assert_eq!(pots.shortfall(), 1);

    let missing = svc.get_missing_items(&draft).await;
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].mutations, vec!["Gold".to_string()]);
    assert_eq!(missing[0].missing(), 1);
}

#[tokio::test]
async fn service_inverts_with_fallback_geometry() {
    let remote = MemoryRemote::new(GardenState::default(), InventorySnapshot::default());
    let svc = service(remote, "invert");
    let draft = garden(&[(0, TileObject::decor("Bench"))]);

    let inverted = svc.invert_layout(&draft, Some(TileType::Dirt)).await;

    assert!(inverted.object(TileRef::dirt(0)).is_none());
    assert!(inverted.object(TileRef::dirt(19)).is_some());
}

#[test]
fn library_save_rename_update_delete() {
    let library = temp_library("crud");
    let rev0 = library.rev().unwrap();

    let a = library.save("  Front yard ", &garden(&[(0, TileObject::egg("CommonEgg"))])).unwrap();
    assert_eq!(a.name, "Front yard");
    assert!(a.garden.tile_objects.is_empty());
    let b = library.save("Back", &GardenState::default()).unwrap();
    assert_eq!(
        library.list().unwrap().iter().map(|l| l.id.clone()).collect::<Vec<_>>(),
        vec![b.id.clone(), a.id.clone()]
    );

    let renamed = library.rename(&a.id, "Porch").unwrap();
    assert_eq!(renamed.name, "Porch");
    assert_eq!(library.list().unwrap()[1].name, "Porch");

    let updated = library.update(&a.id, &garden(&[(2, TileObject::decor("Bench"))])).unwrap();
    assert_eq!(updated.garden.tile_objects.len(), 1);
    assert_eq!(library.list().unwrap()[0].id, a.id);

    assert!(library.delete(&b.id).unwrap());
    assert!(!library.delete(&b.id).unwrap());
    assert_eq!(library.list().unwrap().len(), 1);
    assert!(library.rev().unwrap() >= rev0 + 5);
}

#[test]
fn library_rejects_bad_names() {
    let library = temp_library("names");
    let layout = library.save("ok", &GardenState::default()).unwrap();

    let err = library.rename(&layout.id, "   ").unwrap_err();
    assert_eq!(err.downcast_ref::<LayoutError>(), Some(&LayoutError::EmptyName));
    let err = library.rename(&layout.id, &"x".repeat(65)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<LayoutError>(),
        Some(&LayoutError::NameTooLong { max: 64 })
    );
    let err = library.rename("missing", "name").unwrap_err();
    assert!(matches!(err.downcast_ref::<LayoutError>(), Some(LayoutError::NotFound(_))));
}

#[test]
fn library_caps_saved_layouts() {
    let library = temp_library("cap");
    for i in 0..55 {
        library.save(&format!("layout {i}"), &GardenState::default()).unwrap();
    }
    let layouts = library.list().unwrap();
    assert_eq!(layouts.len(), 50);
    assert_eq!(layouts[0].name, "layout 54");
    assert_eq!(layouts[49].name, "layout 5");
}

#[test]
fn library_export_import_round_trip() {
    let source = temp_library("export");
    let kept = source.save("kept", &garden(&[(1, TileObject::plant("carrot seed", &["golden"]))])).unwrap();
    source.save("skipped", &GardenState::default()).unwrap();
    let json = source.export(Some(&[kept.id.clone()])).unwrap();

    let target = temp_library("import");
    let imported = target.import(&json).unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].id, kept.id);
    assert_eq!(imported[0].garden, kept.garden);

    // Same file again: the id collides and is replaced.
    let again = target.import(&json).unwrap();
    assert_ne!(again[0].id, kept.id);
    assert_eq!(target.list().unwrap().len(), 2);
}

#[test]
fn library_import_is_lenient_but_validates() {
    let library = temp_library("lenient");
    let imported = library
        .import(r#"[{"name":"no id","garden":{"tileObjects":{"0":{"objectType":"decor","decorId":"Bench","rotation":0}}}},{"name":"no garden"}]"#)
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert!(imported[0].id.starts_with("layout-"));
    assert!(imported[0].created_at > 0);

    let err = library.import("   ").unwrap_err();
    assert_eq!(err.downcast_ref::<LayoutError>(), Some(&LayoutError::EmptyImport));
    let err = library.import("{nope").unwrap_err();
    assert!(matches!(err.downcast_ref::<LayoutError>(), Some(LayoutError::InvalidJson(_))));
    let err = library.import("[]").unwrap_err();
    assert_eq!(err.downcast_ref::<LayoutError>(), Some(&LayoutError::NoLayouts));
}

#[test]
fn library_migrates_legacy_key_once() {
    let library = temp_library("legacy");
    library::write_legacy(
        &library,
        r#"[{"id":"old-1","name":"Old","createdAt":1700000000000,"garden":{"tileObjects":{},"boardwalkTileObjects":{}}}]"#,
    )
    .unwrap();

    let layouts = library.list().unwrap();
    assert_eq!(layouts.len(), 1);
    assert_eq!(layouts[0].id, "old-1");
    assert_eq!(layouts[0].created_at, 1_700_000_000_000);

    library.delete("old-1").unwrap();
    assert!(library.list().unwrap().is_empty());
}

#[test]
fn service_wraps_layout_errors_as_messages() {
    let svc = service(
        MemoryRemote::new(GardenState::default(), InventorySnapshot::default()),
        "messages",
    );
    let result = svc.save_layout("", &GardenState::default());
    assert!(!result.success);
    assert_eq!(result.message, "layout name cannot be empty");

    let result = svc.import_layouts("not json");
    assert!(!result.success);
    assert!(result.message.starts_with("import payload is not valid JSON"));

    let saved = svc.save_layout("Mine", &GardenState::default());
    assert!(saved.success);
    assert_eq!(svc.list_layouts().len(), 1);
    assert!(svc.delete_layout(&saved.value.unwrap().id).success);
    assert!(!svc.delete_layout("gone").success);
}
