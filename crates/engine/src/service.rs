use crate::config::{ApplyCancel, ApplyLimits, ApplyOptions, ApplyTiming, BLOCKING_TILES_REPORTED};
use crate::error::LayoutError;
use crate::layout::{self, merge_for_overwrite, sanitize_garden};
use crate::library::LayoutLibrary;
use crate::model::{GardenState, SavedLayout, TileObject, TileRef};
use crate::normalize::Normalizer;
use crate::reconcile::{self, ApplyReport};
use crate::remote::{RemoteState, RemoteStore};
use crate::requirements::{self, PlanterPotRequirement, RequirementEntry};
use garden_layout_protocol::{Notice, TileType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};

/// Result of a facade call that the player sees as a toast.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> ActionResult<T> {
    pub fn ok(value: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            value: Some(value),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            value: None,
        }
    }

    /// Layout input errors are shown verbatim; anything else is logged and
    /// replaced by `fallback`.
    fn from_error(err: anyhow::Error, fallback: &str) -> Self {
        match err.downcast_ref::<LayoutError>() {
            Some(layout_err) => Self::fail(layout_err.to_string()),
            None => {
                warn!(target: "garden_layout::service", error = %format!("{err:#}"), "{fallback}");
                Self::fail(fallback)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyGardenOptions {
    /// Pot or pick up whatever sits on a target tile. Runs the full loop.
    pub clear_target_tiles: bool,
    /// Write the draft straight into the garden, skipping the inventory.
    pub ignore_inventory: bool,
    /// On an unexpected error, overwrite the garden directly.
    pub allow_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyGardenResult {
    pub success: bool,
    pub notices: Vec<Notice>,
    pub missing: Vec<RequirementEntry>,
    pub blocking_tiles: Vec<TileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
}

impl ApplyGardenResult {
    fn failed(notice: Notice) -> Self {
        Self {
            success: false,
            notices: vec![notice],
            missing: Vec::new(),
            blocking_tiles: Vec::new(),
            report: None,
        }
    }
}

/// Draft tiles whose live occupant is something else. These need clearing
/// before a plain apply can place anything there.
pub fn blocking_tiles(draft: &GardenState, live: &GardenState, norm: &Normalizer) -> Vec<TileRef> {
    draft
        .active_objects()
        .filter(|(_, want)| !want.is_egg())
        .filter(|(tile, want)| {
            live.object(*tile)
                .is_some_and(|current| !norm.satisfies(Some(current), want))
        })
        .map(|(tile, _)| tile)
        .collect()
}

/// Draft tiles sitting on a live egg. The loop must never touch them.
pub fn egg_tiles(draft: &GardenState, live: &GardenState) -> Vec<TileRef> {
    draft
        .active_objects()
        .filter(|(tile, _)| live.object(*tile).is_some_and(TileObject::is_egg))
        .map(|(tile, _)| tile)
        .collect()
}

fn tile_list(tiles: &[TileRef]) -> String {
    let mut shown: Vec<String> = tiles
        .iter()
        .take(BLOCKING_TILES_REPORTED)
        .map(ToString::to_string)
        .collect();
    if tiles.len() > BLOCKING_TILES_REPORTED {
        shown.push(format!("+{} more", tiles.len() - BLOCKING_TILES_REPORTED));
    }
    shown.join(", ")
}

/// The entry point a UI talks to: layout library, planning queries,
/// preview and apply.
pub struct GardenLayoutService<S> {
    remote: S,
    library: LayoutLibrary,
    norm: Normalizer,
    timing: ApplyTiming,
    limits: ApplyLimits,
    preview: tokio::sync::Mutex<Option<Value>>,
    active_cancel: Mutex<Option<ApplyCancel>>,
}

impl<S: RemoteStore> GardenLayoutService<S> {
    pub fn new(remote: S, library: LayoutLibrary) -> Self {
        Self {
            remote,
            library,
            norm: Normalizer::new(),
            timing: ApplyTiming::default(),
            limits: ApplyLimits::default(),
            preview: tokio::sync::Mutex::new(None),
            active_cancel: Mutex::new(None),
        }
    }

    pub fn with_timing(mut self, timing: ApplyTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_limits(mut self, limits: ApplyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    pub fn library(&self) -> &LayoutLibrary {
        &self.library
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.norm
    }

    fn state(&self) -> RemoteState<'_, S> {
        RemoteState::new(&self.remote, &self.norm)
    }

    pub fn save_layout(&self, name: &str, garden: &GardenState) -> ActionResult<SavedLayout> {
        match self.library.save(name, garden) {
            Ok(layout) => {
                let message = format!("Saved \"{}\"", layout.name);
                ActionResult::ok(layout, message)
            }
            Err(err) => ActionResult::from_error(err, "Could not save layout"),
        }
    }

    /// Saved layouts, most recent first. Empty when storage is unreadable.
    pub fn list_layouts(&self) -> Vec<SavedLayout> {
        self.library.list().unwrap_or_else(|err| {
            warn!(target: "garden_layout::service", error = %format!("{err:#}"), "list layouts");
            Vec::new()
        })
    }

    pub fn get_layout(&self, id: &str) -> Option<SavedLayout> {
        self.list_layouts().into_iter().find(|l| l.id == id)
    }

    pub fn delete_layout(&self, id: &str) -> ActionResult<()> {
        match self.library.delete(id) {
            Ok(true) => ActionResult::ok((), "Layout deleted"),
            Ok(false) => ActionResult::fail(LayoutError::NotFound(id.to_string()).to_string()),
            Err(err) => ActionResult::from_error(err, "Could not delete layout"),
        }
    }

    pub fn rename_layout(&self, id: &str, name: &str) -> ActionResult<SavedLayout> {
        match self.library.rename(id, name) {
            Ok(layout) => {
                let message = format!("Renamed to \"{}\"", layout.name);
                ActionResult::ok(layout, message)
            }
            Err(err) => ActionResult::from_error(err, "Could not rename layout"),
        }
    }

    pub fn update_layout(&self, id: &str, garden: &GardenState) -> ActionResult<SavedLayout> {
        match self.library.update(id, garden) {
            Ok(layout) => {
                let message = format!("Updated \"{}\"", layout.name);
                ActionResult::ok(layout, message)
            }
            Err(err) => ActionResult::from_error(err, "Could not update layout"),
        }
    }

    pub fn export_layouts(&self, ids: Option<&[String]>) -> ActionResult<String> {
        match self.library.export(ids) {
            Ok(json) => ActionResult::ok(json, "Layouts exported"),
            Err(err) => ActionResult::from_error(err, "Could not export layouts"),
        }
    }

    pub fn import_layouts(&self, text: &str) -> ActionResult<Vec<SavedLayout>> {
        match self.library.import(text) {
            Ok(layouts) => {
                let message = match layouts.len() {
                    1 => "Imported 1 layout".to_string(),
                    n => format!("Imported {n} layouts"),
                };
                ActionResult::ok(layouts, message)
            }
            Err(err) => ActionResult::from_error(err, "Could not import layouts"),
        }
    }

    /// Live garden, eggs included, for the editor to start from.
    pub async fn get_current_garden(&self) -> Option<GardenState> {
        self.state().garden().await
    }

    pub async fn get_requirement_summary(&self, draft: &GardenState) -> Vec<RequirementEntry> {
        let draft = sanitize_garden(draft, &self.norm);
        let state = self.state();
        let live = state.garden().await.unwrap_or_default();
        let inventory = state.inventory().await;
        requirements::requirement_summary(&draft, &live, &inventory, &self.norm)
    }

    pub async fn get_missing_items(&self, draft: &GardenState) -> Vec<RequirementEntry> {
        requirements::missing_items(&self.get_requirement_summary(draft).await)
    }

    pub async fn get_planter_pot_requirement(&self, draft: &GardenState) -> PlanterPotRequirement {
        let draft = sanitize_garden(draft, &self.norm);
        let state = self.state();
        let live = state.garden().await.unwrap_or_default();
        let inventory = state.inventory().await;
        PlanterPotRequirement {
            needed: requirements::calculate_planter_pots_needed(&draft, &live, &inventory, &self.norm),
            owned: inventory.planter_pot_charges(),
        }
    }

    /// Mirrors `draft` left-right using the live map geometry.
    pub async fn invert_layout(&self, draft: &GardenState, tile_type: Option<TileType>) -> GardenState {
        let geometry = self.state().geometry().await;
        layout::invert_layout(draft, tile_type, &geometry)
    }

    pub async fn preview_active(&self) -> bool {
        self.preview.lock().await.is_some()
    }

    /// Shows `draft` in the garden without touching the inventory. The
    /// state it replaces is kept for [`Self::clear_preview`].
    pub async fn preview_garden(&self, draft: &GardenState) -> ActionResult<()> {
        let mut preview = self.preview.lock().await;
        if preview.is_some() {
            return ActionResult::fail("A preview is already showing");
        }
        let state = self.state();
        let Some(snapshot) = state.raw_state().await else {
            return ActionResult::fail("Garden is not available");
        };
        let live = state.garden().await.unwrap_or_default();
        let merged = merge_for_overwrite(&live, &sanitize_garden(draft, &self.norm));
        if let Err(err) = state.overwrite_garden(&merged).await {
            return ActionResult::from_error(err, "Could not show preview");
        }
        *preview = Some(snapshot);
        ActionResult::ok((), "Previewing layout")
    }

    pub async fn clear_preview(&self) -> ActionResult<()> {
        let mut preview = self.preview.lock().await;
        let Some(snapshot) = preview.take() else {
            return ActionResult::fail("No preview to clear");
        };
        if let Err(err) = self.state().restore_state(snapshot.clone()).await {
            *preview = Some(snapshot);
            return ActionResult::from_error(err, "Could not clear preview");
        }
        ActionResult::ok((), "Preview cleared")
    }

    /// Trips the token of the run in progress. False when nothing runs.
    pub fn cancel_apply(&self) -> bool {
        let active = self
            .active_cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(token) => {
                token.cancel();
                info!(target: "garden_layout::service", "apply cancel requested");
                true
            }
            None => false,
        }
    }

    fn set_active_cancel(&self, token: Option<ApplyCancel>) {
        *self
            .active_cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn apply_options(&self, allow_fallback: bool, cancel: ApplyCancel) -> ApplyOptions {
        ApplyOptions {
            timing: self.timing,
            limits: self.limits,
            allow_fallback,
            cancel,
        }
    }

    /// Applies `draft` to the live garden.
    ///
    /// Occupied target tiles abort the call unless `clear_target_tiles` is
    /// set, in which case the full convergence loop runs. `ignore_inventory`
    /// writes the draft directly. Otherwise a single forward pass places
    /// decor from the inventory.
    pub async fn apply_garden(&self, draft: &GardenState, opts: ApplyGardenOptions) -> ApplyGardenResult {
        if self.preview_active().await {
            let cleared = self.clear_preview().await;
            if !cleared.success {
                return ApplyGardenResult::failed(Notice::error(cleared.message));
            }
        }

        let draft = sanitize_garden(draft, &self.norm);
        let state = self.state();
        let Some(live) = state.garden().await else {
            return ApplyGardenResult::failed(Notice::error("Garden is not available"));
        };

        let blocking = blocking_tiles(&draft, &live, &self.norm);
        if !opts.clear_target_tiles && !blocking.is_empty() {
            let mut result = ApplyGardenResult::failed(Notice::warning(format!(
                "Clear these tiles first: {}",
                tile_list(&blocking)
            )));
            result.blocking_tiles = blocking;
            return result;
        }

        let mut notices = Vec::new();
        let mut missing = Vec::new();
        if !opts.ignore_inventory {
            let inventory = state.inventory().await;
            let summary = requirements::requirement_summary(&draft, &live, &inventory, &self.norm);
            missing = requirements::missing_items(&summary);
            if !missing.is_empty() {
                let labels: Vec<String> = missing
                    .iter()
                    .map(|e| format!("{}x {}", e.missing(), e.label()))
                    .collect();
                notices.push(Notice::info(format!("Missing: {}", labels.join(", "))));
            }
        }

        let report = if opts.clear_target_tiles {
            let cancel = ApplyCancel::new();
            self.set_active_cancel(Some(cancel.clone()));
            let blocked = egg_tiles(&draft, &live);
            let options = self.apply_options(opts.allow_fallback, cancel);
            let report = reconcile::apply_garden_server_with_potting(
                &self.remote,
                &self.norm,
                &draft,
                &blocked,
                &options,
            )
            .await;
            self.set_active_cancel(None);
            report
        } else if opts.ignore_inventory {
            let merged = merge_for_overwrite(&live, &draft);
            return match state.overwrite_garden(&merged).await {
                Ok(()) => ApplyGardenResult {
                    success: true,
                    notices: vec![Notice::success("Layout written to the garden")],
                    missing,
                    blocking_tiles: blocking,
                    report: None,
                },
                Err(err) => {
                    warn!(target: "garden_layout::service", error = %format!("{err:#}"), "direct overwrite failed");
                    ApplyGardenResult::failed(Notice::error("Could not write the layout"))
                }
            };
        } else {
            let cancel = ApplyCancel::new();
            self.set_active_cancel(Some(cancel.clone()));
            let options = self.apply_options(opts.allow_fallback, cancel);
            let report = reconcile::apply_garden_server(&self.remote, &self.norm, &draft, &options).await;
            self.set_active_cancel(None);
            report
        };

        notices.extend(report.notices.iter().cloned());
        if report.converged() {
            notices.push(Notice::success("Layout applied"));
        } else if report.succeeded() {
            notices.push(Notice::info("Layout applied as far as possible"));
        }
        info!(
            target: "garden_layout::service",
            outcome = ?report.outcome,
            passes = report.passes,
            commands = report.commands_sent,
            "apply finished"
        );
        ApplyGardenResult {
            success: report.succeeded(),
            notices,
            missing,
            blocking_tiles: report.blocked_tiles.clone(),
            report: Some(report),
        }
    }
}
