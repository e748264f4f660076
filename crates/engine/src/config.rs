use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const INTER_TILE_DELAY: Duration = Duration::from_millis(40);
pub const PLACE_DELAY: Duration = Duration::from_millis(60);
pub const PICKUP_DELAY: Duration = Duration::from_millis(80);
pub const POT_CONFIRM_DELAY: Duration = Duration::from_millis(80);
pub const INTER_PASS_DELAY: Duration = Duration::from_millis(140);
pub const RELOCATE_DELAY: Duration = Duration::from_millis(160);
pub const STUCK_PASS_DELAY: Duration = Duration::from_millis(400);

/// Throttling between outgoing commands and passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyTiming {
    pub inter_tile: Duration,
    pub place: Duration,
    pub pickup: Duration,
    pub pot_confirm: Duration,
    pub relocate: Duration,
    pub inter_pass: Duration,
    pub stuck_pass: Duration,
}

impl Default for ApplyTiming {
    fn default() -> Self {
        Self {
            inter_tile: INTER_TILE_DELAY,
            place: PLACE_DELAY,
            pickup: PICKUP_DELAY,
            pot_confirm: POT_CONFIRM_DELAY,
            relocate: RELOCATE_DELAY,
            inter_pass: INTER_PASS_DELAY,
            stuck_pass: STUCK_PASS_DELAY,
        }
    }
}

impl ApplyTiming {
    /// No waiting at all; for tests and simulated remotes.
    pub fn instant() -> Self {
        Self {
            inter_tile: Duration::ZERO,
            place: Duration::ZERO,
            pickup: Duration::ZERO,
            pot_confirm: Duration::ZERO,
            relocate: Duration::ZERO,
            inter_pass: Duration::ZERO,
            stuck_pass: Duration::ZERO,
        }
    }
}

pub const MAX_PASSES: usize = 200;
pub const PLANT_COOLDOWN_PASSES: u32 = 3;
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 4;
pub const POT_CONFIRM_POLLS: usize = 6;
pub const MAX_LAYOUTS: usize = 50;
pub const MAX_GLC_MUTATIONS: usize = 3;
pub const BLOCKING_TILES_REPORTED: usize = 5;
pub const MAX_LAYOUT_NAME_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyLimits {
    pub max_passes: usize,
    pub plant_cooldown_passes: u32,
    pub max_placement_attempts: u32,
    pub pot_confirm_polls: usize,
}

impl Default for ApplyLimits {
    fn default() -> Self {
        Self {
            max_passes: MAX_PASSES,
            plant_cooldown_passes: PLANT_COOLDOWN_PASSES,
            max_placement_attempts: MAX_PLACEMENT_ATTEMPTS,
            pot_confirm_polls: POT_CONFIRM_POLLS,
        }
    }
}

/// Cooperative cancellation for an apply run. Checked before every tile and
/// at pass boundaries; commands already sent are not revoked.
#[derive(Debug, Clone, Default)]
pub struct ApplyCancel(Arc<AtomicBool>);

impl ApplyCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub timing: ApplyTiming,
    pub limits: ApplyLimits,
    /// On an unexpected error, overwrite the garden directly instead.
    pub allow_fallback: bool,
    pub cancel: ApplyCancel,
}

impl ApplyOptions {
    pub fn instant() -> Self {
        Self {
            timing: ApplyTiming::instant(),
            ..Self::default()
        }
    }
}

pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    } else {
        tokio::task::yield_now().await;
    }
}
