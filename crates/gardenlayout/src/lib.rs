//! Umbrella crate for the Garden Layout Creator: re-exports the engine and
//! protocol crates under a single `garden_layout` name.

pub use garden_layout_engine as engine;
pub use garden_layout_protocol as protocol;
