use thiserror::Error;

/// Input the layout library refuses. Shown to the player as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout name cannot be empty")]
    EmptyName,
    #[error("layout name is longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("no layout with id {0}")]
    NotFound(String),
    #[error("import payload is empty")]
    EmptyImport,
    #[error("import payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("import payload holds no layouts")]
    NoLayouts,
}
