use thiserror::Error;

/// Failures a fill operation can surface. Everything else in the operation's
/// error space is either a no-op outcome (no inputs, nothing targeted), a
/// logged fallback (unknown strategy name), or recovered inside the config
/// store (corrupt persisted data).
#[derive(Debug, Error)]
pub enum FillError {
    /// Quantity computation faulted. The operation aborts cleanly; no writes
    /// happen beyond what was already committed.
    #[error("quantity calculation failed: {0}")]
    Calculation(String),

    /// The DOM layer failed underneath us (evaluation error, detached page).
    #[error("page interaction failed: {0}")]
    Page(anyhow::Error),
}

impl FillError {
    pub fn page(err: anyhow::Error) -> Self {
        FillError::Page(err)
    }
}
