//! Application state shared across handlers.

use carbridge_reconcile::Reconciler;

/// Application state shared across all handlers.
///
/// Cheap to clone; the reconciler is reference counted internally.
#[derive(Clone, Debug)]
pub struct AppState {
    reconciler: Reconciler,
}

impl AppState {
    #[must_use]
    pub const fn new(reconciler: Reconciler) -> Self {
        Self { reconciler }
    }

    /// Get a reference to the reconciliation service.
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}
