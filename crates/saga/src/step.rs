//! Steps of the order placement saga.

/// The steps of a placement, in execution order.
///
/// ```text
/// Pricing ──► Reservation ──► IdAssignment ──► Persist ──► CartCleanup
///                  ▲                │              │
///                  └─ Compensation ◄┴──────────────┘
/// ```
///
/// `Persist` is the point of no return. A failure at `IdAssignment` or
/// `Persist` runs `Compensation` (stock release) before the error is
/// returned. `CartCleanup` is best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementStep {
    Pricing,
    Reservation,
    IdAssignment,
    Persist,
    Compensation,
    CartCleanup,
}

impl PlacementStep {
    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStep::Pricing => "pricing",
            PlacementStep::Reservation => "reserve_stock",
            PlacementStep::IdAssignment => "assign_order_id",
            PlacementStep::Persist => "persist_order",
            PlacementStep::Compensation => "release_stock",
            PlacementStep::CartCleanup => "clear_cart",
        }
    }
}

impl std::fmt::Display for PlacementStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
