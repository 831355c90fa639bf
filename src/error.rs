//! Error reporting for heap operations.

/// The error type for heap operations.
///
/// Every failure is local and observable in the return value; nothing is
/// retried internally and nothing panics across the public boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No free slab was available to service the allocation.
    OutOfCapacity,
    /// The requested size exceeds the per-slab maximum.
    TooLarge,
    /// The address is not inside the reservation, or is not the header
    /// address of any slab.
    NotOwned,
    /// The slab is not in the state the operation requires. State is
    /// left unchanged.
    WrongState,
    /// Reserving or protecting the backing region failed during
    /// construction.
    Reservation,
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfCapacity => f.write_str("no free slab available"),
            Self::TooLarge => f.write_str("requested size exceeds the per-slab maximum"),
            Self::NotOwned => f.write_str("address is not owned by this heap"),
            Self::WrongState => f.write_str("slab is not in the required state"),
            Self::Reservation => f.write_str("failed to reserve or protect the backing region"),
        }
    }
}

impl std::error::Error for HeapError {}
