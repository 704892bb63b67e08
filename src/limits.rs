//! Hard bounds checked before anything reaches the WAL.
//!
//! Mutations validate against these up front so a misbehaving caller can
//! grow neither the in-memory state nor the log without bound.

/// Upper bound on catalog size, active and retired tours together.
pub const MAX_TOURS: usize = 10_000;

/// Longest accepted tour name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Longest accepted booking or holiday label, in bytes.
pub const MAX_LABEL_LEN: usize = 256;

/// Largest party a single order may carry.
pub const MAX_PARTY: u32 = 1_000;

/// Largest per-instance capacity a tour may declare.
pub const MAX_CAPACITY: u32 = 10_000;

/// Highest per-seat price a tour may post, in cents. Keeps every order
/// total (price × party) well inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

/// Most instances one calendar date will hold, across all tours.
pub const MAX_INSTANCES_PER_DAY: usize = 1_024;

/// Upper bound on the holiday calendar.
pub const MAX_HOLIDAYS: usize = 4_096;

/// Longest tour duration, in minutes.
pub const MAX_DURATION_MIN: i64 = 24 * 60;

/// Largest pause a tour may carve around its instances, in minutes.
pub const MAX_BUFFER_MIN: i64 = 24 * 60;
