//! Vendimia: an embeddable availability and booking engine for winery
//! tours. One calendar date is the unit of contention: shared tours
//! carve buffer windows out of a half-hour start grid, exclusive tours
//! take the whole day, and every confirmed seat hits the write-ahead
//! log before anyone hears about it.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod pricing;
pub mod wal;

pub use engine::{
    BookingReceipt, BookingRequest, Engine, EngineConfig, EngineError, NewTour, SharePolicy,
    TourPatch,
};
pub use model::{DayAvailability, TourKind, UnavailableReason};
pub use notify::NotifyHub;
pub use pricing::PricingConfig;
