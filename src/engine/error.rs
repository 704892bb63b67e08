use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    TourNotFound(Ulid),
    TourExists(Ulid),
    /// The tour exists but was retired from the catalog.
    TourRetired(Ulid),
    OrderNotFound(Ulid),
    HolidayNotFound(NaiveDate),
    /// A holiday already blacks out this date.
    HolidayExists(NaiveDate),
    /// The requested start is not offered for this tour on this date.
    SlotUnavailable { date: NaiveDate, start: NaiveTime },
    /// Party below the tour's minimum.
    PartyTooSmall { min: u32 },
    /// Not enough seats left on the target instance.
    CapacityExceeded { remaining: u32 },
    LimitExceeded(&'static str),
    WalError(String),
    /// The WAL writer has shut down; no further mutations are accepted.
    ShuttingDown,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::TourNotFound(id) => write!(f, "tour not found: {id}"),
            EngineError::TourExists(id) => write!(f, "tour already exists: {id}"),
            EngineError::TourRetired(id) => write!(f, "tour retired: {id}"),
            EngineError::OrderNotFound(id) => write!(f, "order not found: {id}"),
            EngineError::HolidayNotFound(date) => write!(f, "no holiday on: {date}"),
            EngineError::HolidayExists(date) => write!(f, "holiday already set: {date}"),
            EngineError::SlotUnavailable { date, start } => {
                write!(f, "slot not available: {date} {start}")
            }
            EngineError::PartyTooSmall { min } => {
                write!(f, "party below tour minimum of {min}")
            }
            EngineError::CapacityExceeded { remaining } => {
                write!(f, "capacity exceeded: only {remaining} seats left")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::ShuttingDown => write!(f, "engine is shutting down"),
        }
    }
}

impl std::error::Error for EngineError {}
