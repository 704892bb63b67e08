use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole minutes since midnight — the engine's working unit for slot math.
///
/// Collision windows may extend past midnight in either direction, so the
/// type stays signed and unclamped; only candidates are day-bounded.
pub type Min = i64;

/// Grid step between bookable start times.
pub const SLOT_STEP_MIN: Min = 30;

/// Pause carved around an instance when its tour declares none.
pub const DEFAULT_BUFFER_MIN: Min = 60;

pub fn minutes_of(t: NaiveTime) -> Min {
    t.hour() as Min * 60 + t.minute() as Min
}

/// Format a slot the way bookings address it: `HH:MM:SS`.
pub fn fmt_hms(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Scheduling class of a tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TourKind {
    /// Shares its dates; neighbours are kept apart by buffer windows only.
    Standard,
    /// Owns its date: one instance per calendar day, no other tour runs.
    Exclusive,
}

impl TourKind {
    pub fn is_exclusive(self) -> bool {
        matches!(self, TourKind::Exclusive)
    }
}

#[derive(Debug, Clone)]
pub struct TourState {
    pub id: Ulid,
    pub name: String,
    pub kind: TourKind,
    pub base_price_cents: i64,
    /// Smallest party a single order may bring.
    pub min_party: u32,
    /// Attendant capacity of every instance of this tour.
    pub max_party: u32,
    /// First bookable start of the day.
    pub earliest_start: NaiveTime,
    /// Last bookable start of the day (inclusive when grid-aligned).
    pub latest_start: NaiveTime,
    pub duration_min: Min,
    /// Pause around each instance; `None` falls back to [`DEFAULT_BUFFER_MIN`].
    pub buffer_min: Option<Min>,
    pub active: bool,
}

impl TourState {
    pub fn buffer(&self) -> Min {
        self.buffer_min.unwrap_or(DEFAULT_BUFFER_MIN)
    }

    /// Half-width of the exclusion window around each of this tour's instances.
    pub fn window_radius(&self) -> Min {
        self.duration_min + self.buffer()
    }
}

/// One scheduled run of a tour. Created by the first booking that lands on
/// its start time; never deleted, `booked` only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceState {
    pub id: Ulid,
    pub tour_id: Ulid,
    pub start: NaiveTime,
    pub booked: u32,
}

/// Every instance scheduled on one calendar date, across all tours.
#[derive(Debug, Default)]
pub struct DayState {
    /// Sorted by `(start, id)`; collision windows are consulted in exactly
    /// this order, which makes contested candidates deterministic.
    pub instances: Vec<InstanceState>,
}

impl DayState {
    /// Insert keeping the `(start, id)` order.
    pub fn insert(&mut self, inst: InstanceState) {
        let pos = self
            .instances
            .partition_point(|i| (minutes_of(i.start), i.id) < (minutes_of(inst.start), inst.id));
        self.instances.insert(pos, inst);
    }

    pub fn get(&self, id: &Ulid) -> Option<&InstanceState> {
        self.instances.iter().find(|i| &i.id == id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut InstanceState> {
        self.instances.iter_mut().find(|i| &i.id == id)
    }

    /// The instance a booking for `(tour, start)` would join, if any.
    pub fn instance_at(&self, tour_id: Ulid, start: NaiveTime) -> Option<&InstanceState> {
        self.instances
            .iter()
            .find(|i| i.tour_id == tour_id && i.start == start)
    }

    pub fn of_tour(&self, tour_id: Ulid) -> impl Iterator<Item = &InstanceState> {
        self.instances.iter().filter(move |i| i.tour_id == tour_id)
    }
}

#[derive(Debug, Clone)]
pub struct Holiday {
    pub date: NaiveDate,
    pub label: String,
}

/// A confirmed booking. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Ulid,
    /// Customer-facing confirmation code, `VND-YYYYMMDD-XXXXXX`.
    pub reference: String,
    pub instance_id: Ulid,
    pub tour_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub party: u32,
    pub total_cents: i64,
    pub label: Option<String>,
}

/// Confirmation reference in the shape tickets are issued under:
/// `VND-` + the tour date + six characters of ulid randomness.
pub fn booking_reference(date: NaiveDate) -> String {
    let id = Ulid::new().to_string();
    format!("VND-{}-{}", date.format("%Y%m%d"), &id[id.len() - 6..])
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TourCreated {
        id: Ulid,
        name: String,
        kind: TourKind,
        base_price_cents: i64,
        min_party: u32,
        max_party: u32,
        earliest_start: NaiveTime,
        latest_start: NaiveTime,
        duration_min: Min,
        buffer_min: Option<Min>,
    },
    TourUpdated {
        id: Ulid,
        name: String,
        base_price_cents: i64,
        min_party: u32,
        max_party: u32,
        earliest_start: NaiveTime,
        latest_start: NaiveTime,
        duration_min: Min,
        buffer_min: Option<Min>,
    },
    TourRetired {
        id: Ulid,
    },
    HolidayAdded {
        date: NaiveDate,
        label: String,
    },
    HolidayRemoved {
        date: NaiveDate,
    },
    InstanceOpened {
        id: Ulid,
        tour_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
    },
    BookingRecorded {
        id: Ulid,
        reference: String,
        instance_id: Ulid,
        party: u32,
        total_cents: i64,
        label: Option<String>,
    },
}

// ── Availability outcome ─────────────────────────────────────────

/// Why a day offers nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Blacked out by the holiday calendar.
    Holiday,
    /// An exclusive instance of another tour owns the date.
    DayLocked,
    /// The day's exclusive instance of this tour has no seats left.
    FullyBooked,
    /// Candidates were generated but none survived the collision filter.
    NoCapacity,
}

/// Outcome of a slot query for one `(tour, date)`.
///
/// Serializes tagged for consumers that want the reason; `slot_times`
/// flattens to the legacy shape — a bare list of `HH:MM:SS` strings,
/// empty whenever the day is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayAvailability {
    Open { slots: Vec<NaiveTime> },
    Unavailable { reason: UnavailableReason },
}

impl DayAvailability {
    pub fn slots(&self) -> &[NaiveTime] {
        match self {
            DayAvailability::Open { slots } => slots,
            DayAvailability::Unavailable { .. } => &[],
        }
    }

    pub fn slot_times(&self) -> Vec<String> {
        self.slots().iter().copied().map(fmt_hms).collect()
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DayAvailability::Open { .. })
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourInfo {
    pub id: Ulid,
    pub name: String,
    pub kind: TourKind,
    pub base_price_cents: i64,
    pub min_party: u32,
    pub max_party: u32,
    pub earliest_start: NaiveTime,
    pub latest_start: NaiveTime,
    pub duration_min: Min,
    pub buffer_min: Option<Min>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: Ulid,
    pub tour_id: Ulid,
    pub kind: TourKind,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub booked: u32,
    pub capacity: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayInfo {
    pub date: NaiveDate,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInfo {
    pub id: Ulid,
    pub reference: String,
    pub instance_id: Ulid,
    pub tour_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub party: u32,
    pub total_cents: i64,
    pub label: Option<String>,
}
