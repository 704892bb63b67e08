use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::slots::{day_decision, DayEntry, SharePolicy};
use super::EngineError;

/// Where a booking's seats land: an existing instance or a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Placement {
    Join(Ulid),
    Open,
}

pub(super) fn validate_party(tour: &TourState, party: u32) -> Result<(), EngineError> {
    use crate::limits::*;
    if party == 0 || party > MAX_PARTY {
        return Err(EngineError::LimitExceeded("party size out of range"));
    }
    if party < tour.min_party {
        return Err(EngineError::PartyTooSmall {
            min: tour.min_party,
        });
    }
    Ok(())
}

pub(super) fn validate_label(label: Option<&str>) -> Result<(), EngineError> {
    use crate::limits::*;
    if let Some(l) = label
        && l.len() > MAX_LABEL_LEN
    {
        return Err(EngineError::LimitExceeded("label too long"));
    }
    Ok(())
}

/// Shape checks shared by tour creation and update.
pub(super) fn validate_tour_shape(
    name: &str,
    min_party: u32,
    max_party: u32,
    earliest_start: NaiveTime,
    latest_start: NaiveTime,
    duration_min: Min,
    buffer_min: Option<Min>,
) -> Result<(), EngineError> {
    use crate::limits::*;
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("tour name length"));
    }
    if min_party == 0 || max_party == 0 || min_party > max_party {
        return Err(EngineError::LimitExceeded("party bounds inverted"));
    }
    if max_party > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    if earliest_start > latest_start {
        return Err(EngineError::LimitExceeded("start hours inverted"));
    }
    if duration_min <= 0 || duration_min > MAX_DURATION_MIN {
        return Err(EngineError::LimitExceeded("duration out of range"));
    }
    if let Some(b) = buffer_min
        && !(0..=MAX_BUFFER_MIN).contains(&b)
    {
        return Err(EngineError::LimitExceeded("buffer out of range"));
    }
    Ok(())
}

/// Decide where a booking lands, re-running the slot computation against
/// the snapshot the caller assembled under the day's write lock. The
/// advisory answer a client saw earlier counts for nothing here.
pub(super) fn admit(
    tour: &TourState,
    entries: &[DayEntry],
    is_holiday: bool,
    policy: SharePolicy,
    date: NaiveDate,
    start: NaiveTime,
    party: u32,
) -> Result<Placement, EngineError> {
    let decision = day_decision(tour, entries, is_holiday, policy);
    if !decision.slots().contains(&start) {
        return Err(EngineError::SlotUnavailable { date, start });
    }

    match entries
        .iter()
        .find(|e| e.tour_id == tour.id && e.start == start)
    {
        Some(target) => {
            let remaining = target.capacity.saturating_sub(target.booked);
            if party > remaining {
                return Err(EngineError::CapacityExceeded { remaining });
            }
            Ok(Placement::Join(target.instance_id))
        }
        None => {
            if entries.len() >= crate::limits::MAX_INSTANCES_PER_DAY {
                return Err(EngineError::LimitExceeded("day schedule is full"));
            }
            if party > tour.max_party {
                return Err(EngineError::CapacityExceeded {
                    remaining: tour.max_party,
                });
            }
            Ok(Placement::Open)
        }
    }
}
