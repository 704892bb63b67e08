use chrono::NaiveTime;
use ulid::Ulid;

use crate::model::*;

// ── Slot Algorithm ───────────────────────────────────────────────

/// Slot-relevant view of one instance on the queried date, joined with its
/// owning tour. Callers assemble these under their own locks; everything
/// here is pure.
#[derive(Debug, Clone)]
pub struct DayEntry {
    pub instance_id: Ulid,
    pub tour_id: Ulid,
    pub kind: TourKind,
    pub start: NaiveTime,
    pub booked: u32,
    /// Owning tour's current max party.
    pub capacity: u32,
    /// Owning tour's duration + buffer — half-width of the exclusion window.
    pub window_radius: Min,
}

/// How tours share a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharePolicy {
    /// Standard instances never pre-empt an exclusive tour's date; they
    /// only carve their buffer windows out of its grid.
    #[default]
    Shared,
    /// An exclusive tour offers only completely empty dates.
    ExclusiveDaysAlone,
}

/// Half-hour grid walked from `earliest` to `latest`, both ends included
/// when they land on the step.
pub fn candidate_starts(earliest: NaiveTime, latest: NaiveTime) -> Vec<Min> {
    let last = minutes_of(latest);
    let mut cursor = minutes_of(earliest);
    let mut out = Vec::new();
    while cursor <= last {
        out.push(cursor);
        cursor += SLOT_STEP_MIN;
    }
    out
}

/// Whether `candidate` survives the collision filter for `tour_id`.
///
/// Entries are scanned in `(start, id)` order and the first exclusion
/// window strictly containing the candidate decides: landing exactly on
/// the window's own instance start while it belongs to the requested tour
/// joins that instance (seats permitting); anything else inside a window
/// is rejected. Window edges are open — a candidate exactly on the edge
/// is clear.
pub fn admits(tour_id: Ulid, entries: &[DayEntry], candidate: Min) -> bool {
    for e in entries {
        let center = minutes_of(e.start);
        if candidate <= center - e.window_radius || candidate >= center + e.window_radius {
            continue;
        }
        if candidate == center && e.tour_id == tour_id {
            return e.booked < e.capacity;
        }
        return false;
    }
    true
}

/// Decide what one tour can offer on one date.
///
/// `entries` is every instance scheduled on the date across all tours,
/// ascending by `(start, id)`; `is_holiday` reflects the blackout
/// calendar. The answer is advisory: admission re-runs this under the
/// day's write lock before seats move.
pub fn day_decision(
    tour: &TourState,
    entries: &[DayEntry],
    is_holiday: bool,
    policy: SharePolicy,
) -> DayAvailability {
    if is_holiday {
        return DayAvailability::Unavailable {
            reason: UnavailableReason::Holiday,
        };
    }

    // An exclusive instance anywhere on the date decides the whole day.
    if let Some(excl) = entries.iter().find(|e| e.kind.is_exclusive()) {
        if excl.tour_id == tour.id {
            return if excl.booked < excl.capacity {
                DayAvailability::Open {
                    slots: vec![excl.start],
                }
            } else {
                DayAvailability::Unavailable {
                    reason: UnavailableReason::FullyBooked,
                }
            };
        }
        return DayAvailability::Unavailable {
            reason: UnavailableReason::DayLocked,
        };
    }

    if policy == SharePolicy::ExclusiveDaysAlone && tour.kind.is_exclusive() && !entries.is_empty()
    {
        return DayAvailability::Unavailable {
            reason: UnavailableReason::DayLocked,
        };
    }

    let slots: Vec<NaiveTime> = candidate_starts(tour.earliest_start, tour.latest_start)
        .into_iter()
        .filter(|&c| admits(tour.id, entries, c))
        .map(time_of_minutes)
        .collect();

    if slots.is_empty() {
        return DayAvailability::Unavailable {
            reason: UnavailableReason::NoCapacity,
        };
    }
    DayAvailability::Open { slots }
}

/// Inverse of `minutes_of`; candidates never leave the day.
fn time_of_minutes(m: Min) -> NaiveTime {
    debug_assert!((0..24 * 60).contains(&m), "candidate outside day grid");
    NaiveTime::from_num_seconds_from_midnight_opt(m as u32 * 60, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn tour_with(kind: TourKind, duration_min: Min, buffer_min: Option<Min>) -> TourState {
        TourState {
            id: Ulid::new(),
            name: "test".into(),
            kind,
            base_price_cents: 20_000,
            min_party: 1,
            max_party: 8,
            earliest_start: t(9, 0),
            latest_start: t(18, 0),
            duration_min,
            buffer_min,
            active: true,
        }
    }

    fn standard() -> TourState {
        tour_with(TourKind::Standard, 60, Some(60))
    }

    fn entry(tour: &TourState, start: NaiveTime, booked: u32) -> DayEntry {
        DayEntry {
            instance_id: Ulid::new(),
            tour_id: tour.id,
            kind: tour.kind,
            start,
            booked,
            capacity: tour.max_party,
            window_radius: tour.window_radius(),
        }
    }

    fn grid(avail: &DayAvailability) -> Vec<String> {
        avail.slot_times()
    }

    // ── candidate generation ─────────────────────────────

    #[test]
    fn grid_walks_half_hours_inclusive() {
        let starts = candidate_starts(t(9, 0), t(18, 0));
        assert_eq!(starts.len(), 19);
        assert_eq!(starts[0], 540);
        assert_eq!(*starts.last().unwrap(), 1080);
    }

    #[test]
    fn grid_stops_below_unaligned_latest() {
        let starts = candidate_starts(t(9, 0), t(18, 15));
        assert_eq!(*starts.last().unwrap(), 1080); // 18:00, not 18:15
    }

    #[test]
    fn grid_single_point_when_bounds_meet() {
        assert_eq!(candidate_starts(t(12, 0), t(12, 0)), vec![720]);
    }

    // ── day decision ─────────────────────────────────────

    #[test]
    fn holiday_blacks_out_the_day() {
        let tour = standard();
        let out = day_decision(&tour, &[], true, SharePolicy::Shared);
        assert_eq!(
            out,
            DayAvailability::Unavailable {
                reason: UnavailableReason::Holiday
            }
        );
        assert!(out.slot_times().is_empty());
    }

    #[test]
    fn empty_day_offers_the_full_grid() {
        let tour = standard();
        let out = day_decision(&tour, &[], false, SharePolicy::Shared);
        let slots = grid(&out);
        assert_eq!(slots.len(), 19);
        assert_eq!(slots.first().unwrap(), "09:00:00");
        assert_eq!(slots.last().unwrap(), "18:00:00");
    }

    #[test]
    fn exclusive_instance_owns_the_date() {
        let exclusive = tour_with(TourKind::Exclusive, 240, None);
        let other = standard();
        let entries = vec![entry(&exclusive, t(10, 0), 3)];

        // The owning tour is offered exactly the join slot.
        let own = day_decision(&exclusive, &entries, false, SharePolicy::Shared);
        assert_eq!(grid(&own), vec!["10:00:00"]);

        // Everyone else is locked out.
        let foreign = day_decision(&other, &entries, false, SharePolicy::Shared);
        assert_eq!(
            foreign,
            DayAvailability::Unavailable {
                reason: UnavailableReason::DayLocked
            }
        );
    }

    #[test]
    fn full_exclusive_instance_closes_the_date_for_everyone() {
        let exclusive = tour_with(TourKind::Exclusive, 240, None);
        let other = standard();
        let entries = vec![entry(&exclusive, t(10, 0), exclusive.max_party)];

        let own = day_decision(&exclusive, &entries, false, SharePolicy::Shared);
        assert_eq!(
            own,
            DayAvailability::Unavailable {
                reason: UnavailableReason::FullyBooked
            }
        );
        let foreign = day_decision(&other, &entries, false, SharePolicy::Shared);
        assert!(foreign.slot_times().is_empty());
    }

    #[test]
    fn buffer_window_carves_neighbours_but_keeps_the_join() {
        // Instance at 11:00, duration 60, buffer 60 → open window (09:00, 13:00).
        let tour = standard();
        let entries = vec![entry(&tour, t(11, 0), 2)];

        let out = day_decision(&tour, &entries, false, SharePolicy::Shared);
        let slots = grid(&out);

        // Edges survive, the interior collapses to the join slot.
        assert!(slots.contains(&"09:00:00".to_string()));
        assert!(slots.contains(&"13:00:00".to_string()));
        assert!(slots.contains(&"11:00:00".to_string()));
        for gone in ["09:30:00", "10:00:00", "10:30:00", "11:30:00", "12:00:00", "12:30:00"] {
            assert!(!slots.contains(&gone.to_string()), "{gone} should be carved out");
        }
    }

    #[test]
    fn foreign_window_rejects_even_the_matching_start() {
        let owner = standard();
        let other = standard();
        let entries = vec![entry(&owner, t(11, 0), 2)];

        let out = day_decision(&other, &entries, false, SharePolicy::Shared);
        let slots = grid(&out);
        assert!(!slots.contains(&"11:00:00".to_string()));
        assert!(slots.contains(&"09:00:00".to_string()));
        assert!(slots.contains(&"13:00:00".to_string()));
    }

    #[test]
    fn full_instance_loses_its_join_slot() {
        let tour = standard();
        let entries = vec![entry(&tour, t(11, 0), tour.max_party)];

        let out = day_decision(&tour, &entries, false, SharePolicy::Shared);
        assert!(!grid(&out).contains(&"11:00:00".to_string()));
    }

    #[test]
    fn window_edges_are_open() {
        let tour = standard();
        let entries = vec![entry(&tour, t(11, 0), 0)];
        // radius 120 → window (540, 780) exclusive
        assert!(admits(tour.id, &entries, 540));
        assert!(!admits(tour.id, &entries, 541));
        assert!(!admits(tour.id, &entries, 779));
        assert!(admits(tour.id, &entries, 780));
    }

    #[test]
    fn join_slot_checks_seats() {
        let tour = standard();
        let open = vec![entry(&tour, t(11, 0), tour.max_party - 1)];
        let full = vec![entry(&tour, t(11, 0), tour.max_party)];
        assert!(admits(tour.id, &open, 660));
        assert!(!admits(tour.id, &full, 660));
    }

    #[test]
    fn first_containing_window_decides() {
        // Two instances of the same tour, 10:00 and 11:00, radius 120 each.
        // 11:00 sits inside the 10:00 window, which is scanned first and
        // rejects it — the later join never gets a say.
        let tour = standard();
        let entries = vec![entry(&tour, t(10, 0), 1), entry(&tour, t(11, 0), 1)];
        assert!(!admits(tour.id, &entries, 660));
        // 10:00 itself joins fine.
        assert!(admits(tour.id, &entries, 600));
    }

    #[test]
    fn default_buffer_is_an_hour() {
        let tour = tour_with(TourKind::Standard, 30, None);
        let entries = vec![entry(&tour, t(12, 0), 0)];
        // radius 30 + 60 = 90 → window (10:30, 13:30) exclusive
        assert!(admits(tour.id, &entries, minutes_of(t(10, 30))));
        assert!(!admits(tour.id, &entries, minutes_of(t(11, 0))));
        assert!(!admits(tour.id, &entries, minutes_of(t(13, 0))));
        assert!(admits(tour.id, &entries, minutes_of(t(13, 30))));
    }

    #[test]
    fn crowded_day_can_offer_nothing() {
        // Instances at 09:00 and 16:00 with huge radii cover the whole grid.
        let tour = tour_with(TourKind::Standard, 240, Some(240));
        let entries = vec![
            entry(&tour, t(9, 0), tour.max_party),
            entry(&tour, t(16, 0), tour.max_party),
        ];
        let out = day_decision(&tour, &entries, false, SharePolicy::Shared);
        assert_eq!(
            out,
            DayAvailability::Unavailable {
                reason: UnavailableReason::NoCapacity
            }
        );
    }

    #[test]
    fn exclusive_tour_respects_share_policy() {
        let exclusive = tour_with(TourKind::Exclusive, 240, None);
        let neighbour = standard();
        let entries = vec![entry(&neighbour, t(11, 0), 2)];

        let shared = day_decision(&exclusive, &entries, false, SharePolicy::Shared);
        assert!(shared.is_open(), "shared policy keeps the date open");

        let alone = day_decision(
            &exclusive,
            &entries,
            false,
            SharePolicy::ExclusiveDaysAlone,
        );
        assert_eq!(
            alone,
            DayAvailability::Unavailable {
                reason: UnavailableReason::DayLocked
            }
        );

        // A standard tour is unaffected by the policy.
        let standard_view =
            day_decision(&neighbour, &entries, false, SharePolicy::ExclusiveDaysAlone);
        assert!(standard_view.is_open());
    }

    #[test]
    fn unchanged_state_means_identical_answer() {
        let tour = standard();
        let entries = vec![entry(&tour, t(11, 0), 2), entry(&tour, t(15, 0), 1)];
        let first = day_decision(&tour, &entries, false, SharePolicy::Shared);
        let second = day_decision(&tour, &entries, false, SharePolicy::Shared);
        assert_eq!(first, second);
    }
}
