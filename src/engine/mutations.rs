//! State-changing operations. Every mutation follows the same discipline:
//! validate against in-memory state, append to the WAL and wait for the
//! fsync ack, apply to memory, then notify subscribers. Nothing is
//! observable until it is durable. Append and apply run under the
//! compaction gate, so a log rewrite never interleaves with either.

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    BOOKING_DURATION_SECONDS, BOOKINGS_TOTAL, SEATS_BOOKED_TOTAL, TOURS_ACTIVE,
};
use crate::pricing;

use super::admission::{self, Placement};
use super::{Engine, EngineError, WalCommand};

/// Everything needed to list a new tour in the catalog.
#[derive(Debug, Clone)]
pub struct NewTour {
    pub name: String,
    pub kind: TourKind,
    pub base_price_cents: i64,
    pub min_party: u32,
    pub max_party: u32,
    pub earliest_start: NaiveTime,
    pub latest_start: NaiveTime,
    pub duration_min: Min,
    pub buffer_min: Option<Min>,
}

/// Replacement catalog fields for an existing tour. `kind` is absent on
/// purpose: whether a tour locks its day is fixed at creation, because
/// flipping it would rewrite the meaning of instances already sold.
#[derive(Debug, Clone)]
pub struct TourPatch {
    pub name: String,
    pub base_price_cents: i64,
    pub min_party: u32,
    pub max_party: u32,
    pub earliest_start: NaiveTime,
    pub latest_start: NaiveTime,
    pub duration_min: Min,
    pub buffer_min: Option<Min>,
}

/// A request to seat a party on a tour.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub tour_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub party: u32,
    pub label: Option<String>,
}

/// Issued once a booking is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub order_id: Ulid,
    pub reference: String,
    pub instance_id: Ulid,
    pub tour_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub party: u32,
    pub total_cents: i64,
}

impl Engine {
    // ── Catalog ──────────────────────────────────────────────────────

    pub async fn create_tour(&self, id: Ulid, new: NewTour) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        if self.tours.len() >= MAX_TOURS {
            return Err(EngineError::LimitExceeded("too many tours"));
        }
        if new.base_price_cents < 0 || new.base_price_cents > MAX_PRICE_CENTS {
            return Err(EngineError::LimitExceeded("base price out of range"));
        }
        admission::validate_tour_shape(
            &new.name,
            new.min_party,
            new.max_party,
            new.earliest_start,
            new.latest_start,
            new.duration_min,
            new.buffer_min,
        )?;
        if self.tours.contains_key(&id) {
            return Err(EngineError::TourExists(id));
        }

        let event = Event::TourCreated {
            id,
            name: new.name.clone(),
            kind: new.kind,
            base_price_cents: new.base_price_cents,
            min_party: new.min_party,
            max_party: new.max_party,
            earliest_start: new.earliest_start,
            latest_start: new.latest_start,
            duration_min: new.duration_min,
            buffer_min: new.buffer_min,
        };
        self.wal_append(&event).await?;

        let tour = TourState {
            id,
            name: new.name,
            kind: new.kind,
            base_price_cents: new.base_price_cents,
            min_party: new.min_party,
            max_party: new.max_party,
            earliest_start: new.earliest_start,
            latest_start: new.latest_start,
            duration_min: new.duration_min,
            buffer_min: new.buffer_min,
            active: true,
        };
        self.tours.insert(id, Arc::new(RwLock::new(tour)));
        metrics::gauge!(TOURS_ACTIVE).increment(1.0);
        self.notify.send(id, &event);
        tracing::info!(tour = %id, "tour created");
        Ok(())
    }

    /// Replace a tour's catalog fields. Instances already on the calendar
    /// keep the seats they sold; admission from here on uses the new shape.
    pub async fn update_tour(&self, id: Ulid, patch: TourPatch) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        if patch.base_price_cents < 0 || patch.base_price_cents > MAX_PRICE_CENTS {
            return Err(EngineError::LimitExceeded("base price out of range"));
        }
        admission::validate_tour_shape(
            &patch.name,
            patch.min_party,
            patch.max_party,
            patch.earliest_start,
            patch.latest_start,
            patch.duration_min,
            patch.buffer_min,
        )?;
        let tour_arc = self.get_tour(&id).ok_or(EngineError::TourNotFound(id))?;
        let mut tour = tour_arc.write().await;
        if !tour.active {
            return Err(EngineError::TourRetired(id));
        }

        let event = Event::TourUpdated {
            id,
            name: patch.name.clone(),
            base_price_cents: patch.base_price_cents,
            min_party: patch.min_party,
            max_party: patch.max_party,
            earliest_start: patch.earliest_start,
            latest_start: patch.latest_start,
            duration_min: patch.duration_min,
            buffer_min: patch.buffer_min,
        };
        self.wal_append(&event).await?;

        tour.name = patch.name;
        tour.base_price_cents = patch.base_price_cents;
        tour.min_party = patch.min_party;
        tour.max_party = patch.max_party;
        tour.earliest_start = patch.earliest_start;
        tour.latest_start = patch.latest_start;
        tour.duration_min = patch.duration_min;
        tour.buffer_min = patch.buffer_min;
        drop(tour);

        self.notify.send(id, &event);
        Ok(())
    }

    /// Take a tour off sale. Its instances stay on the calendar and keep
    /// blocking overlapping starts; new bookings and edits are refused.
    pub async fn retire_tour(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let tour_arc = self.get_tour(&id).ok_or(EngineError::TourNotFound(id))?;
        let mut tour = tour_arc.write().await;
        if !tour.active {
            return Err(EngineError::TourRetired(id));
        }

        let event = Event::TourRetired { id };
        self.wal_append(&event).await?;
        tour.active = false;
        drop(tour);

        metrics::gauge!(TOURS_ACTIVE).decrement(1.0);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        tracing::info!(tour = %id, "tour retired");
        Ok(())
    }

    // ── Blackout calendar ────────────────────────────────────────────

    pub async fn add_holiday(&self, date: NaiveDate, label: String) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        if self.holidays.len() >= MAX_HOLIDAYS {
            return Err(EngineError::LimitExceeded("too many holidays"));
        }
        admission::validate_label(Some(&label))?;
        if self.holidays.contains_key(&date) {
            return Err(EngineError::HolidayExists(date));
        }

        let event = Event::HolidayAdded {
            date,
            label: label.clone(),
        };
        self.wal_append(&event).await?;
        self.holidays.insert(date, Holiday { date, label });
        tracing::info!(%date, "holiday added");
        Ok(())
    }

    pub async fn remove_holiday(&self, date: NaiveDate) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        if !self.holidays.contains_key(&date) {
            return Err(EngineError::HolidayNotFound(date));
        }
        let event = Event::HolidayRemoved { date };
        self.wal_append(&event).await?;
        self.holidays.remove(&date);
        tracing::info!(%date, "holiday removed");
        Ok(())
    }

    // ── Booking ──────────────────────────────────────────────────────

    /// Seat a party on a tour. The day's write lock is held from the
    /// admission check through WAL ack and apply, so two requests racing
    /// for the same date cannot both take the last seat.
    pub async fn book(&self, req: BookingRequest) -> Result<BookingReceipt, EngineError> {
        let started = Instant::now();
        let result = self.book_locked(&req).await;
        let outcome = if result.is_ok() { "confirmed" } else { "refused" };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(BOOKING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    async fn book_locked(&self, req: &BookingRequest) -> Result<BookingReceipt, EngineError> {
        let _gate = self.compact_gate.read().await;
        admission::validate_label(req.label.as_deref())?;
        let tour_arc = self
            .get_tour(&req.tour_id)
            .ok_or(EngineError::TourNotFound(req.tour_id))?;

        // Lock order: compact gate, then day, then tour, everywhere.
        let day_arc = self.day_or_default(req.date);
        let mut day = day_arc.write().await;

        let tour = tour_arc.read().await.clone();
        if !tour.active {
            return Err(EngineError::TourRetired(tour.id));
        }
        admission::validate_party(&tour, req.party)?;

        let entries = self.day_entries(&day).await;
        let placement = admission::admit(
            &tour,
            &entries,
            self.is_holiday(req.date),
            self.config.share_policy,
            req.date,
            req.start,
            req.party,
        )?;

        let total_cents =
            pricing::price_order(tour.base_price_cents, req.party, &self.config.pricing);

        let instance_id = match placement {
            Placement::Join(instance_id) => instance_id,
            Placement::Open => {
                let instance_id = Ulid::new();
                let event = Event::InstanceOpened {
                    id: instance_id,
                    tour_id: tour.id,
                    date: req.date,
                    start: req.start,
                };
                self.wal_append(&event).await?;
                self.apply_to_day(&mut day, req.date, &event);
                self.notify.send(tour.id, &event);
                instance_id
            }
        };

        let order_id = Ulid::new();
        let reference = booking_reference(req.date);
        let event = Event::BookingRecorded {
            id: order_id,
            reference: reference.clone(),
            instance_id,
            party: req.party,
            total_cents,
            label: req.label.clone(),
        };
        self.wal_append(&event).await?;
        self.apply_to_day(&mut day, req.date, &event);
        self.notify.send(tour.id, &event);

        metrics::counter!(SEATS_BOOKED_TOTAL).increment(u64::from(req.party));
        tracing::info!(
            order = %order_id,
            tour = %tour.id,
            date = %req.date,
            start = %fmt_hms(req.start),
            party = req.party,
            "booking confirmed"
        );

        Ok(BookingReceipt {
            order_id,
            reference,
            instance_id,
            tour_id: tour.id,
            date: req.date,
            start: req.start,
            party: req.party,
            total_cents,
        })
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Rewrite the WAL as the minimal event sequence that rebuilds the
    /// current state: blackout days, the catalog, every scheduled
    /// instance, then one record per confirmed order. Mutations wait while
    /// the snapshot is assembled and the rewrite is acknowledged.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Hold off mutations until the rewrite is acked — an event appended
        // to the old log after this snapshot would vanish with it.
        let _gate = self.compact_gate.write().await;
        let mut events = Vec::new();

        let mut holidays: Vec<Holiday> =
            self.holidays.iter().map(|e| e.value().clone()).collect();
        holidays.sort_by_key(|h| h.date);
        for h in holidays {
            events.push(Event::HolidayAdded {
                date: h.date,
                label: h.label,
            });
        }

        let mut tour_ids: Vec<Ulid> = self.tours.iter().map(|e| *e.key()).collect();
        tour_ids.sort();
        for id in tour_ids {
            let Some(arc) = self.get_tour(&id) else { continue };
            let t = arc.read().await;
            events.push(Event::TourCreated {
                id: t.id,
                name: t.name.clone(),
                kind: t.kind,
                base_price_cents: t.base_price_cents,
                min_party: t.min_party,
                max_party: t.max_party,
                earliest_start: t.earliest_start,
                latest_start: t.latest_start,
                duration_min: t.duration_min,
                buffer_min: t.buffer_min,
            });
            if !t.active {
                events.push(Event::TourRetired { id: t.id });
            }
        }

        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        for date in dates {
            let Some(arc) = self.day_get(date) else { continue };
            let day = arc.read().await;
            for inst in &day.instances {
                events.push(Event::InstanceOpened {
                    id: inst.id,
                    tour_id: inst.tour_id,
                    date,
                    start: inst.start,
                });
            }
        }

        // Orders rebuild the booked counters on replay.
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        orders.sort_by_key(|o| o.id);
        for o in orders {
            events.push(Event::BookingRecorded {
                id: o.id,
                reference: o.reference,
                instance_id: o.instance_id,
                party: o.party,
                total_cents: o.total_cents,
                label: o.label,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        tracing::info!("wal compacted");
        Ok(())
    }

    /// Appends recorded since the last compaction. Callers use this to
    /// decide when a compaction pass is worth the rewrite.
    pub async fn wal_appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }
}
