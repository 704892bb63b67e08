//! Read-side operations. Queries take day and tour read locks only and
//! never touch the WAL. An availability answer is advisory: seats can be
//! taken between the query and the booking, which is why `book` runs the
//! same admission checks again under the day's write lock.

use std::time::Instant;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::observability::{availability_label, SLOT_QUERIES_TOTAL, SLOT_QUERY_DURATION_SECONDS};
use crate::pricing::{self, Quote};

use super::admission;
use super::slots::day_decision;
use super::{Engine, EngineError};

impl Engine {
    /// The bookable start times for one tour on one date.
    ///
    /// An unknown or retired tour is an error, never an empty day: an
    /// empty slot list always means the calendar itself said no.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        tour_id: Ulid,
    ) -> Result<DayAvailability, EngineError> {
        let started = Instant::now();
        let result = self.available_slots_inner(date, tour_id).await;
        if let Ok(outcome) = &result {
            metrics::counter!(SLOT_QUERIES_TOTAL, "outcome" => availability_label(outcome))
                .increment(1);
        }
        metrics::histogram!(SLOT_QUERY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    async fn available_slots_inner(
        &self,
        date: NaiveDate,
        tour_id: Ulid,
    ) -> Result<DayAvailability, EngineError> {
        let tour_arc = self
            .get_tour(&tour_id)
            .ok_or(EngineError::TourNotFound(tour_id))?;
        let tour = tour_arc.read().await.clone();
        if !tour.active {
            return Err(EngineError::TourRetired(tour_id));
        }

        let entries = match self.day_get(date) {
            Some(day_arc) => {
                let day = day_arc.read().await;
                self.day_entries(&day).await
            }
            None => Vec::new(),
        };

        Ok(day_decision(
            &tour,
            &entries,
            self.is_holiday(date),
            self.config.share_policy,
        ))
    }

    /// Every instance on a date, across tours, in start order.
    pub async fn day_schedule(&self, date: NaiveDate) -> Vec<InstanceInfo> {
        let Some(day_arc) = self.day_get(date) else {
            return Vec::new();
        };
        let day = day_arc.read().await;

        let mut out = Vec::with_capacity(day.instances.len());
        for inst in &day.instances {
            let Some(tour_arc) = self.get_tour(&inst.tour_id) else {
                continue;
            };
            let tour = tour_arc.read().await;
            out.push(instance_info(inst, &tour, date));
        }
        out
    }

    /// Instances of one tour on one date, in start order.
    pub async fn tour_schedule(
        &self,
        tour_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<InstanceInfo>, EngineError> {
        let tour_arc = self
            .get_tour(&tour_id)
            .ok_or(EngineError::TourNotFound(tour_id))?;
        let tour = tour_arc.read().await.clone();

        let Some(day_arc) = self.day_get(date) else {
            return Ok(Vec::new());
        };
        let day = day_arc.read().await;
        Ok(day
            .of_tour(tour_id)
            .map(|inst| instance_info(inst, &tour, date))
            .collect())
    }

    /// The whole catalog, retired tours included, in id order.
    pub async fn list_tours(&self) -> Vec<TourInfo> {
        let arcs: Vec<_> = self.tours.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for arc in arcs {
            let t = arc.read().await;
            out.push(tour_info(&t));
        }
        out.sort_by_key(|t| t.id);
        out
    }

    pub async fn get_tour_info(&self, id: Ulid) -> Result<TourInfo, EngineError> {
        let arc = self.get_tour(&id).ok_or(EngineError::TourNotFound(id))?;
        let t = arc.read().await;
        Ok(tour_info(&t))
    }

    pub fn list_holidays(&self) -> Vec<HolidayInfo> {
        let mut out: Vec<HolidayInfo> = self
            .holidays
            .iter()
            .map(|e| HolidayInfo {
                date: e.value().date,
                label: e.value().label.clone(),
            })
            .collect();
        out.sort_by_key(|h| h.date);
        out
    }

    pub fn get_order(&self, id: &Ulid) -> Result<OrderInfo, EngineError> {
        self.orders
            .get(id)
            .map(|e| order_info(e.value()))
            .ok_or(EngineError::OrderNotFound(*id))
    }

    /// Look up an order by its customer-facing confirmation reference.
    pub fn find_order(&self, reference: &str) -> Option<OrderInfo> {
        let id = *self.reference_to_order.get(reference)?.value();
        self.orders.get(&id).map(|e| order_info(e.value()))
    }

    /// Price a party on a tour without touching the calendar.
    pub async fn quote(&self, tour_id: Ulid, party: u32) -> Result<Quote, EngineError> {
        let tour_arc = self
            .get_tour(&tour_id)
            .ok_or(EngineError::TourNotFound(tour_id))?;
        let tour = tour_arc.read().await;
        if !tour.active {
            return Err(EngineError::TourRetired(tour_id));
        }
        admission::validate_party(&tour, party)?;
        if party > tour.max_party {
            return Err(EngineError::CapacityExceeded {
                remaining: tour.max_party,
            });
        }

        let total_cents = pricing::price_order(tour.base_price_cents, party, &self.config.pricing);
        Ok(Quote {
            tour_id,
            party,
            base_price_cents: tour.base_price_cents,
            total_cents,
            discounted: pricing::discount_applies(party, &self.config.pricing),
        })
    }
}

fn tour_info(t: &TourState) -> TourInfo {
    TourInfo {
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
        active: t.active,
    }
}

fn instance_info(inst: &InstanceState, tour: &TourState, date: NaiveDate) -> InstanceInfo {
    InstanceInfo {
        id: inst.id,
        tour_id: inst.tour_id,
        kind: tour.kind,
        date,
        start: inst.start,
        booked: inst.booked,
        capacity: tour.max_party,
        remaining: tour.max_party.saturating_sub(inst.booked),
    }
}

fn order_info(o: &Order) -> OrderInfo {
    OrderInfo {
        id: o.id,
        reference: o.reference.clone(),
        instance_id: o.instance_id,
        tour_id: o.tour_id,
        date: o.date,
        start: o.start,
        party: o.party,
        total_cents: o.total_cents,
        label: o.label.clone(),
    }
}
