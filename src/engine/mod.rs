mod admission;
mod error;
mod mutations;
mod queries;
mod slots;

pub use error::EngineError;
pub use mutations::{BookingReceipt, BookingRequest, NewTour, TourPatch};
pub use slots::{admits, candidate_starts, day_decision, DayEntry, SharePolicy};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::pricing::PricingConfig;
use crate::wal::Wal;

pub type SharedTourState = Arc<RwLock<TourState>>;
pub type SharedDayState = Arc<RwLock<DayState>>;

/// Embedder-supplied knobs. Defaults preserve the historical behavior:
/// shared dates, groups of five get ten percent off.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pricing: PricingConfig,
    pub share_policy: SharePolicy,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    /// Catalog: tour id → tour.
    pub(super) tours: DashMap<Ulid, SharedTourState>,
    /// Ledger: calendar date → every instance scheduled that day. The
    /// per-date write lock is what serializes competing bookings.
    pub(super) days: DashMap<NaiveDate, SharedDayState>,
    /// Blackout calendar.
    pub(super) holidays: DashMap<NaiveDate, Holiday>,
    /// Confirmed orders by id.
    pub(super) orders: DashMap<Ulid, Order>,
    /// Reverse lookup: instance id → the date it runs on.
    pub(super) instance_to_date: DashMap<Ulid, NaiveDate>,
    /// Reverse lookup: confirmation reference → order id.
    pub(super) reference_to_order: DashMap<String, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this for read across WAL append and apply; compaction
    /// holds it for write from snapshot through rewrite ack. An acked event
    /// is either captured in the snapshot or appended to the rewritten log.
    pub(super) compact_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub(super) config: EngineConfig,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            tours: DashMap::new(),
            days: DashMap::new(),
            holidays: DashMap::new(),
            orders: DashMap::new(),
            instance_to_date: DashMap::new(),
            reference_to_order: DashMap::new(),
            wal_tx,
            compact_gate: RwLock::new(()),
            notify,
            config,
        };

        // Replay events — nothing else holds these Arcs yet, so try_write
        // always succeeds instantly. Never use blocking_write here because
        // this runs inside an async context.
        for event in &events {
            match event {
                Event::TourCreated {
                    id,
                    name,
                    kind,
                    base_price_cents,
                    min_party,
                    max_party,
                    earliest_start,
                    latest_start,
                    duration_min,
                    buffer_min,
                } => {
                    let tour = TourState {
                        id: *id,
                        name: name.clone(),
                        kind: *kind,
                        base_price_cents: *base_price_cents,
                        min_party: *min_party,
                        max_party: *max_party,
                        earliest_start: *earliest_start,
                        latest_start: *latest_start,
                        duration_min: *duration_min,
                        buffer_min: *buffer_min,
                        active: true,
                    };
                    engine.tours.insert(*id, Arc::new(RwLock::new(tour)));
                }
                Event::TourUpdated {
                    id,
                    name,
                    base_price_cents,
                    min_party,
                    max_party,
                    earliest_start,
                    latest_start,
                    duration_min,
                    buffer_min,
                } => {
                    if let Some(entry) = engine.tours.get(id) {
                        let arc = entry.clone();
                        let mut tour = arc.try_write().expect("replay: uncontended write");
                        tour.name = name.clone();
                        tour.base_price_cents = *base_price_cents;
                        tour.min_party = *min_party;
                        tour.max_party = *max_party;
                        tour.earliest_start = *earliest_start;
                        tour.latest_start = *latest_start;
                        tour.duration_min = *duration_min;
                        tour.buffer_min = *buffer_min;
                    }
                }
                Event::TourRetired { id } => {
                    if let Some(entry) = engine.tours.get(id) {
                        let arc = entry.clone();
                        let mut tour = arc.try_write().expect("replay: uncontended write");
                        tour.active = false;
                    }
                }
                Event::HolidayAdded { date, label } => {
                    engine.holidays.insert(
                        *date,
                        Holiday {
                            date: *date,
                            label: label.clone(),
                        },
                    );
                }
                Event::HolidayRemoved { date } => {
                    engine.holidays.remove(date);
                }
                Event::InstanceOpened { date, .. } => {
                    let day = engine.day_or_default(*date);
                    let mut guard = day.try_write().expect("replay: uncontended write");
                    engine.apply_to_day(&mut guard, *date, event);
                }
                Event::BookingRecorded { instance_id, .. } => {
                    if let Some(date) = engine.date_of_instance(instance_id)
                        && let Some(entry) = engine.days.get(&date)
                    {
                        let arc = entry.clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        engine.apply_to_day(&mut guard, date, event);
                    }
                }
            }
        }

        // Replayed tours never pass through create_tour, so the active-tours
        // gauge starts from the rebuilt catalog.
        let active = engine
            .tours
            .iter()
            .filter(|e| e.value().try_read().expect("replay: uncontended read").active)
            .count();
        metrics::gauge!(crate::observability::TOURS_ACTIVE).set(active as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_tour(&self, id: &Ulid) -> Option<SharedTourState> {
        self.tours.get(id).map(|e| e.value().clone())
    }

    /// The date an instance runs on, if the instance exists.
    pub(super) fn date_of_instance(&self, instance_id: &Ulid) -> Option<NaiveDate> {
        self.instance_to_date.get(instance_id).map(|e| *e.value())
    }

    /// Day ledger for reads; `None` means nothing was ever scheduled there.
    pub(super) fn day_get(&self, date: NaiveDate) -> Option<SharedDayState> {
        self.days.get(&date).map(|e| e.value().clone())
    }

    /// Day ledger for the booking path, created empty on first touch.
    pub(super) fn day_or_default(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::default())))
            .clone()
    }

    /// Apply a day-scoped event to a held `DayState` — no locking here, the
    /// caller holds the day's write lock. Keeps the secondary indexes in step.
    pub(super) fn apply_to_day(&self, day: &mut DayState, date: NaiveDate, event: &Event) {
        match event {
            Event::InstanceOpened {
                id, tour_id, start, ..
            } => {
                day.insert(InstanceState {
                    id: *id,
                    tour_id: *tour_id,
                    start: *start,
                    booked: 0,
                });
                self.instance_to_date.insert(*id, date);
            }
            Event::BookingRecorded {
                id,
                reference,
                instance_id,
                party,
                total_cents,
                label,
            } => {
                if let Some(inst) = day.get_mut(instance_id) {
                    inst.booked += party;
                    self.orders.insert(
                        *id,
                        Order {
                            id: *id,
                            reference: reference.clone(),
                            instance_id: *instance_id,
                            tour_id: inst.tour_id,
                            date,
                            start: inst.start,
                            party: *party,
                            total_cents: *total_cents,
                            label: label.clone(),
                        },
                    );
                    self.reference_to_order.insert(reference.clone(), *id);
                }
            }
            _ => {}
        }
    }

    /// Join a day's instances with their owning tours' current attributes,
    /// in `(start, id)` order. The caller passes the day guard it already
    /// holds; tour read locks nest inside day locks, never the other way.
    pub(super) async fn day_entries(&self, day: &DayState) -> Vec<slots::DayEntry> {
        let mut entries = Vec::with_capacity(day.instances.len());
        for inst in &day.instances {
            if let Some(tour) = self.get_tour(&inst.tour_id) {
                let t = tour.read().await;
                entries.push(slots::DayEntry {
                    instance_id: inst.id,
                    tour_id: inst.tour_id,
                    kind: t.kind,
                    start: inst.start,
                    booked: inst.booked,
                    capacity: t.max_party,
                    window_radius: t.window_radius(),
                });
            }
        }
        entries
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }
}
