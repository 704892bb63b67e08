use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub: one channel per tour, fed with committed events.
///
/// Subscribers see catalog changes and every booking landing on their tour,
/// in commit order. Slow subscribers lag and drop; they never block commits.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a tour. Creates the channel if needed.
    pub fn subscribe(&self, tour_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(tour_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, tour_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&tour_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a tour's channel. Events already sent stay buffered for
    /// existing receivers; once they drain, `recv` reports closed.
    pub fn remove(&self, tour_id: &Ulid) {
        self.channels.remove(tour_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}
