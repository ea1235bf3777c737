use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for record changes, one channel per hall.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes for a hall. Creates the channel if needed.
    pub fn subscribe(&self, hall: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(hall.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(event.hall()) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn listeners(&self, hall: &str) -> usize {
        self.channels
            .get(hall)
            .map_or(0, |s| s.receiver_count())
    }
}
