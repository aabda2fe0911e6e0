use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

/// Stable identity of a connected viewer, independent of any transport
/// object. Assigned once at registration and never reused.
pub type ConnectionId = u64;

/// Registry of live viewer connections.
///
/// Each connection owns an unbounded outbound channel, so sequential
/// broadcasts reach every viewer in invocation order. The registry holds
/// nothing beyond membership; viewers are forgotten the moment they close.
#[derive(Default)]
pub struct BroadcastHub {
    next_id: ConnectionId,
    connections: BTreeMap<ConnectionId, mpsc::UnboundedSender<String>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer and return its identity.
    pub fn connect(&mut self, sender: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, sender);
        debug!(connection = id, viewers = self.connections.len(), "viewer connected");
        id
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            debug!(connection = id, viewers = self.connections.len(), "viewer disconnected");
        }
    }

    /// Deliver `message` to every registered connection.
    ///
    /// A failed delivery closes and deregisters only that connection; the
    /// remaining viewers still receive the message exactly once.
    pub fn broadcast(&mut self, message: &str) {
        let mut dead: Vec<ConnectionId> = Vec::new();
        for (&id, sender) in &self.connections {
            if sender.send(message.to_string()).is_err() {
                debug!(connection = id, "dropping viewer after failed delivery");
                dead.push(id);
            }
        }
        for id in dead {
            self.connections.remove(&id);
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.connections.len()
    }
}

/// Hub handle shared between the server tasks. Mutated only inside short
/// non-yielding sections, so a plain mutex is enough.
pub type SharedHub = Arc<Mutex<BroadcastHub>>;

pub fn shared() -> SharedHub {
    Arc::new(Mutex::new(BroadcastHub::new()))
}
