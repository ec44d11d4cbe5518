use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::race::RaceSnapshot;

// ---------------------------------------------
// OUTGOING MESSAGE ENVELOPE
// ---------------------------------------------
#[derive(Serialize)]
struct SnapshotMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    race: &'a RaceSnapshot,
}

pub struct ClientSession {
    pub tx: UnboundedSender<String>,
    pub driver_id: Option<usize>,
}

/// Connected clients and which race driver each one controls.
pub struct SharedGameState {
    pub tick: u64,
    pub clients: HashMap<Uuid, ClientSession>,
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, ClientSession { tx, driver_id: None });
        id
    }

    pub fn bind_driver(&mut self, client: Uuid, driver_id: usize) {
        if let Some(session) = self.clients.get_mut(&client) {
            session.driver_id = Some(driver_id);
        }
    }

    pub fn driver_for(&self, client: &Uuid) -> Option<usize> {
        self.clients.get(client).and_then(|s| s.driver_id)
    }

    /// Forgets the client and returns the driver it controlled, if any.
    pub fn remove_client(&mut self, client: &Uuid) -> Option<usize> {
        self.clients.remove(client).and_then(|s| s.driver_id)
    }

    pub fn send_to(&self, client: &Uuid, text: String) {
        if let Some(session) = self.clients.get(client) {
            let _ = session.tx.send(text);
        }
    }

    /// Serialise the race once and fan it out; closed channels are pruned.
    pub fn broadcast_snapshot(&mut self, race: &RaceSnapshot) {
        self.tick = race.tick;
        let json = match serde_json::to_string(&SnapshotMessage {
            kind: "snapshot",
            race,
        }) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(%err, "failed to serialise race snapshot");
                return;
            }
        };

        self.clients.retain(|id, session| {
            let alive = session.tx.send(json.clone()).is_ok();
            if !alive {
                tracing::debug!(client = %id, "dropping closed client channel");
            }
            alive
        });
    }
}
