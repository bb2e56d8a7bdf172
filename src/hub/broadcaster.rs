//! Connection registry and fan-out
//!
//! Every connected viewer owns an unbounded FIFO queue. Publishing takes a
//! snapshot of the target senders and pushes into each, so a connection
//! that disappears mid-publish only costs one failed send.

use crate::hub::events::{ConnectionId, Origin, Scope, ServerEvent};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Receives change events produced by the profile store
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver `event` to `scope`; returns how many connections accepted it
    async fn publish(&self, scope: Scope, event: ServerEvent, origin: &Origin) -> usize;
}

pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

pub struct SyncHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
    groups: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    live: watch::Sender<usize>,
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHub {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            live,
        }
    }

    /// Resolves once no connection is registered
    pub async fn wait_idle(&self) {
        let mut rx = self.live.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Register a new connection. It is greeted with `Connected` and
    /// everyone else hears `ClientConnected`.
    pub async fn connect(&self) -> (ConnectionId, EventReceiver) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ServerEvent::Connected { connection_id: id.clone() });

        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(id.clone(), tx);
            self.live.send_replace(connections.len());
            connections.len()
        };
        info!(connection_id = %id, total, "Client connected");

        let origin = Origin::Connection(id.clone());
        self.publish(
            Scope::Others,
            ServerEvent::ClientConnected { connection_id: id.clone() },
            &origin,
        )
        .await;

        (id, rx)
    }

    /// Forget a connection and its group memberships
    pub async fn disconnect(&self, id: &str) {
        let removed = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(id).is_some();
            self.live.send_replace(connections.len());
            removed
        };
        {
            let mut groups = self.groups.write().await;
            for members in groups.values_mut() {
                members.remove(id);
            }
            groups.retain(|_, members| !members.is_empty());
        }

        if removed {
            info!(connection_id = %id, "Client disconnected");
            let origin = Origin::Connection(id.to_string());
            self.publish(
                Scope::Others,
                ServerEvent::ClientDisconnected { connection_id: id.to_string() },
                &origin,
            )
            .await;
        }
    }

    pub async fn join_group(&self, id: &str, group: &str) {
        self.groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(id.to_string());
        debug!(connection_id = %id, group, "Joined group");
    }

    pub async fn leave_group(&self, id: &str, group: &str) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(id);
            if members.is_empty() {
                groups.remove(group);
            }
        }
        debug!(connection_id = %id, group, "Left group");
    }

    /// Send to one connection; `false` when it is gone
    pub async fn send_to(&self, id: &str, event: ServerEvent) -> bool {
        let sender = self.connections.read().await.get(id).cloned();
        match sender {
            Some(tx) => deliver(id, &tx, event),
            None => {
                debug!(connection_id = %id, event = event.name(), "Transport error: unknown connection, event dropped");
                false
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn group_members(&self, group: &str) -> Vec<ConnectionId> {
        let mut members: Vec<_> = self
            .groups
            .read()
            .await
            .get(group)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    async fn targets(
        &self,
        scope: &Scope,
        origin: &Origin,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<ServerEvent>)> {
        let skip = match scope {
            Scope::Everyone => None,
            Scope::Others | Scope::Group(_) => origin.connection_id(),
        };

        let members = match scope {
            Scope::Group(group) => Some(self.groups.read().await.get(group).cloned().unwrap_or_default()),
            _ => None,
        };

        self.connections
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != skip)
            .filter(|(id, _)| members.as_ref().map_or(true, |m| m.contains(*id)))
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect()
    }
}

fn deliver(id: &str, tx: &mpsc::UnboundedSender<ServerEvent>, event: ServerEvent) -> bool {
    let name = event.name();
    match tx.send(event) {
        Ok(()) => true,
        Err(_) => {
            debug!(connection_id = %id, event = name, "Transport error: connection closed, event dropped");
            false
        }
    }
}

#[async_trait]
impl EventSink for SyncHub {
    async fn publish(&self, scope: Scope, event: ServerEvent, origin: &Origin) -> usize {
        let targets = self.targets(&scope, origin).await;
        let mut delivered = 0;
        for (id, tx) in &targets {
            if deliver(id, tx, event.clone()) {
                delivered += 1;
            }
        }
        debug!(event = event.name(), scope = ?scope, delivered, "Event published");
        delivered
    }
}
