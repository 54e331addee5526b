use std::collections::VecDeque;

use tracing::warn;

use crate::connection::{Connection, ConnectionId};
use crate::protocol::ServerMessage;
use crate::session::{Session, SessionId};

/// Connected clients in scan order. New clients go to the front; the head
/// is rotated to the tail once per tick.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: VecDeque<Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.push_front(connection);
    }

    /// Unlink a connection. Session teardown is the caller's job.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let Some(pos) = self.connections.iter().position(|c| c.id == id) else {
            warn!("Trying to remove connection {}, but it is not registered", id);
            return None;
        };
        self.connections.remove(pos)
    }

    /// Move the current head to the tail.
    pub fn rotate_head_to_tail(&mut self) {
        if self.connections.len() > 1 {
            self.connections.rotate_left(1);
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn name_of(&self, id: ConnectionId) -> String {
        self.get(id)
            .map(|c| c.display_name().to_string())
            .unwrap_or_default()
    }

    pub fn send(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(connection) = self.get(id) {
            connection.send(msg);
        }
    }

    /// Send to every connection except `exclude`.
    pub fn broadcast_except(&self, exclude: ConnectionId, msg: &ServerMessage) {
        for connection in self.connections.iter().filter(|c| c.id != exclude) {
            connection.send(msg.clone());
        }
    }
}

/// Active sessions, newest first
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: VecDeque<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.push_front(session);
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let Some(pos) = self.sessions.iter().position(|s| s.id == id) else {
            warn!("Trying to remove {}, but it is not registered", id);
            return None;
        };
        self.sessions.remove(pos)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
