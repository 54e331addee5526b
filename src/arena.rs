//! Game state owned by the server loop.
//!
//! Everything here is synchronous and single-owner: the loop feeds accepted
//! connections, raw input chunks and disconnects in, then calls [`Arena::tick`]
//! once per wake-up.

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::connection::{ClientSender, Connection, ConnectionId, chat_text, sanitize_name};
use crate::matchmaker;
use crate::protocol::{Command, ServerMessage};
use crate::registry::{ConnectionRegistry, SessionRegistry};
use crate::resolver;
use crate::session::{Mode, Session, SessionId};

pub struct Arena<R = StdRng> {
    connections: ConnectionRegistry,
    sessions: SessionRegistry,
    rng: R,
    next_connection: u64,
    next_session: u64,
}

impl Arena<StdRng> {
    /// Seeded for reproducible play, otherwise seeded from the OS.
    pub fn with_seed(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(rng)
    }
}

impl<R: Rng> Arena<R> {
    pub fn new(rng: R) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            sessions: SessionRegistry::new(),
            rng,
            next_connection: 1,
            next_session: 1,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn session_of(&self, id: ConnectionId) -> Option<&Session> {
        self.connection(id)
            .and_then(|c| c.session)
            .and_then(|s| self.sessions.get(s))
    }

    /// Register a freshly accepted socket and prompt it for a name.
    pub fn connect(&mut self, addr: SocketAddr, sender: ClientSender) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;

        info!("Adding client {} from {}", id, addr);
        let connection = Connection::new(id, addr, sender);
        connection.send(ServerMessage::NamePrompt);
        self.connections.insert(connection);
        id
    }

    /// Feed one read's worth of bytes from `id`.
    pub fn receive(&mut self, id: ConnectionId, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let Some(connection) = self.connections.get_mut(id) else {
            debug!("Dropping input for unknown client {}", id);
            return;
        };

        let keystroke = matches!(chunk, [b] if *b != b'\r' && *b != b'\n');
        if keystroke {
            connection.input.push_byte(chunk[0]);
        } else {
            connection.input.push_chunk(chunk);
        }

        if connection.name.is_none() {
            // Character-at-a-time clients finish their name with a terminator
            if !keystroke {
                self.set_name(id);
            }
            return;
        }

        let session = connection
            .session
            .and_then(|sid| self.sessions.get_mut(sid))
            .filter(|s| s.is_turn_of(id));
        let Some(session) = session else {
            info!("command rejected from {}!", connection.display_name());
            connection.input.clear();
            return;
        };

        match session.mode {
            Mode::WaitingForCommand => {
                match Command::parse(connection.input.as_bytes()) {
                    Some(Command::Attack) => session.mode = Mode::Attacking,
                    Some(Command::Speak) => {
                        session.mode = Mode::Chatting;
                        connection.send(ServerMessage::SpeakPrompt);
                    }
                    Some(Command::PowerMove) if session.power_moves[session.turn] > 0 => {
                        session.mode = Mode::PowerMove;
                    }
                    other => debug!("{} ignored {:?}", connection.display_name(), other),
                }
                connection.input.clear();
            }
            Mode::Chatting if keystroke => {}
            Mode::Chatting => {
                let text = chat_text(connection.input.as_bytes());
                let speaker = connection.display_name().to_string();
                connection.input.clear();
                session.mode = Mode::Resolving;
                let listener = session.waiting();
                self.connections
                    .send(listener, ServerMessage::Chat { speaker, text });
            }
            Mode::Attacking | Mode::PowerMove | Mode::Resolving => connection.input.clear(),
        }
    }

    fn set_name(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(id) else {
            return;
        };
        let name = sanitize_name(connection.input.as_bytes());
        connection.input.clear();
        connection.name = Some(name.clone());
        info!("{} ({}) is now known as {:?}", id, connection.addr, name);

        self.connections
            .broadcast_except(id, &ServerMessage::Arrival { name: name.clone() });
        self.connections.send(id, ServerMessage::Welcome { name });
    }

    /// Remove a connection, tearing down its session with a forfeit win for
    /// the opponent. Returns `false` if `id` was not registered.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(id) else {
            return false;
        };
        info!("Removing client {} {}", id, connection.addr);

        for other in self.connections.iter_mut() {
            if other.last_opponent == Some(id) {
                other.last_opponent = None;
            }
        }

        if let Some(session_id) = connection.session {
            if let Some(session) = self.sessions.remove(session_id) {
                if let Some(opponent) = session.opponent_of(id) {
                    self.connections.send(opponent, ServerMessage::Forfeit);
                    if let Some(opponent) = self.connections.get_mut(opponent) {
                        opponent.session = None;
                    }
                }
                info!("{} abandoned by {}", session_id, connection.display_name());
            }
        }
        true
    }

    /// Connections whose outbox overflowed since the last call.
    pub fn take_stalled(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.take_stalled())
            .map(|c| c.id)
            .collect()
    }

    /// One matchmaking pass, one resolver pass, then the fairness rotation.
    pub fn tick(&mut self) {
        let next = SessionId(self.next_session);
        if matchmaker::matchmake(&mut self.connections, &mut self.sessions, next, &mut self.rng)
            .is_some()
        {
            self.next_session += 1;
        }
        resolver::resolve(&mut self.sessions, &mut self.connections, &mut self.rng);
        self.connections.rotate_head_to_tail();
    }
}
