use std::cell::Cell;
use std::fmt;
use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::ServerMessage;
use crate::session::SessionId;

/// Sender channel for a connected client's writer task
pub type ClientSender = mpsc::Sender<String>;

/// Messages queued for one client before it counts as a failed write
pub const OUTBOX_CAPACITY: usize = 256;

/// Longest display name kept, in characters
pub const MAX_NAME_LEN: usize = 39;

/// Capacity of the per-connection input accumulator, in bytes
pub const MAX_INPUT_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Partially received command or line.
///
/// Never grows past [`MAX_INPUT_LEN`]: input that would overflow it is
/// force-terminated with `\r\n` instead.
#[derive(Debug, Default)]
pub struct InputBuffer {
    buf: BytesMut,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_INPUT_LEN),
        }
    }

    /// Append one keystroke.
    pub fn push_byte(&mut self, byte: u8) {
        if self.buf.len() + 1 < MAX_INPUT_LEN {
            self.buf.put_u8(byte);
        } else {
            self.terminate();
        }
    }

    /// Append a whole chunk as delivered by one read.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if self.buf.len() + chunk.len() < MAX_INPUT_LEN {
            self.buf.put_slice(chunk);
        } else {
            let room = (MAX_INPUT_LEN - 2).saturating_sub(self.buf.len());
            self.buf.put_slice(&chunk[..room.min(chunk.len())]);
            self.terminate();
        }
    }

    fn terminate(&mut self) {
        self.buf.truncate(MAX_INPUT_LEN - 2);
        self.buf.put_slice(b"\r\n");
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Turn raw accumulated input into a display name: cut at the first line
/// terminator, keep at most [`MAX_NAME_LEN`] characters.
pub fn sanitize_name(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|b| *b == b'\r' || *b == b'\n')
        .unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end])
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

/// Chat text with the trailing line terminator removed.
pub fn chat_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// One accepted socket
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub input: InputBuffer,
    pub session: Option<SessionId>,
    /// Most recent opponent, used only for rematch avoidance
    pub last_opponent: Option<ConnectionId>,
    sender: ClientSender,
    /// Set when the outbox overflowed; cleared by [`Connection::take_stalled`]
    stalled: Cell<bool>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: ClientSender) -> Self {
        Self {
            id,
            addr,
            name: None,
            input: InputBuffer::new(),
            session: None,
            last_opponent: None,
            sender,
            stalled: Cell::new(false),
        }
    }

    /// Named and not currently in a session.
    pub fn is_idle(&self) -> bool {
        self.name.is_some() && self.session.is_none()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn send(&self, msg: ServerMessage) {
        match self.sender.try_send(msg.to_string()) {
            Ok(()) => {}
            // Writer task gone means the connection is already on its way out
            Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => self.stalled.set(true),
        }
    }

    /// Whether a message was dropped because the client stopped reading.
    pub fn take_stalled(&self) -> bool {
        self.stalled.replace(false)
    }
}
