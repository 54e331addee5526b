use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use anyhow::Context;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::arena::Arena;
use crate::config::{Config, WriteFailurePolicy};
use crate::connection::{ConnectionId, OUTBOX_CAPACITY};

/// Largest chunk handed to the game from one read
const READ_CHUNK: usize = 254;

/// Reports from the per-connection reader and writer tasks
#[derive(Debug)]
enum Event {
    Input { id: ConnectionId, bytes: Bytes },
    Closed { id: ConnectionId },
    ReadFailed { id: ConnectionId, error: io::Error },
    WriteFailed { id: ConnectionId, error: io::Error },
}

/// What woke the loop up
enum Wake {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Event(Event),
    Idle,
}

/// Bind the listening socket with the configured backlog.
pub fn bind(config: &Config) -> anyhow::Result<TcpListener> {
    let addr = config.addr();
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("failed to bind {addr}"))?;
    let listener = socket.listen(config.backlog)?;
    Ok(listener)
}

/// Run the game loop until accepting fails (or a write fails under
/// [`WriteFailurePolicy::Abort`]).
///
/// Every wake-up handles the client events already queued at that moment,
/// then runs one matchmaking pass, one resolver pass and the fairness
/// rotation.
pub async fn run(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    let mut arena = Arena::with_seed(config.seed);
    let mut readers: HashMap<ConnectionId, JoinHandle<()>> = HashMap::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
    let idle = config.idle_timeout();

    loop {
        let wake = tokio::select! {
            accepted = listener.accept() => Wake::Accepted(accepted),
            Some(event) = events_rx.recv() => Wake::Event(event),
            _ = tokio::time::sleep(idle) => Wake::Idle,
        };

        match wake {
            Wake::Accepted(accepted) => {
                let (stream, addr) = accepted.context("accept failed")?;
                info!("a new client is connecting from {}", addr);
                let (read_half, write_half) = stream.into_split();

                // Channel for sending messages to this client
                let (tx, rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
                let id = arena.connect(addr, tx);

                tokio::spawn(write_loop(id, write_half, rx, events_tx.clone()));
                let reader = tokio::spawn(read_loop(id, read_half, events_tx.clone()));
                readers.insert(id, reader);
            }
            Wake::Event(event) => {
                handle_event(&mut arena, &mut readers, event, config.on_write_failure)?;
            }
            Wake::Idle => {
                info!("No response from clients in {} seconds", idle.as_secs());
                continue;
            }
        }

        let ready = events_rx.len();
        drain_ready(&mut arena, &mut readers, &mut events_rx, ready, config.on_write_failure)?;

        arena.tick();
        report_stalled(&mut arena, &mut readers, config.on_write_failure)?;
    }
}

/// Handle at most `budget` queued events so that a client flooding input
/// cannot hold off the tick.
fn drain_ready(
    arena: &mut Arena,
    readers: &mut HashMap<ConnectionId, JoinHandle<()>>,
    events_rx: &mut mpsc::UnboundedReceiver<Event>,
    budget: usize,
    policy: WriteFailurePolicy,
) -> anyhow::Result<()> {
    for _ in 0..budget {
        let Ok(event) = events_rx.try_recv() else {
            break;
        };
        handle_event(arena, readers, event, policy)?;
    }
    Ok(())
}

/// Clients whose outbox overflowed are treated as failed writes.
fn report_stalled(
    arena: &mut Arena,
    readers: &mut HashMap<ConnectionId, JoinHandle<()>>,
    policy: WriteFailurePolicy,
) -> anyhow::Result<()> {
    for id in arena.take_stalled() {
        let error = io::Error::new(io::ErrorKind::WouldBlock, "outbox full");
        handle_event(arena, readers, Event::WriteFailed { id, error }, policy)?;
    }
    Ok(())
}

fn handle_event(
    arena: &mut Arena,
    readers: &mut HashMap<ConnectionId, JoinHandle<()>>,
    event: Event,
    policy: WriteFailurePolicy,
) -> anyhow::Result<()> {
    match event {
        Event::Input { id, bytes } => arena.receive(id, &bytes),
        Event::Closed { id } => {
            info!("Disconnect from {}", id);
            drop_connection(arena, readers, id);
        }
        Event::ReadFailed { id, error } => {
            warn!("Read from {} failed: {}", id, error);
            drop_connection(arena, readers, id);
        }
        Event::WriteFailed { id, error } => {
            if arena.connection(id).is_none() {
                debug!("Write to departed client {} failed: {}", id, error);
                return Ok(());
            }
            error!("Write to {} failed: {}", id, error);
            if policy == WriteFailurePolicy::Abort {
                return Err(anyhow::Error::new(error).context(format!("write to client {id} failed")));
            }
            drop_connection(arena, readers, id);
        }
    }
    Ok(())
}

fn drop_connection(
    arena: &mut Arena,
    readers: &mut HashMap<ConnectionId, JoinHandle<()>>,
    id: ConnectionId,
) {
    arena.disconnect(id);
    if let Some(reader) = readers.remove(&id) {
        reader.abort();
    }
}

async fn read_loop(id: ConnectionId, mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<Event>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => Event::Closed { id },
            Ok(n) => Event::Input {
                id,
                bytes: Bytes::copy_from_slice(&buf[..n]),
            },
            Err(error) => Event::ReadFailed { id, error },
        };
        let last = !matches!(event, Event::Input { .. });
        if events.send(event).is_err() || last {
            break;
        }
    }
}

/// Forward queued messages to the socket. Ends once the client's sender is
/// dropped, which happens when the connection is removed from the arena.
async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<Event>,
) {
    while let Some(text) = outbox.recv().await {
        if let Err(error) = writer.write_all(text.as_bytes()).await {
            let _ = events.send(Event::WriteFailed { id, error });
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    struct Fixture {
        arena: Arena,
        readers: HashMap<ConnectionId, JoinHandle<()>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arena: Arena::with_seed(Some(12)),
                readers: HashMap::new(),
            }
        }

        fn join(&mut self, port: u16, capacity: usize) -> (ConnectionId, mpsc::Receiver<String>) {
            let (tx, rx) = mpsc::channel(capacity);
            let id = self.arena.connect(SocketAddr::from(([127, 0, 0, 1], port)), tx);
            (id, rx)
        }

        fn handle(&mut self, event: Event, policy: WriteFailurePolicy) -> anyhow::Result<()> {
            handle_event(&mut self.arena, &mut self.readers, event, policy)
        }
    }

    fn broken_pipe(id: ConnectionId) -> Event {
        Event::WriteFailed {
            id,
            error: io::Error::from(io::ErrorKind::BrokenPipe),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> String {
        let mut out = String::new();
        while let Ok(msg) = rx.try_recv() {
            out.push_str(&msg);
        }
        out
    }

    #[test]
    fn write_failure_stops_the_server_by_default() {
        let policy = Config::parse_from(["arena-server"]).on_write_failure;
        let mut f = Fixture::new();
        let (id, _rx) = f.join(5001, OUTBOX_CAPACITY);
        assert!(f.handle(broken_pipe(id), policy).is_err());
    }

    #[test]
    fn write_failure_with_disconnect_policy_forfeits() {
        let mut f = Fixture::new();
        let (ana, _ana_rx) = f.join(5001, OUTBOX_CAPACITY);
        let (bo, mut bo_rx) = f.join(5002, OUTBOX_CAPACITY);
        f.arena.receive(ana, b"Ana\r\n");
        f.arena.receive(bo, b"Bo\r\n");
        f.arena.tick();
        assert!(f.arena.session_of(bo).is_some());
        drain(&mut bo_rx);

        f.handle(broken_pipe(ana), WriteFailurePolicy::Disconnect).unwrap();
        assert!(f.arena.connection(ana).is_none());
        assert!(drain(&mut bo_rx).contains("Your opponent is a coward and left the game. You win!"));
        assert!(f.arena.connection(bo).unwrap().session.is_none());
        assert!(f.arena.sessions().is_empty());
    }

    #[test]
    fn write_failure_for_departed_client_is_ignored() {
        let mut f = Fixture::new();
        let (id, _rx) = f.join(5001, OUTBOX_CAPACITY);
        f.handle(Event::Closed { id }, WriteFailurePolicy::Abort).unwrap();
        assert!(f.arena.connection(id).is_none());
        assert!(f.handle(broken_pipe(id), WriteFailurePolicy::Abort).is_ok());
    }

    #[test]
    fn read_failure_drops_only_that_client() {
        let mut f = Fixture::new();
        let (ana, _ana_rx) = f.join(5001, OUTBOX_CAPACITY);
        let (bo, _bo_rx) = f.join(5002, OUTBOX_CAPACITY);
        let error = io::Error::from(io::ErrorKind::ConnectionReset);
        f.handle(Event::ReadFailed { id: ana, error }, WriteFailurePolicy::Abort)
            .unwrap();
        assert!(f.arena.connection(ana).is_none());
        assert!(f.arena.connection(bo).is_some());
    }

    #[test]
    fn drain_stops_at_budget() {
        let mut f = Fixture::new();
        let (id, _rx) = f.join(5001, OUTBOX_CAPACITY);
        let (tx, mut rx) = mpsc::unbounded_channel();
        for b in b"Ana" {
            tx.send(Event::Input {
                id,
                bytes: Bytes::copy_from_slice(&[*b]),
            })
            .unwrap();
        }

        drain_ready(&mut f.arena, &mut f.readers, &mut rx, 2, WriteFailurePolicy::Abort).unwrap();
        assert_eq!(rx.len(), 1);
        assert_eq!(f.arena.connection(id).unwrap().input.as_bytes(), b"An");
    }

    #[test]
    fn stalled_client_follows_write_failure_policy() {
        let mut f = Fixture::new();
        // the name prompt alone fills this outbox
        let (id, _rx) = f.join(5001, 1);
        f.arena.receive(id, b"Ana\r\n");
        report_stalled(&mut f.arena, &mut f.readers, WriteFailurePolicy::Disconnect).unwrap();
        assert!(f.arena.connection(id).is_none());

        let (id, _rx) = f.join(5002, 1);
        f.arena.receive(id, b"Bo\r\n");
        assert!(report_stalled(&mut f.arena, &mut f.readers, WriteFailurePolicy::Abort).is_err());
    }
}
