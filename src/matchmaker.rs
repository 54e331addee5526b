//! Pairs idle, named connections into sessions.
//!
//! At most one session is formed per pass. The first idle connection in scan
//! order is the anchor; the next idle connection that did not just play
//! against it becomes its opponent.

use rand::Rng;
use tracing::info;

use crate::connection::ConnectionId;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionRegistry, SessionRegistry};
use crate::session::{Session, SessionId};

/// Pick the pair for this pass, if any.
pub fn find_pair(connections: &ConnectionRegistry) -> Option<[ConnectionId; 2]> {
    let mut idle = connections.iter().filter(|c| c.is_idle());
    let anchor = idle.next()?.id;
    idle.find(|c| c.last_opponent != Some(anchor))
        .map(|opponent| [anchor, opponent.id])
}

/// Run one matchmaking pass. Returns the id of the created session.
pub fn matchmake<R: Rng>(
    connections: &mut ConnectionRegistry,
    sessions: &mut SessionRegistry,
    next_id: SessionId,
    rng: &mut R,
) -> Option<SessionId> {
    let players = find_pair(connections)?;
    let session = Session::new(next_id, players, rng);

    for (seat, id) in players.iter().enumerate() {
        if let Some(connection) = connections.get_mut(*id) {
            connection.session = Some(session.id);
            connection.last_opponent = Some(players[1 - seat]);
        }
    }
    for (seat, id) in players.iter().enumerate() {
        let opponent = connections.name_of(players[1 - seat]);
        connections.send(*id, ServerMessage::Engage { opponent });
    }

    info!(
        "{} created: {} vs {}",
        session.id,
        connections.name_of(players[0]),
        connections.name_of(players[1])
    );
    let id = session.id;
    sessions.insert(session);
    Some(id)
}
