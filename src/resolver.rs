//! Advances every session by one step according to its mode.

use rand::Rng;
use tracing::{debug, info};

use crate::protocol::ServerMessage;
use crate::registry::{ConnectionRegistry, SessionRegistry};
use crate::session::{Mode, Session, SessionId};

fn roll_damage<R: Rng>(rng: &mut R) -> i32 {
    rng.random_range(2..=6)
}

fn apply_hit(session: &mut Session, connections: &ConnectionRegistry, damage: i32) {
    let target = session.other();
    session.hitpoints[target] -= damage;
    connections.send(
        session.acting(),
        ServerMessage::HitDealt {
            target: connections.name_of(session.waiting()),
            damage,
        },
    );
    connections.send(
        session.waiting(),
        ServerMessage::HitTaken {
            attacker: connections.name_of(session.acting()),
            damage,
        },
    );
}

fn end_turn(session: &mut Session) {
    session.flip_turn();
    session.mode = Mode::Resolving;
}

fn attack<R: Rng>(session: &mut Session, connections: &ConnectionRegistry, rng: &mut R) {
    let damage = roll_damage(rng);
    apply_hit(session, connections, damage);
    end_turn(session);
}

fn power_move<R: Rng>(session: &mut Session, connections: &ConnectionRegistry, rng: &mut R) {
    if rng.random_bool(0.5) {
        connections.send(session.acting(), ServerMessage::Missed);
        connections.send(
            session.waiting(),
            ServerMessage::Evaded {
                attacker: connections.name_of(session.acting()),
            },
        );
    } else {
        let damage = 3 * roll_damage(rng);
        apply_hit(session, connections, damage);
    }
    let turn = session.turn;
    session.power_moves[turn] = session.power_moves[turn].saturating_sub(1);
    end_turn(session);
}

/// Returns `true` when the session is over and should be removed.
fn settle(session: &mut Session, connections: &ConnectionRegistry) -> bool {
    if let Some(loser) = session.loser() {
        let loser_id = session.players[loser];
        let winner_id = session.players[1 - loser];
        connections.send(
            loser_id,
            ServerMessage::Defeat {
                winner: connections.name_of(winner_id),
            },
        );
        connections.send(
            winner_id,
            ServerMessage::Victory {
                loser: connections.name_of(loser_id),
            },
        );
        return true;
    }

    for seat in 0..2 {
        let opponent = 1 - seat;
        connections.send(
            session.players[seat],
            ServerMessage::Status {
                hitpoints: session.hitpoints[seat],
                power_moves: session.power_moves[seat],
                opponent: connections.name_of(session.players[opponent]),
                opponent_hitpoints: session.hitpoints[opponent],
            },
        );
    }
    connections.send(
        session.acting(),
        ServerMessage::Menu {
            power_move: session.power_moves[session.turn] > 0,
        },
    );
    connections.send(
        session.waiting(),
        ServerMessage::WaitingFor {
            opponent: connections.name_of(session.acting()),
        },
    );
    session.mode = Mode::WaitingForCommand;
    false
}

/// Run one resolver pass over every session. Finished sessions are removed
/// and both players are released for matchmaking.
pub fn resolve<R: Rng>(
    sessions: &mut SessionRegistry,
    connections: &mut ConnectionRegistry,
    rng: &mut R,
) -> Vec<SessionId> {
    let mut finished = Vec::new();

    for session in sessions.iter_mut() {
        match session.mode {
            Mode::Attacking => attack(session, connections, rng),
            Mode::PowerMove => power_move(session, connections, rng),
            Mode::WaitingForCommand | Mode::Chatting | Mode::Resolving => {}
        }
        if session.mode == Mode::Resolving && settle(session, connections) {
            finished.push(session.id);
        }
    }

    for id in &finished {
        let Some(session) = sessions.remove(*id) else {
            continue;
        };
        for player in session.players {
            if let Some(connection) = connections.get_mut(player) {
                connection.session = None;
            }
        }
        info!("{} finished, hitpoints {:?}", id, session.hitpoints);
    }
    if !finished.is_empty() {
        debug!("{} sessions still active", sessions.len());
    }
    finished
}
