use std::fmt;

use rand::Rng;

use crate::connection::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Phase of a session's turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Acting player may send `a`, `s` or `p`
    WaitingForCommand,
    Attacking,
    /// Acting player is composing a chat line
    Chatting,
    PowerMove,
    /// A turn just ended or the session was just created
    Resolving,
}

/// A two-party match
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub players: [ConnectionId; 2],
    /// Seat (0 or 1) of the player whose action is awaited
    pub turn: usize,
    pub hitpoints: [i32; 2],
    pub power_moves: [u32; 2],
    pub mode: Mode,
}

impl Session {
    /// Start a fresh session with randomized hitpoints, power moves and
    /// first turn.
    pub fn new<R: Rng>(id: SessionId, players: [ConnectionId; 2], rng: &mut R) -> Self {
        Self {
            id,
            players,
            turn: rng.random_range(0..2),
            hitpoints: [rng.random_range(20..=30), rng.random_range(20..=30)],
            power_moves: [rng.random_range(1..=2), rng.random_range(1..=2)],
            mode: Mode::Resolving,
        }
    }

    /// Seat of the player who is not acting.
    pub fn other(&self) -> usize {
        1 - self.turn
    }

    pub fn acting(&self) -> ConnectionId {
        self.players[self.turn]
    }

    pub fn waiting(&self) -> ConnectionId {
        self.players[self.other()]
    }

    fn seat_of(&self, id: ConnectionId) -> Option<usize> {
        self.players.iter().position(|p| *p == id)
    }

    pub fn opponent_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.seat_of(id).map(|seat| self.players[1 - seat])
    }

    pub fn is_turn_of(&self, id: ConnectionId) -> bool {
        self.acting() == id
    }

    pub fn flip_turn(&mut self) {
        self.turn = self.other();
    }

    /// Seat of a player at or below zero hitpoints, if any.
    pub fn loser(&self) -> Option<usize> {
        self.hitpoints.iter().position(|hp| *hp <= 0)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn new_session_draws_within_ranges() {
        let mut rng = StdRng::seed_from_u64(11);
        for n in 0..200 {
            let s = Session::new(SessionId(n), [ConnectionId(1), ConnectionId(2)], &mut rng);
            assert!(s.turn < 2);
            assert_eq!(s.mode, Mode::Resolving);
            for seat in 0..2 {
                assert!((20..=30).contains(&s.hitpoints[seat]));
                assert!((1..=2).contains(&s.power_moves[seat]));
            }
        }
    }

    #[test]
    fn turn_flips_between_seats() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = Session::new(SessionId(1), [ConnectionId(7), ConnectionId(9)], &mut rng);
        let first = s.acting();
        s.flip_turn();
        assert_ne!(s.acting(), first);
        assert_eq!(s.waiting(), first);
        assert_eq!(s.opponent_of(ConnectionId(7)), Some(ConnectionId(9)));
        assert_eq!(s.opponent_of(ConnectionId(5)), None);
    }
}
