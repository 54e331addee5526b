use std::fmt;

/// Line terminator used for every server -> client message.
pub const CRLF: &str = "\r\n";

/// Client -> Server turn commands, keyed by the first byte of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `a`
    Attack,
    /// `s`, followed by a chat line
    Speak,
    /// `p`, only honored while power moves remain
    PowerMove,
}

impl Command {
    pub fn parse(input: &[u8]) -> Option<Self> {
        match input.first()? {
            b'a' => Some(Command::Attack),
            b's' => Some(Command::Speak),
            b'p' => Some(Command::PowerMove),
            _ => None,
        }
    }
}

/// Server -> Client messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once on accept
    NamePrompt,
    /// Broadcast to everyone else when a name is set
    Arrival { name: String },
    Welcome { name: String },
    /// A session was formed against `opponent`
    Engage { opponent: String },
    SpeakPrompt,
    /// Chat relayed to the waiting player
    Chat { speaker: String, text: String },
    HitDealt { target: String, damage: i32 },
    HitTaken { attacker: String, damage: i32 },
    Missed,
    Evaded { attacker: String },
    /// Per-player status shown at the start of every turn
    Status {
        hitpoints: i32,
        power_moves: u32,
        opponent: String,
        opponent_hitpoints: i32,
    },
    Menu { power_move: bool },
    WaitingFor { opponent: String },
    Defeat { winner: String },
    Victory { loser: String },
    /// The opponent disconnected mid-session
    Forfeit,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::NamePrompt => write!(f, "What is your name?{CRLF}"),
            ServerMessage::Arrival { name } => write!(f, "{CRLF}**{name} enters the arena...**{CRLF}"),
            ServerMessage::Welcome { name } => write!(f, "Welcome, {name}! Awaiting opponent...{CRLF}"),
            ServerMessage::Engage { opponent } => write!(f, "You engage {opponent}!{CRLF}"),
            ServerMessage::SpeakPrompt => write!(f, "{CRLF}Say something...{CRLF}"),
            ServerMessage::Chat { speaker, text } => {
                write!(f, "{CRLF}{speaker} takes a break to tell you: {text}{CRLF}")
            }
            ServerMessage::HitDealt { target, damage } => {
                write!(f, "You hit {target} for {damage} damage!{CRLF}")
            }
            ServerMessage::HitTaken { attacker, damage } => {
                write!(f, "You got hit by {attacker} for {damage} damage!{CRLF}")
            }
            ServerMessage::Missed => write!(f, "{CRLF}You missed!{CRLF}"),
            ServerMessage::Evaded { attacker } => write!(f, "You evaded {attacker}!{CRLF}"),
            ServerMessage::Status {
                hitpoints,
                power_moves,
                opponent,
                opponent_hitpoints,
            } => write!(
                f,
                "Your hitpoints: {hitpoints}{CRLF}Your powermoves: {power_moves}{CRLF}{CRLF}\
                 {opponent}'s hitpoints: {opponent_hitpoints}{CRLF}"
            ),
            ServerMessage::Menu { power_move } => {
                write!(f, "{CRLF}(a)ttack{CRLF}")?;
                if *power_move {
                    write!(f, "(p)owermove{CRLF}")?;
                }
                write!(f, "(s)peak something{CRLF}")
            }
            ServerMessage::WaitingFor { opponent } => {
                write!(f, "Waiting for {opponent} to strike...{CRLF}")
            }
            ServerMessage::Defeat { winner } => write!(
                f,
                "{CRLF}You are no match for {winner}. You got pwnt...{CRLF}Finding a new opponent...{CRLF}"
            ),
            ServerMessage::Victory { loser } => write!(
                f,
                "{CRLF}{loser} has surrendered. You win!{CRLF}Finding a new opponent...{CRLF}"
            ),
            ServerMessage::Forfeit => write!(
                f,
                "Your opponent is a coward and left the game. You win!{CRLF}Finding a new opponent...{CRLF}"
            ),
        }
    }
}
