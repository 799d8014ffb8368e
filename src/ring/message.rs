use std::fmt;
use std::str::FromStr;

use crate::error::RingMessageParseError;

/// A parsed ring control message. Parsed once at the ring reader, matched
/// everywhere else instead of re-examining the raw command string at each
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingMessage {
    /// `ELECTION <id>` — election token carrying a candidate id.
    Election(u64),
    /// `LEADER <id>` — announcement that `<id>` won the election.
    Leader(u64),
    /// `HEARTBEAT <id>` — liveness token from the current leader.
    Heartbeat(u64),
}

impl RingMessage {
    pub fn id(self) -> u64 {
        match self {
            RingMessage::Election(id) | RingMessage::Leader(id) | RingMessage::Heartbeat(id) => id,
        }
    }
}

impl fmt::Display for RingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingMessage::Election(id) => write!(f, "ELECTION {}", id),
            RingMessage::Leader(id) => write!(f, "LEADER {}", id),
            RingMessage::Heartbeat(id) => write!(f, "HEARTBEAT {}", id),
        }
    }
}

impl FromStr for RingMessage {
    type Err = RingMessageParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or(RingMessageParseError::Empty)?;

        let parse_id = |s: Option<&str>, command: &'static str| -> Result<u64, RingMessageParseError> {
            let s = s.ok_or(RingMessageParseError::WrongArity {
                command,
                expected: 1,
                got: 0,
            })?;
            s.parse::<u64>()
                .map_err(|_| RingMessageParseError::InvalidId(s.to_string()))
        };

        let msg = match command {
            "ELECTION" => RingMessage::Election(parse_id(parts.next(), "ELECTION")?),
            "LEADER" => RingMessage::Leader(parse_id(parts.next(), "LEADER")?),
            "HEARTBEAT" => RingMessage::Heartbeat(parse_id(parts.next(), "HEARTBEAT")?),
            other => return Err(RingMessageParseError::UnknownCommand(other.to_string())),
        };

        if parts.next().is_some() {
            return Err(RingMessageParseError::WrongArity {
                command: match msg {
                    RingMessage::Election(_) => "ELECTION",
                    RingMessage::Leader(_) => "LEADER",
                    RingMessage::Heartbeat(_) => "HEARTBEAT",
                },
                expected: 1,
                got: 2,
            });
        }

        Ok(msg)
    }
}
