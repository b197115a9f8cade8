//! The text protocol spoken between the remote and the rover.
//!
//! Every command is a single text message of the form `<name>:<speed>`, for
//! example `forward:180` or `drift_l:255`. There is no framing, no
//! acknowledgement and no heartbeat: the websocket message boundary is the
//! only delimiter.

#![cfg_attr(not(feature = "std"), no_std)]

use core::{fmt, str::FromStr};

use rover_geom::Direction;
use serde::{Deserialize, Serialize};

pub const MAX_SPEED: u8 = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    DriftL,
    DriftR,
}

impl CommandName {
    pub const ALL: [CommandName; 7] = [
        CommandName::Forward,
        CommandName::Backward,
        CommandName::Left,
        CommandName::Right,
        CommandName::Stop,
        CommandName::DriftL,
        CommandName::DriftR,
    ];

    /// The name to send for a direction. In drift mode, lateral directions
    /// become their drift variants; everything else keeps its plain name.
    pub fn for_direction(direction: Direction, drift: bool) -> CommandName {
        match (direction, drift) {
            (Direction::Left, true) => CommandName::DriftL,
            (Direction::Right, true) => CommandName::DriftR,
            (Direction::Left, false) => CommandName::Left,
            (Direction::Right, false) => CommandName::Right,
            (Direction::Forward, _) => CommandName::Forward,
            (Direction::Backward, _) => CommandName::Backward,
            (Direction::Stop, _) => CommandName::Stop,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Forward => "forward",
            CommandName::Backward => "backward",
            CommandName::Left => "left",
            CommandName::Right => "right",
            CommandName::Stop => "stop",
            CommandName::DriftL => "drift_l",
            CommandName::DriftR => "drift_r",
        }
    }

    pub fn is_drift(self) -> bool {
        matches!(self, CommandName::DriftL | CommandName::DriftR)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or(ParseError::UnknownCommand)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cmd {
    pub name: CommandName,
    pub speed: u8,
}

impl Cmd {
    pub fn new(name: CommandName, speed: u8) -> Self {
        Cmd { name, speed }
    }

    pub fn stop() -> Self {
        Cmd::new(CommandName::Stop, 0)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.speed)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// There was no `:` between the name and the speed.
    #[error("expected `<command>:<speed>`")]
    MissingSeparator,
    #[error("unknown command name")]
    UnknownCommand,
    /// The speed wasn't a decimal integer in `0..=255`.
    #[error("speed must be an integer from 0 to 255")]
    InvalidSpeed,
}

impl FromStr for Cmd {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, speed) = s.split_once(':').ok_or(ParseError::MissingSeparator)?;
        let name = name.parse()?;
        let speed = speed.parse().map_err(|_| ParseError::InvalidSpeed)?;
        Ok(Cmd { name, speed })
    }
}
