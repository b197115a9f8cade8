//! What the rover's motors do in response to each command.
//!
//! The rover has two motors on each side, wired in parallel, and a single
//! PWM duty that sets the speed of all of them. Turning is done by stopping
//! one side (a gentle arc), drifting by running the sides in opposite
//! directions (a spin on the spot).

use log::{debug, warn};
use rover_protocol::{Cmd, CommandName, ParseError, MAX_SPEED};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Spin {
    Forward,
    Reverse,
    Off,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Drive {
    pub left: Spin,
    pub right: Spin,
    pub duty: u8,
}

impl Drive {
    pub const STOPPED: Drive = Drive {
        left: Spin::Off,
        right: Spin::Off,
        duty: 0,
    };

    pub fn for_cmd(cmd: &Cmd) -> Drive {
        use Spin::*;
        let (left, right) = match cmd.name {
            CommandName::Forward => (Forward, Forward),
            CommandName::Backward => (Reverse, Reverse),
            CommandName::Left => (Off, Forward),
            CommandName::Right => (Forward, Off),
            CommandName::DriftL => (Reverse, Forward),
            CommandName::DriftR => (Forward, Reverse),
            CommandName::Stop => return Drive::STOPPED,
        };
        // Drifting always gets full power, whatever speed was asked for.
        let duty = if cmd.name.is_drift() {
            MAX_SPEED
        } else {
            cmd.speed
        };
        Drive { left, right, duty }
    }
}

#[derive(Debug)]
pub struct Chassis {
    drive: Drive,
}

impl Default for Chassis {
    fn default() -> Self {
        Chassis {
            drive: Drive::STOPPED,
        }
    }
}

impl Chassis {
    pub fn drive(&self) -> Drive {
        self.drive
    }

    /// Handles a message from the controller.
    ///
    /// Messages that don't look like commands are ignored, but a well-formed
    /// command that we don't know stops the motors.
    pub fn apply(&mut self, msg: &str) {
        match msg.parse::<Cmd>() {
            Ok(cmd) => self.set(Drive::for_cmd(&cmd)),
            Err(ParseError::UnknownCommand) => {
                warn!("unknown command {msg:?}, stopping");
                self.stop();
            }
            Err(e) => warn!("ignoring {msg:?}: {e}"),
        }
    }

    pub fn stop(&mut self) {
        self.set(Drive::STOPPED);
    }

    fn set(&mut self, drive: Drive) {
        if drive != self.drive {
            debug!("{:?} -> {drive:?}", self.drive);
        }
        self.drive = drive;
    }
}
