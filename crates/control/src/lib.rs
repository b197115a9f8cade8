//! Turns a stream of observed directions into the commands that we send to
//! the rover.
//!
//! Dispatch is edge-triggered: holding the stick in one direction produces a
//! single command, and nothing more is sent until the direction changes. The
//! current gear and drift mode are only read when that change happens, so
//! changing gear mid-gesture has no effect until the next change of direction.

use log::{debug, trace};
use rover_geom::Direction;
use rover_protocol::{Cmd, CommandName, MAX_SPEED};

pub const DEFAULT_GEAR: u8 = 180;

/// The kinds of haptic feedback that the remote asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pulse {
    /// A command was dispatched.
    Light,
    /// The gear changed.
    Medium,
    /// Drift mode was toggled.
    Long,
}

/// Fire-and-forget haptic feedback.
pub trait Haptics {
    fn pulse(&mut self, pulse: Pulse);
}

pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn pulse(&mut self, _pulse: Pulse) {}
}

impl<H: Haptics + ?Sized> Haptics for &mut H {
    fn pulse(&mut self, pulse: Pulse) {
        (**self).pulse(pulse)
    }
}

impl<H: Haptics + ?Sized> Haptics for Box<H> {
    fn pulse(&mut self, pulse: Pulse) {
        (**self).pulse(pulse)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlState {
    pub gear: u8,
    pub drift: bool,
    /// The direction of the last dispatched command. This is not necessarily
    /// the last direction that was observed.
    pub last_direction: Direction,
    pub last_command: CommandName,
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState {
            gear: DEFAULT_GEAR,
            drift: false,
            last_direction: Direction::Stop,
            last_command: CommandName::Stop,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub dispatched: u64,
    /// Observations that matched the last dispatched direction.
    pub repeats: u64,
}

#[derive(Debug, Default)]
pub struct Controller {
    state: ControlState,
    counters: Counters,
}

impl Controller {
    pub fn new(gear: u8) -> Self {
        Controller {
            state: ControlState {
                gear,
                ..ControlState::default()
            },
            counters: Counters::default(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Takes effect at the next change of direction.
    pub fn set_gear(&mut self, gear: u8) {
        debug!("gear {} -> {gear}", self.state.gear);
        self.state.gear = gear;
    }

    /// Takes effect at the next change of direction. Returns the new drift mode.
    pub fn toggle_drift(&mut self) -> bool {
        self.state.drift = !self.state.drift;
        debug!("drift mode {}", if self.state.drift { "on" } else { "off" });
        self.state.drift
    }

    /// Records an observed direction, returning the command to send if the
    /// direction changed.
    ///
    /// The state advances whether or not the command actually makes it to
    /// the rover.
    pub fn observe(&mut self, direction: Direction) -> Option<Cmd> {
        if direction == self.state.last_direction {
            self.counters.repeats += 1;
            trace!("still {direction}, nothing to send");
            return None;
        }

        let name = CommandName::for_direction(direction, self.state.drift);
        let speed = if name.is_drift() {
            MAX_SPEED
        } else if direction == Direction::Stop {
            0
        } else {
            self.state.gear
        };

        let cmd = Cmd::new(name, speed);
        debug!("{} -> {direction}: dispatching {cmd}", self.state.last_direction);

        self.state.last_direction = direction;
        self.state.last_command = name;
        self.counters.dispatched += 1;
        Some(cmd)
    }
}
