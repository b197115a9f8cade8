use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use log::trace;
use rover_control::{Haptics, Pulse};
use rover_geom::CalibrationFrame;

use crate::{
    connection::ConnectionState,
    session::Status,
    surface::TerminalSurface,
};

pub fn status_line(status: &Status) -> String {
    let connection = match status.connection {
        ConnectionState::Open => "connected",
        ConnectionState::Disconnected => "disconnected",
    };
    let drift = if status.drift { "on" } else { "off" };
    let stick = match &status.stick {
        Some(d) => format!("{:+.0},{:+.0}", d.offset.x, d.offset.y),
        None => "-".to_owned(),
    };
    format!(
        "{connection} | gear {} | drift {drift} | {} | stick {stick} | sent {} dropped {}",
        status.gear, status.last_command, status.link.sent, status.link.dropped,
    )
}

/// Redraws the status line, the middle of the pad, and the knob.
pub fn draw(
    out: &mut impl Write,
    status: &Status,
    frame: Option<&CalibrationFrame>,
    surface: &TerminalSurface,
) -> io::Result<()> {
    queue!(
        out,
        Clear(ClearType::All),
        MoveTo(0, 0),
        Print(status_line(status))
    )?;

    if let Some(frame) = frame {
        let (column, row) = surface.cell_at(frame.center());
        queue!(out, MoveTo(column, row), Print('+'))?;

        if let Some(stick) = &status.stick {
            let knob = frame.origin + frame.knob_origin(surface.cell.width, stick).to_vector();
            let (column, row) = surface.cell_at(knob);
            queue!(out, MoveTo(column, row), Print('O'))?;
        }
    }

    out.flush()
}

/// Haptic feedback, as far as a terminal can manage it.
pub struct Bell {
    pub enabled: bool,
}

impl Haptics for Bell {
    fn pulse(&mut self, pulse: Pulse) {
        trace!("pulse {pulse:?}");
        if self.enabled {
            let mut out = io::stdout();
            let _ = out.write_all(b"\x07").and_then(|_| out.flush());
        }
    }
}
