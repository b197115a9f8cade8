//! Uses the terminal as the joystick pad: the pad is the largest square that
//! fits under the status line, and the mouse is the pointer.

use crossterm::event::{
    Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use rover_geom::{CalibrationFrame, LayoutProvider, Point, Size, DEAD_ZONE, EDGE_MARGIN};

use crate::session::{Event, PointerEvent};

/// Rows at the top of the terminal that belong to the status display.
pub const STATUS_ROWS: u16 = 1;

/// Terminal cells aren't square, so we work in "pixels," with each cell
/// being `cell` pixels in size.
#[derive(Clone, Copy, Debug)]
pub struct TerminalSurface {
    pub cell: Size,
}

impl TerminalSurface {
    pub fn new(cell: Size) -> Self {
        TerminalSurface { cell }
    }

    /// The pad for a terminal with this many columns and rows, or `None` if
    /// the pad would be too small to get out of the dead zone.
    pub fn frame_for(&self, columns: u16, rows: u16) -> Option<CalibrationFrame> {
        let rows = rows.checked_sub(STATUS_ROWS)?;
        let width = columns as f32 * self.cell.width;
        let height = rows as f32 * self.cell.height;
        let side = width.min(height);
        if side < 2.0 * (DEAD_ZONE + EDGE_MARGIN) {
            return None;
        }

        let origin = Point::new(
            (width - side) / 2.0,
            STATUS_ROWS as f32 * self.cell.height + (height - side) / 2.0,
        );
        Some(CalibrationFrame::new(origin, Size::new(side, side)))
    }

    /// The center of a cell.
    pub fn point(&self, column: u16, row: u16) -> Point {
        Point::new(
            (column as f32 + 0.5) * self.cell.width,
            (row as f32 + 0.5) * self.cell.height,
        )
    }

    /// The cell containing a point.
    pub fn cell_at(&self, p: Point) -> (u16, u16) {
        (
            (p.x / self.cell.width).floor().max(0.0) as u16,
            (p.y / self.cell.height).floor().max(0.0) as u16,
        )
    }
}

impl LayoutProvider for TerminalSurface {
    fn bounding_box(&self) -> Option<CalibrationFrame> {
        let (columns, rows) = crossterm::terminal::size().ok()?;
        self.frame_for(columns, rows)
    }
}

/// Keys `1` to `9` pick from `gears`, `d` toggles drift and `q` quits.
pub fn translate(ev: &TermEvent, surface: &TerminalSurface, gears: &[u8]) -> Option<Event> {
    match ev {
        TermEvent::Mouse(MouseEvent {
            kind, column, row, ..
        }) => match kind {
            MouseEventKind::Down(MouseButton::Left) | MouseEventKind::Drag(MouseButton::Left) => {
                Some(Event::Pointer(PointerEvent::Move(
                    surface.point(*column, *row),
                )))
            }
            MouseEventKind::Up(MouseButton::Left) => Some(Event::Pointer(PointerEvent::Release)),
            _ => None,
        },
        TermEvent::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) => match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Event::Quit),
            KeyCode::Char('q') | KeyCode::Esc => Some(Event::Quit),
            KeyCode::Char('d') => Some(Event::ToggleDrift),
            KeyCode::Char(ch) => {
                let idx = ch.to_digit(10)?.checked_sub(1)?;
                gears.get(idx as usize).copied().map(Event::Gear)
            }
            _ => None,
        },
        TermEvent::Resize(..) | TermEvent::FocusGained => Some(Event::Resurfaced),
        _ => None,
    }
}
