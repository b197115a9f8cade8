//! The control session: everything that happens on the remote goes through
//! [`Session::handle`], one event at a time.

use std::ops::ControlFlow;

use log::{debug, info, trace};
use rover_control::{Controller, Counters, Haptics, Pulse};
use rover_geom::{calibrate, CalibrationFrame, Direction, Displacement, LayoutProvider, Point};
use rover_protocol::CommandName;

use crate::connection::{ConnectionManager, ConnectionState, LinkCounters, LinkEvent};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    /// The pointer is down at this position (in surface coordinates).
    Move(Point),
    Release,
}

#[derive(Debug)]
pub enum Event {
    Pointer(PointerEvent),
    Gear(u8),
    ToggleDrift,
    /// The surface was shown again (or resized), so it needs measuring again.
    Resurfaced,
    Link(LinkEvent),
    Quit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Pointer moves that we ignored because we had never managed to calibrate.
    pub uncalibrated_moves: u64,
    pub failed_calibrations: u64,
}

/// A snapshot of everything the status display needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub connection: ConnectionState,
    pub gear: u8,
    pub drift: bool,
    pub last_command: CommandName,
    pub stick: Option<Displacement>,
    pub link: LinkCounters,
}

pub struct Session<L, H> {
    layout: L,
    haptics: H,
    frame: Option<CalibrationFrame>,
    controller: Controller,
    link: ConnectionManager,
    stick: Option<Displacement>,
    counters: SessionCounters,
}

impl<L: LayoutProvider, H: Haptics> Session<L, H> {
    pub fn new(layout: L, haptics: H, controller: Controller, link: ConnectionManager) -> Self {
        let mut ret = Session {
            layout,
            haptics,
            frame: None,
            controller,
            link,
            stick: None,
            counters: SessionCounters::default(),
        };
        ret.recalibrate();
        ret
    }

    pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
        trace!("event {event:?}");
        match event {
            Event::Pointer(PointerEvent::Move(p)) => self.pointer_moved(p),
            Event::Pointer(PointerEvent::Release) => self.released(),
            Event::Gear(gear) => {
                self.controller.set_gear(gear);
                self.haptics.pulse(Pulse::Medium);
            }
            Event::ToggleDrift => {
                self.controller.toggle_drift();
                self.haptics.pulse(Pulse::Long);
            }
            Event::Resurfaced => self.recalibrate(),
            Event::Link(ev) => {
                self.link.handle(ev);
                info!("connection {:?}", self.link.state());
            }
            Event::Quit => {
                self.link.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Measures the surface again. If it isn't available, we keep using the
    /// previous measurement (if there was one).
    fn recalibrate(&mut self) {
        match calibrate(&self.layout) {
            Ok(frame) => {
                debug!("calibrated: {frame:?}");
                self.frame = Some(frame);
            }
            Err(e) => {
                debug!("calibration skipped: {e}");
                self.counters.failed_calibrations += 1;
            }
        }
    }

    fn pointer_moved(&mut self, p: Point) {
        let Some(frame) = &self.frame else {
            self.counters.uncalibrated_moves += 1;
            return;
        };
        let displacement = frame.project(p);
        self.stick = Some(displacement);
        self.observe(displacement.direction());
    }

    fn released(&mut self) {
        self.recalibrate();
        self.stick = None;
        self.observe(Direction::Stop);
    }

    fn observe(&mut self, direction: Direction) {
        if let Some(cmd) = self.controller.observe(direction) {
            self.link.send(&cmd.to_string());
            self.haptics.pulse(Pulse::Light);
        }
    }

    pub fn status(&self) -> Status {
        let state = self.controller.state();
        Status {
            connection: self.link.state(),
            gear: state.gear,
            drift: state.drift,
            last_command: state.last_command,
            stick: self.stick,
            link: self.link.counters(),
        }
    }

    pub fn frame(&self) -> Option<&CalibrationFrame> {
        self.frame.as_ref()
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn dispatch_counters(&self) -> Counters {
        self.controller.counters()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rover_control::DEFAULT_GEAR;
    use rover_geom::{Size, Vector};
    use tokio::sync::mpsc;

    use super::*;

    struct FakeLayout {
        frame: Cell<Option<CalibrationFrame>>,
        calls: Cell<usize>,
    }

    impl FakeLayout {
        fn new(frame: Option<CalibrationFrame>) -> Self {
            FakeLayout {
                frame: Cell::new(frame),
                calls: Cell::new(0),
            }
        }
    }

    impl LayoutProvider for FakeLayout {
        fn bounding_box(&self) -> Option<CalibrationFrame> {
            self.calls.set(self.calls.get() + 1);
            self.frame.get()
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<Pulse>);

    impl Haptics for Recorder {
        fn pulse(&mut self, pulse: Pulse) {
            self.0.push(pulse);
        }
    }

    fn pad() -> CalibrationFrame {
        CalibrationFrame::new(Point::new(40.0, 200.0), Size::new(320.0, 320.0))
    }

    fn at_polar(r: f32, deg: f32) -> Point {
        let rad = deg.to_radians();
        pad().center() + Vector::new(r * rad.cos(), r * rad.sin())
    }

    fn moved(p: Point) -> Event {
        Event::Pointer(PointerEvent::Move(p))
    }

    fn connected(
        layout: &FakeLayout,
    ) -> (
        Session<&FakeLayout, Recorder>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let mut session = Session::new(
            layout,
            Recorder::default(),
            Controller::new(DEFAULT_GEAR),
            ConnectionManager::new(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        session.handle(Event::Link(LinkEvent::Opened(tx)));
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn drive_then_release() {
        let layout = FakeLayout::new(Some(pad()));
        let (mut session, mut rx) = connected(&layout);
        assert_eq!(layout.calls.get(), 1);

        session.handle(moved(at_polar(50.0, 10.0)));
        session.handle(moved(at_polar(60.0, 12.0)));
        session.handle(moved(at_polar(50.0, 100.0)));
        assert_eq!(drain(&mut rx), vec!["right:180", "backward:180"]);

        session.handle(Event::Pointer(PointerEvent::Release));
        assert_eq!(layout.calls.get(), 2);
        assert_eq!(drain(&mut rx), vec!["stop:0"]);
        assert_eq!(session.status().stick, None);
        assert_eq!(
            session.dispatch_counters(),
            Counters {
                dispatched: 3,
                repeats: 1
            }
        );
        assert_eq!(
            session.haptics.0,
            vec![Pulse::Light, Pulse::Light, Pulse::Light]
        );
    }

    #[test]
    fn drift_and_gear_apply_on_next_change() {
        let layout = FakeLayout::new(Some(pad()));
        let (mut session, mut rx) = connected(&layout);

        session.handle(Event::Gear(120));
        session.handle(moved(at_polar(100.0, 180.0)));
        session.handle(Event::ToggleDrift);
        session.handle(moved(at_polar(100.0, 170.0)));
        session.handle(moved(at_polar(100.0, -90.0)));
        session.handle(moved(at_polar(100.0, 0.0)));

        assert_eq!(drain(&mut rx), vec!["left:120", "forward:120", "drift_r:255"]);
        assert_eq!(session.status().last_command, CommandName::DriftR);
        assert_eq!(
            session.haptics.0,
            vec![
                Pulse::Medium,
                Pulse::Light,
                Pulse::Long,
                Pulse::Light,
                Pulse::Light
            ]
        );
    }

    #[test]
    fn moves_are_ignored_until_calibrated() {
        let layout = FakeLayout::new(None);
        let (mut session, mut rx) = connected(&layout);

        session.handle(moved(Point::new(0.0, 0.0)));
        assert_eq!(session.counters().uncalibrated_moves, 1);
        assert_eq!(session.counters().failed_calibrations, 1);
        assert!(drain(&mut rx).is_empty());

        layout.frame.set(Some(pad()));
        session.handle(Event::Resurfaced);
        session.handle(moved(at_polar(80.0, -90.0)));
        assert_eq!(drain(&mut rx), vec!["forward:180"]);
    }

    #[test]
    fn failed_recalibration_keeps_old_frame() {
        let layout = FakeLayout::new(Some(pad()));
        let (mut session, mut rx) = connected(&layout);

        layout.frame.set(None);
        session.handle(Event::Resurfaced);
        assert_eq!(session.frame(), Some(&pad()));

        session.handle(moved(at_polar(80.0, 90.0)));
        assert_eq!(drain(&mut rx), vec!["backward:180"]);
    }

    #[test]
    fn commands_while_disconnected_are_not_replayed() {
        let layout = FakeLayout::new(Some(pad()));
        let mut session = Session::new(
            &layout,
            Recorder::default(),
            Controller::default(),
            ConnectionManager::new(),
        );

        session.handle(moved(at_polar(80.0, 0.0)));
        assert_eq!(session.status().last_command, CommandName::Right);
        assert_eq!(session.status().link.dropped, 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.handle(Event::Link(LinkEvent::Opened(tx)));
        assert_eq!(session.status().connection, ConnectionState::Open);

        session.handle(moved(at_polar(90.0, 5.0)));
        assert!(drain(&mut rx).is_empty());

        session.handle(moved(at_polar(90.0, -100.0)));
        assert_eq!(drain(&mut rx), vec!["forward:180"]);

        session.handle(Event::Link(LinkEvent::Closed));
        assert_eq!(session.status().connection, ConnectionState::Disconnected);
    }

    #[test]
    fn quit_stops_the_loop() {
        let layout = FakeLayout::new(Some(pad()));
        let (mut session, _rx) = connected(&layout);
        assert!(session.handle(Event::Quit).is_break());
        assert_eq!(session.status().connection, ConnectionState::Disconnected);
    }
}
