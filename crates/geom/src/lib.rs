//! Geometry of the joystick pad: turning a raw pointer position into a
//! displacement from the pad's center, and a displacement into one of the
//! five direction buckets that the rover understands.
//!
//! All lengths are in the same units as the pointer coordinates (screen
//! pixels, usually). We call the region that the pointer moves in the
//! "surface", and the circle that follows the pointer the "knob."
//!
//! This crate supports `no_std` and uses `libm`, so that the same bucketing
//! can run on the rover if it ever wants to interpret raw stick positions.

#![cfg_attr(not(feature = "std"), no_std)]

use core::f32::consts::PI;
use libm::{atan2f, sqrtf};

pub struct Px;

pub type Point = euclid::Point2D<f32, Px>;
pub type Vector = euclid::Vector2D<f32, Px>;
pub type Size = euclid::Size2D<f32, Px>;

/// Displacements shorter than this are treated as "no movement."
pub const DEAD_ZONE: f32 = 30.0;

/// The knob may travel up to this far inside the edge of the surface.
pub const EDGE_MARGIN: f32 = 10.0;

fn square<T: core::ops::Mul<T> + Copy>(x: T) -> <T as core::ops::Mul<T>>::Output {
    x * x
}

/// The on-screen bounding box of the surface.
///
/// This is measured once the surface is laid out, and measured again
/// whenever the surface is shown after being hidden. It never changes
/// in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationFrame {
    pub origin: Point,
    pub size: Size,
}

impl CalibrationFrame {
    pub fn new(origin: Point, size: Size) -> Self {
        CalibrationFrame { origin, size }
    }

    pub fn center(&self) -> Point {
        self.origin + self.size.to_vector() / 2.0
    }

    /// How far the knob can move from the center.
    ///
    /// For surfaces narrower than twice the margin this is zero, and
    /// every displacement collapses onto the center.
    pub fn max_radius(&self) -> f32 {
        (self.size.width / 2.0 - EDGE_MARGIN).max(0.0)
    }

    pub fn project(&self, p: Point) -> Displacement {
        project(p, self)
    }

    /// Where to put the top-left corner of a knob of side `knob_size`, relative to
    /// the surface's origin, so that it is centered on the (clamped) displacement.
    pub fn knob_origin(&self, knob_size: f32, d: &Displacement) -> Point {
        let half = self.size.to_vector() / 2.0;
        (half + d.offset).to_point() - Vector::splat(knob_size / 2.0)
    }
}

/// The layout system was asked for the surface's bounding box before the
/// surface was laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("the control surface has not been laid out yet")]
pub struct Unavailable;

/// Something that knows where the surface is on screen.
pub trait LayoutProvider {
    /// Returns `None` if the surface isn't laid out yet.
    fn bounding_box(&self) -> Option<CalibrationFrame>;
}

impl<L: LayoutProvider + ?Sized> LayoutProvider for &L {
    fn bounding_box(&self) -> Option<CalibrationFrame> {
        (**self).bounding_box()
    }
}

pub fn calibrate(layout: &impl LayoutProvider) -> Result<CalibrationFrame, Unavailable> {
    layout.bounding_box().ok_or(Unavailable)
}

/// The pointer's position relative to the center of the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Displacement {
    /// The offset from the center, clamped to the knob's travel radius. This is
    /// what the knob should be drawn at.
    pub offset: Vector,
    /// The offset from the center, before clamping.
    pub raw: Vector,
    /// The length of `raw`.
    pub distance: f32,
}

impl Displacement {
    /// The angle of the displacement, in degrees. Zero points right and
    /// positive angles turn downwards (screen coordinates). Straight left
    /// comes out as either 180 or -180, which bucket the same way.
    pub fn degrees(&self) -> f32 {
        atan2f(self.raw.y, self.raw.x) * 180.0 / PI
    }

    pub fn direction(&self) -> Direction {
        bucket(self)
    }
}

pub fn project(p: Point, frame: &CalibrationFrame) -> Displacement {
    let raw = p - frame.center();
    let distance = sqrtf(square(raw.x) + square(raw.y));
    let max_radius = frame.max_radius();

    let offset = if distance > max_radius {
        raw * (max_radius / distance)
    } else {
        raw
    };

    Displacement {
        offset,
        raw,
        distance,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    /// Buckets an angle (in degrees, in `(-180, 180]`) into one of the four
    /// moving directions.
    ///
    /// Each bucket is open below and closed above, so 45 degrees is `Right`
    /// and 135 degrees is `Backward`. Angles outside of `(-180, 180]` are
    /// not normalized; anything above 135 or at most -135 is `Left`.
    pub fn from_degrees(angle: f32) -> Direction {
        if angle > -45.0 && angle <= 45.0 {
            Direction::Right
        } else if angle > 45.0 && angle <= 135.0 {
            Direction::Backward
        } else if angle > 135.0 || angle <= -135.0 {
            Direction::Left
        } else {
            Direction::Forward
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn bucket(d: &Displacement) -> Direction {
    if d.distance < DEAD_ZONE {
        Direction::Stop
    } else {
        Direction::from_degrees(d.degrees())
    }
}
