// THEORY:
// The `landmark` module is the most fundamental unit of the rep engine. It is a
// "dumb" data layer describing what the external pose extractor hands us for a
// single frame: a set of named 2D body-joint positions, or nothing at all.
//
// Key architectural principles:
// 1.  **Named Joints**: Landmarks are addressed through the `BodyJoint` enumeration
//     (the 33-point MediaPipe layout) instead of bare indices, so every detector
//     shares one lookup table.
// 2.  **Normalized Space**: Coordinates are in normalized image space, [0, 1] per
//     axis, with `y` growing downward. Confidence is not modeled.
// 3.  **Frame Immutability**: A `PoseFrame` is produced once per frame and never
//     mutated afterwards. Detectors only read from it.
// 4.  **Explicit Absence**: "No detection" is `landmarks: None`, not an empty list
//     that downstream code has to special-case.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};
use std::time::Instant;

/// Number of joints in the body layout produced by the pose extractor.
pub const BODY_JOINT_COUNT: usize = 33;

/// A 2D point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Body landmark indices as emitted by the pose extractor (33 total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BodyJoint {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyJoint {
    pub const ALL: [BodyJoint; BODY_JOINT_COUNT] = [
        BodyJoint::Nose,
        BodyJoint::LeftEyeInner,
        BodyJoint::LeftEye,
        BodyJoint::LeftEyeOuter,
        BodyJoint::RightEyeInner,
        BodyJoint::RightEye,
        BodyJoint::RightEyeOuter,
        BodyJoint::LeftEar,
        BodyJoint::RightEar,
        BodyJoint::MouthLeft,
        BodyJoint::MouthRight,
        BodyJoint::LeftShoulder,
        BodyJoint::RightShoulder,
        BodyJoint::LeftElbow,
        BodyJoint::RightElbow,
        BodyJoint::LeftWrist,
        BodyJoint::RightWrist,
        BodyJoint::LeftPinky,
        BodyJoint::RightPinky,
        BodyJoint::LeftIndex,
        BodyJoint::RightIndex,
        BodyJoint::LeftThumb,
        BodyJoint::RightThumb,
        BodyJoint::LeftHip,
        BodyJoint::RightHip,
        BodyJoint::LeftKnee,
        BodyJoint::RightKnee,
        BodyJoint::LeftAnkle,
        BodyJoint::RightAnkle,
        BodyJoint::LeftHeel,
        BodyJoint::RightHeel,
        BodyJoint::LeftFootIndex,
        BodyJoint::RightFootIndex,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Which side of the body a limb belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn hip(self) -> BodyJoint {
        match self {
            Side::Left => BodyJoint::LeftHip,
            Side::Right => BodyJoint::RightHip,
        }
    }

    pub fn knee(self) -> BodyJoint {
        match self {
            Side::Left => BodyJoint::LeftKnee,
            Side::Right => BodyJoint::RightKnee,
        }
    }

    pub fn ankle(self) -> BodyJoint {
        match self {
            Side::Left => BodyJoint::LeftAnkle,
            Side::Right => BodyJoint::RightAnkle,
        }
    }
}

/// The three joints of one leg, read out of a frame together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub hip: Point,
    pub knee: Point,
    pub ankle: Point,
}

/// All joints the extractor reported for a single frame. Always holds one slot per
/// `BodyJoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LandmarkTable")]
pub struct Landmarks {
    points: Vec<Option<Point>>,
}

/// Serialized shape of `Landmarks`, padded or cut to the joint layout on the way in.
#[derive(Deserialize)]
struct LandmarkTable {
    points: Vec<Option<Point>>,
}

impl From<LandmarkTable> for Landmarks {
    fn from(table: LandmarkTable) -> Self {
        let mut points = table.points;
        points.resize(BODY_JOINT_COUNT, None);
        Self { points }
    }
}

impl Default for Landmarks {
    fn default() -> Self {
        Self::new()
    }
}

impl Landmarks {
    pub fn new() -> Self {
        Self {
            points: vec![None; BODY_JOINT_COUNT],
        }
    }

    /// Builds a table from an index-ordered list. Entries past the known layout are ignored.
    pub fn from_points(points: &[Point]) -> Self {
        let mut landmarks = Self::new();
        for (joint, point) in BodyJoint::ALL.iter().zip(points) {
            landmarks.set(*joint, *point);
        }
        landmarks
    }

    pub fn with(mut self, joint: BodyJoint, point: Point) -> Self {
        self.set(joint, point);
        self
    }

    pub fn set(&mut self, joint: BodyJoint, point: Point) {
        if let Some(slot) = self.points.get_mut(joint.index()) {
            *slot = Some(point);
        }
    }

    pub fn get(&self, joint: BodyJoint) -> Option<Point> {
        self.points.get(joint.index()).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.points.iter().all(Option::is_none)
    }

    /// Returns hip, knee and ankle for one side, or `None` if any of them is missing.
    pub fn leg(&self, side: Side) -> Option<Leg> {
        Some(Leg {
            hip: self.get(side.hip())?,
            knee: self.get(side.knee())?,
            ankle: self.get(side.ankle())?,
        })
    }

    /// Both legs, left first, or `None` unless all six joints are present.
    pub fn legs(&self) -> Option<(Leg, Leg)> {
        Some((self.leg(Side::Left)?, self.leg(Side::Right)?))
    }
}

impl FromIterator<(BodyJoint, Point)> for Landmarks {
    fn from_iter<I: IntoIterator<Item = (BodyJoint, Point)>>(iter: I) -> Self {
        let mut landmarks = Landmarks::new();
        for (joint, point) in iter {
            landmarks.set(joint, point);
        }
        landmarks
    }
}

/// One frame's worth of extractor output, stamped with the instant it was captured.
#[derive(Debug, Clone)]
pub struct PoseFrame {
    /// The detected joints, or `None` when the extractor found no person.
    pub landmarks: Option<Landmarks>,
    /// Capture time. All cooldown, grace and rest arithmetic is driven by this value.
    pub timestamp: Instant,
}

impl PoseFrame {
    pub fn detected(landmarks: Landmarks, timestamp: Instant) -> Self {
        Self {
            landmarks: Some(landmarks),
            timestamp,
        }
    }

    pub fn missing(timestamp: Instant) -> Self {
        Self {
            landmarks: None,
            timestamp,
        }
    }

    /// The landmarks, treating an empty table the same as no detection.
    pub fn pose(&self) -> Option<&Landmarks> {
        self.landmarks.as_ref().filter(|landmarks| !landmarks.is_empty())
    }
}
