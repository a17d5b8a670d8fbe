// THEORY:
// The `geometry` module turns landmark positions into joint angles. It is a
// stateless utility: every function is pure and has no memory of previous frames.
//
// The angle at a vertex is the absolute difference between the two directional
// angles (atan2) from the vertex to its neighbours, folded back into [0, 180] so
// that a straight limb reads 180 and a fully folded one reads 0. Degenerate input
// (coincident or non-finite points) yields 0 instead of an error, because a single
// bad frame must never interrupt a rep-counting session.

pub mod geometry {
    use crate::core_modules::landmark::{BodyJoint, Landmarks, Point, Side};

    pub type Degrees = f64;

    /// Angle at vertex `b` formed by `a` and `c`, in degrees within [0, 180].
    pub fn joint_angle(a: Point, b: Point, c: Point) -> Degrees {
        if !(a.is_finite() && b.is_finite() && c.is_finite()) || a == b || c == b {
            return 0.0;
        }

        let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
        let mut angle = radians.to_degrees().abs();
        if angle > 180.0 {
            angle = 360.0 - angle;
        }
        angle.clamp(0.0, 180.0)
    }

    /// A (proximal, vertex, distal) landmark triple, e.g. hip–knee–ankle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JointTriple {
        pub proximal: BodyJoint,
        pub vertex: BodyJoint,
        pub distal: BodyJoint,
    }

    impl JointTriple {
        pub const fn new(proximal: BodyJoint, vertex: BodyJoint, distal: BodyJoint) -> Self {
            Self {
                proximal,
                vertex,
                distal,
            }
        }

        pub fn knee(side: Side) -> Self {
            Self::new(side.hip(), side.knee(), side.ankle())
        }

        /// Measures this joint in a frame. `None` if any of the three landmarks is missing.
        pub fn angle_in(&self, landmarks: &Landmarks) -> Option<Degrees> {
            Some(joint_angle(
                landmarks.get(self.proximal)?,
                landmarks.get(self.vertex)?,
                landmarks.get(self.distal)?,
            ))
        }
    }
}
