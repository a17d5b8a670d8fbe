pub mod detector;
pub mod feedback;
pub mod geometry;
pub mod high_knee;
pub mod landmark;
pub mod lunge;
pub mod rep_counter;
pub mod smoothing;
