pub mod angle;
pub mod landmark;

pub use angle::{calculate_angle, JointTriple};
pub use landmark::{Landmark, LandmarkIndex, Pose, PoseError};
