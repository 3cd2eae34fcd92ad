//! Synthetic poses with chosen joint angles.
//!
//! Used by the console driver and by tests to drive the counter without a
//! pose estimator.

use crate::pose::{Landmark, LandmarkIndex, Pose};

use super::kind::ExerciseKind;

const SEGMENT: f32 = 0.15;

/// `vertex` から `toward` 方向を `degrees` だけ回転した位置に点を置く
fn ray(vertex: Landmark, toward: Landmark, degrees: f32) -> Landmark {
    let dx = toward.x - vertex.x;
    let dy = toward.y - vertex.y;
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = (dx / len, dy / len);
    let (sin, cos) = degrees.to_radians().sin_cos();
    Landmark::planar(
        vertex.x + SEGMENT * (ux * cos - uy * sin),
        vertex.y + SEGMENT * (ux * sin + uy * cos),
    )
}

/// 主角度 `primary` と姿勢角度 `posture` を持つ姿勢を作る
pub fn pose_with_angles(exercise: ExerciseKind, primary: f32, posture: f32) -> Pose {
    use LandmarkIndex::*;

    let mut pose = Pose::new([Landmark::planar(0.5, 0.5); LandmarkIndex::COUNT]);
    let mut set = |index: LandmarkIndex, landmark: Landmark| {
        pose.landmarks[index as usize] = landmark;
    };

    match exercise {
        ExerciseKind::PullUp => {
            let shoulder = Landmark::planar(0.5, 0.3);
            let hip = Landmark::planar(0.5, 0.6);
            set(RightShoulder, shoulder);
            set(RightHip, hip);
            let elbow = ray(shoulder, hip, primary);
            set(RightElbow, elbow);
            set(RightWrist, ray(elbow, shoulder, 180.0));
            set(RightAnkle, ray(hip, shoulder, posture));
        }
        ExerciseKind::Squat => {
            let hip = Landmark::planar(0.5, 0.45);
            let knee = Landmark::planar(0.5, 0.6);
            set(RightHip, hip);
            set(RightKnee, knee);
            set(RightAnkle, ray(knee, hip, primary));
            set(RightShoulder, ray(hip, knee, posture));
        }
        ExerciseKind::ShoulderAbduction => {
            let shoulder = Landmark::planar(0.5, 0.3);
            let hip = Landmark::planar(0.5, 0.6);
            set(RightShoulder, shoulder);
            set(RightHip, hip);
            let elbow = ray(shoulder, hip, primary);
            set(RightElbow, elbow);
            set(RightWrist, ray(elbow, shoulder, posture));
        }
    }

    pose
}
