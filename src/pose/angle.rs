use super::landmark::{Landmark, LandmarkIndex, Pose};

/// 3点ABCの角度 (頂点B) を度数で返す
///
/// 結果は常に 0〜180 の範囲。A や C が B と一致する場合も検証せず、
/// atan2 が返す値をそのまま使う。
pub fn calculate_angle(a: &Landmark, b: &Landmark, c: &Landmark) -> f32 {
    let radians = f32::atan2(c.y - b.y, c.x - b.x) - f32::atan2(a.y - b.y, a.x - b.x);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// 関節角度を定義する3ランドマーク (a - vertex - c)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTriple {
    pub a: LandmarkIndex,
    pub vertex: LandmarkIndex,
    pub c: LandmarkIndex,
}

impl JointTriple {
    pub const fn new(a: LandmarkIndex, vertex: LandmarkIndex, c: LandmarkIndex) -> Self {
        Self { a, vertex, c }
    }

    pub fn angle(&self, pose: &Pose) -> f32 {
        calculate_angle(pose.get(self.a), pose.get(self.vertex), pose.get(self.c))
    }

    pub fn indices(&self) -> [LandmarkIndex; 3] {
        [self.a, self.vertex, self.c]
    }
}
