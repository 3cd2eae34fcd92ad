use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MediaPipe BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
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

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    #[cfg(test)]
    const ALL: [LandmarkIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    #[cfg(test)]
    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 腰中心を基準にした相対深度
    #[serde(default)]
    pub z: f32,
    /// 可視度 (0.0〜1.0)
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// 平面座標のみ指定 (可視度 1.0)
    pub fn planar(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0, 1.0)
    }

    /// 可視度が閾値以上か
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoseError {
    #[error("expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },
}

/// 33ランドマークからなる姿勢 (1フレーム分)
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl Pose {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// ランドマーク列から姿勢を作る
    ///
    /// 空の列は「人物なし」として `Ok(None)` を返す。
    pub fn from_landmarks(landmarks: &[Landmark]) -> Result<Option<Self>, PoseError> {
        if landmarks.is_empty() {
            return Ok(None);
        }
        let landmarks: [Landmark; LandmarkIndex::COUNT] =
            landmarks.try_into().map_err(|_| PoseError::LandmarkCount {
                expected: LandmarkIndex::COUNT,
                actual: landmarks.len(),
            })?;
        Ok(Some(Self::new(landmarks)))
    }

    /// インデックスでランドマークを取得
    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    /// 指定ランドマークがすべて閾値以上の可視度か
    pub fn all_visible(&self, indices: &[LandmarkIndex], threshold: f32) -> bool {
        indices.iter().all(|&i| self.get(i).is_visible(threshold))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            landmarks: [Landmark::default(); LandmarkIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(LandmarkIndex::from_index(12), Some(LandmarkIndex::RightShoulder));
        assert_eq!(LandmarkIndex::from_index(28), Some(LandmarkIndex::RightAnkle));
        assert_eq!(LandmarkIndex::from_index(32), Some(LandmarkIndex::RightFootIndex));
        assert_eq!(LandmarkIndex::from_index(33), None);
    }

    #[test]
    fn test_landmark_index_matches_discriminant() {
        for i in 0..LandmarkIndex::COUNT {
            assert_eq!(LandmarkIndex::from_index(i).map(|l| l as usize), Some(i));
        }
    }

    #[test]
    fn test_landmark_is_visible() {
        let lm = Landmark::new(0.5, 0.5, 0.0, 0.7);
        assert!(lm.is_visible(0.5));
        assert!(!lm.is_visible(0.8));
    }

    #[test]
    fn test_from_landmarks_empty_is_no_person() {
        assert_eq!(Pose::from_landmarks(&[]), Ok(None));
    }

    #[test]
    fn test_from_landmarks_wrong_count() {
        let landmarks = vec![Landmark::planar(0.1, 0.1); 17];
        assert_eq!(
            Pose::from_landmarks(&landmarks),
            Err(PoseError::LandmarkCount { expected: 33, actual: 17 })
        );
    }

    #[test]
    fn test_from_landmarks_keeps_order() {
        let landmarks: Vec<Landmark> = (0..LandmarkIndex::COUNT)
            .map(|i| Landmark::planar(i as f32 / 100.0, 0.5))
            .collect();
        let pose = Pose::from_landmarks(&landmarks).unwrap().unwrap();
        assert_eq!(pose.get(LandmarkIndex::RightKnee).x, 0.26);
    }

    #[test]
    fn test_all_visible() {
        let mut pose = Pose::new([Landmark::new(0.0, 0.0, 0.0, 0.9); LandmarkIndex::COUNT]);
        pose.landmarks[LandmarkIndex::RightHip as usize].visibility = 0.2;
        assert!(pose.all_visible(&[LandmarkIndex::RightShoulder, LandmarkIndex::RightElbow], 0.5));
        assert!(!pose.all_visible(&[LandmarkIndex::RightShoulder, LandmarkIndex::RightHip], 0.5));
    }

    #[test]
    fn test_landmark_json_defaults() {
        let lm: Landmark = serde_json::from_str(r#"{"x": 0.25, "y": 0.75}"#).unwrap();
        assert_eq!(lm, Landmark::new(0.25, 0.75, 0.0, 1.0));
    }
}
