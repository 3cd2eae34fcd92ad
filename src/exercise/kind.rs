use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::pose::{JointTriple, LandmarkIndex};

use super::rules::FormIssue;

/// 動作ステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Up,
    Down,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Up => "up",
            Stage::Down => "down",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 角度の閾値 (境界値は含まない)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Below(f32),
    Above(f32),
}

impl Threshold {
    pub fn is_met(&self, angle: f32) -> bool {
        match *self {
            Threshold::Below(limit) => angle < limit,
            Threshold::Above(limit) => angle > limit,
        }
    }

    /// 閾値の向きにより深い方の角度
    pub fn deeper(&self, a: f32, b: f32) -> f32 {
        match self {
            Threshold::Below(_) => a.min(b),
            Threshold::Above(_) => a.max(b),
        }
    }
}

/// レップ判定のヒステリシス
///
/// `entry` を満たすと `entry_stage` に入り、`entry_stage` の状態で
/// `complete` を満たすと `complete_stage` に移ってカウントする。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepRule {
    pub entry: Threshold,
    pub entry_stage: Stage,
    pub complete: Threshold,
    pub complete_stage: Stage,
}

/// ステージ依存のフォームルール
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageRule {
    pub stage: Stage,
    pub violation: Threshold,
    pub issue: FormIssue,
}

/// 姿勢角度の許容範囲ルール (|angle - target| > tolerance で違反)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureRule {
    pub target: f32,
    pub tolerance: f32,
    pub issue: FormIssue,
}

impl PostureRule {
    pub fn is_violated(&self, angle: f32) -> bool {
        (angle - self.target).abs() > self.tolerance
    }
}

/// 対応している種目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    PullUp,
    Squat,
    ShoulderAbduction,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [
        ExerciseKind::PullUp,
        ExerciseKind::Squat,
        ExerciseKind::ShoulderAbduction,
    ];

    /// ワイヤ上の名前
    pub fn name(&self) -> &'static str {
        match self {
            ExerciseKind::PullUp => "pullup",
            ExerciseKind::Squat => "squat",
            ExerciseKind::ShoulderAbduction => "shoulderabduction",
        }
    }

    /// 表示用の名前
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::PullUp => "Pull-up",
            ExerciseKind::Squat => "Squat",
            ExerciseKind::ShoulderAbduction => "Shoulder abduction",
        }
    }

    /// レップカウントに使う主角度
    ///
    /// - PullUp: 肘-肩-腰 (脇の角度)
    /// - Squat: 腰-膝-足首 (膝の角度)
    /// - ShoulderAbduction: 腰-肩-肘 (腕の角度)
    pub fn primary_joints(&self) -> JointTriple {
        use LandmarkIndex::*;
        match self {
            ExerciseKind::PullUp => JointTriple::new(RightElbow, RightShoulder, RightHip),
            ExerciseKind::Squat => JointTriple::new(RightHip, RightKnee, RightAnkle),
            ExerciseKind::ShoulderAbduction => JointTriple::new(RightHip, RightShoulder, RightElbow),
        }
    }

    /// フォームチェック用の姿勢角度
    ///
    /// - PullUp: 肩-腰-足首 (体の一直線)
    /// - Squat: 肩-腰-膝 (上体)
    /// - ShoulderAbduction: 肩-肘-手首 (肘の伸び)
    pub fn posture_joints(&self) -> JointTriple {
        use LandmarkIndex::*;
        match self {
            ExerciseKind::PullUp => JointTriple::new(RightShoulder, RightHip, RightAnkle),
            ExerciseKind::Squat => JointTriple::new(RightShoulder, RightHip, RightKnee),
            ExerciseKind::ShoulderAbduction => JointTriple::new(RightShoulder, RightElbow, RightWrist),
        }
    }

    /// この種目が参照するランドマーク
    pub fn landmarks(&self) -> [LandmarkIndex; 6] {
        let [a, b, c] = self.primary_joints().indices();
        let [d, e, f] = self.posture_joints().indices();
        [a, b, c, d, e, f]
    }

    pub fn rep_rule(&self) -> RepRule {
        match self {
            ExerciseKind::PullUp => RepRule {
                entry: Threshold::Below(90.0),
                entry_stage: Stage::Up,
                complete: Threshold::Above(160.0),
                complete_stage: Stage::Down,
            },
            // 膝を曲げた姿勢を "down" と呼ぶ
            ExerciseKind::Squat => RepRule {
                entry: Threshold::Below(120.0),
                entry_stage: Stage::Down,
                complete: Threshold::Above(160.0),
                complete_stage: Stage::Up,
            },
            ExerciseKind::ShoulderAbduction => RepRule {
                entry: Threshold::Above(120.0),
                entry_stage: Stage::Up,
                complete: Threshold::Below(60.0),
                complete_stage: Stage::Down,
            },
        }
    }

    pub fn stage_rules(&self) -> [StageRule; 2] {
        match self {
            ExerciseKind::PullUp => [
                StageRule { stage: Stage::Up, violation: Threshold::Above(70.0), issue: FormIssue::PullHigher },
                StageRule { stage: Stage::Down, violation: Threshold::Below(160.0), issue: FormIssue::LowerFully },
            ],
            ExerciseKind::Squat => [
                StageRule { stage: Stage::Down, violation: Threshold::Above(120.0), issue: FormIssue::GoDeeper },
                StageRule { stage: Stage::Up, violation: Threshold::Below(160.0), issue: FormIssue::StandUpFully },
            ],
            ExerciseKind::ShoulderAbduction => [
                StageRule { stage: Stage::Up, violation: Threshold::Below(120.0), issue: FormIssue::RaiseArmsHigher },
                StageRule { stage: Stage::Down, violation: Threshold::Above(60.0), issue: FormIssue::LowerArmsFully },
            ],
        }
    }

    pub fn posture_rule(&self) -> PostureRule {
        match self {
            ExerciseKind::PullUp => PostureRule { target: 180.0, tolerance: 10.0, issue: FormIssue::BodySwinging },
            ExerciseKind::Squat => PostureRule { target: 90.0, tolerance: 20.0, issue: FormIssue::KeepTorsoUpright },
            ExerciseKind::ShoulderAbduction => PostureRule { target: 180.0, tolerance: 15.0, issue: FormIssue::KeepArmsStraight },
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown exercise: {0}")]
pub struct UnknownExercise(pub String);

impl FromStr for ExerciseKind {
    type Err = UnknownExercise;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pullup" => Ok(ExerciseKind::PullUp),
            "squat" => Ok(ExerciseKind::Squat),
            "shoulderabduction" => Ok(ExerciseKind::ShoulderAbduction),
            _ => Err(UnknownExercise(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("pullup".parse::<ExerciseKind>(), Ok(ExerciseKind::PullUp));
        assert_eq!("Pull-Up".parse::<ExerciseKind>(), Ok(ExerciseKind::PullUp));
        assert_eq!("pull_up".parse::<ExerciseKind>(), Ok(ExerciseKind::PullUp));
        assert_eq!(" SQUAT ".parse::<ExerciseKind>(), Ok(ExerciseKind::Squat));
        assert_eq!("shoulder-abduction".parse::<ExerciseKind>(), Ok(ExerciseKind::ShoulderAbduction));
        assert_eq!("shoulderabduction".parse::<ExerciseKind>(), Ok(ExerciseKind::ShoulderAbduction));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "deadlift".parse::<ExerciseKind>(),
            Err(UnknownExercise("deadlift".to_string()))
        );
    }

    #[test]
    fn test_name_parses_back() {
        for kind in ExerciseKind::ALL {
            assert_eq!(kind.name().parse::<ExerciseKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&ExerciseKind::PullUp).unwrap(), "\"pullup\"");
        assert_eq!(
            serde_json::to_string(&ExerciseKind::ShoulderAbduction).unwrap(),
            "\"shoulderabduction\""
        );
        assert_eq!(serde_json::to_string(&Some(Stage::Down)).unwrap(), "\"down\"");
        assert_eq!(serde_json::to_string(&None::<Stage>).unwrap(), "null");
    }

    #[test]
    fn test_hysteresis_gap() {
        // entry と complete の閾値は隣接しない
        for kind in ExerciseKind::ALL {
            let rule = kind.rep_rule();
            let gap = match (rule.entry, rule.complete) {
                (Threshold::Below(lo), Threshold::Above(hi)) => hi - lo,
                (Threshold::Above(hi), Threshold::Below(lo)) => hi - lo,
                _ => 0.0,
            };
            assert!(gap >= 40.0, "{} gap {}", kind, gap);
            assert_ne!(rule.entry_stage, rule.complete_stage);
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!Threshold::Below(90.0).is_met(90.0));
        assert!(Threshold::Below(90.0).is_met(89.9));
        assert!(!Threshold::Above(160.0).is_met(160.0));
        assert!(Threshold::Above(160.0).is_met(160.1));
    }

    #[test]
    fn test_threshold_deeper() {
        assert_eq!(Threshold::Below(90.0).deeper(80.0, 60.0), 60.0);
        assert_eq!(Threshold::Above(120.0).deeper(130.0, 150.0), 150.0);
    }

    #[test]
    fn test_posture_rule_boundary() {
        let rule = ExerciseKind::PullUp.posture_rule();
        assert!(!rule.is_violated(170.0));
        assert!(rule.is_violated(169.0));
    }

    #[test]
    fn test_landmarks() {
        let lms = ExerciseKind::ShoulderAbduction.landmarks();
        assert!(lms.contains(&LandmarkIndex::RightWrist));
        assert!(lms.contains(&LandmarkIndex::RightHip));
    }
}
