use crate::pose::Pose;

use super::kind::{ExerciseKind, Stage};

/// 1種目ぶんのレップカウンター
///
/// ステージ遷移は `ExerciseKind::rep_rule` のヒステリシスに従う。
/// 完了側の遷移 (元の姿勢に戻った時) でだけカウントする。
#[derive(Debug, Clone)]
pub struct RepCounter {
    exercise: ExerciseKind,
    count: u32,
    stage: Option<Stage>,
}

impl RepCounter {
    pub fn new(exercise: ExerciseKind) -> Self {
        Self {
            exercise,
            count: 0,
            stage: None,
        }
    }

    pub fn exercise(&self) -> ExerciseKind {
        self.exercise
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    /// 1フレーム分の姿勢でカウンターを進める
    ///
    /// 人物がいない場合 (`None`) は状態を変えず、角度 0.0 を返す。
    pub fn update(&mut self, pose: Option<&Pose>) -> (u32, f32) {
        let Some(pose) = pose else {
            return (self.count, 0.0);
        };

        let angle = self.exercise.primary_joints().angle(pose);
        self.advance(angle);
        (self.count, angle)
    }

    /// 主角度を直接与えてステージを進める
    pub fn advance(&mut self, angle: f32) -> u32 {
        let rule = self.exercise.rep_rule();

        if rule.entry.is_met(angle) {
            self.stage = Some(rule.entry_stage);
        }

        if rule.complete.is_met(angle) && self.stage == Some(rule.entry_stage) {
            self.stage = Some(rule.complete_stage);
            self.count += 1;
        }

        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.stage = None;
    }
}
