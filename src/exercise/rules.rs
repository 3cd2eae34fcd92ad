use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pose::Pose;

use super::kind::{ExerciseKind, Stage};

pub const NO_PERSON_MESSAGE: &str = "No person detected.";
pub const FEEDBACK_SEPARATOR: &str = " | ";

// スコア: 100点から指摘1件ごとに10点減点 (減点は最大50点)
pub const BASE_SCORE: u32 = 100;
pub const ISSUE_DEDUCTION: u32 = 10;
pub const MAX_DEDUCTION: u32 = 50;

/// 指摘の一覧からフォームスコア (50〜100) を計算
pub fn form_score(issues: &[FormIssue]) -> u32 {
    let deduction = (issues.len() as u32).saturating_mul(ISSUE_DEDUCTION);
    BASE_SCORE - deduction.min(MAX_DEDUCTION)
}

/// フォーム上の問題点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormIssue {
    PullHigher,
    LowerFully,
    BodySwinging,
    GoDeeper,
    StandUpFully,
    KeepTorsoUpright,
    RaiseArmsHigher,
    LowerArmsFully,
    KeepArmsStraight,
}

impl FormIssue {
    pub fn message(&self) -> &'static str {
        match self {
            FormIssue::PullHigher => "Pull higher, arms not bending enough.",
            FormIssue::LowerFully => "Lower fully, arms not straight enough.",
            FormIssue::BodySwinging => "Body is swinging, keep stable.",
            FormIssue::GoDeeper => "Go deeper, knees not bending enough.",
            FormIssue::StandUpFully => "Stand up fully, knees not straight enough.",
            FormIssue::KeepTorsoUpright => "Keep torso upright, avoid leaning.",
            FormIssue::RaiseArmsHigher => "Raise arms higher, not reaching the top.",
            FormIssue::LowerArmsFully => "Lower arms fully to your sides.",
            FormIssue::KeepArmsStraight => "Keep arms straight, elbows are bending.",
        }
    }
}

impl fmt::Display for FormIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// ルール評価に使う角度のスナップショット
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormAngles {
    /// レップカウントと同じ主角度
    pub primary: f32,
    /// 姿勢角度 (体の一直線 / 上体 / 肘の伸び)
    pub posture: f32,
}

impl FormAngles {
    pub fn measure(pose: &Pose, exercise: ExerciseKind) -> Self {
        Self {
            primary: exercise.primary_joints().angle(pose),
            posture: exercise.posture_joints().angle(pose),
        }
    }
}

/// 1フレーム分のフォーム判定結果
#[derive(Debug, Clone, PartialEq)]
pub enum FormFeedback {
    NoPerson,
    Checked {
        exercise: ExerciseKind,
        issues: Vec<FormIssue>,
    },
}

impl FormFeedback {
    pub fn issues(&self) -> &[FormIssue] {
        match self {
            FormFeedback::NoPerson => &[],
            FormFeedback::Checked { issues, .. } => issues,
        }
    }

    /// 人物がいないフレームはスコアなし
    pub fn score(&self) -> Option<u32> {
        match self {
            FormFeedback::NoPerson => None,
            FormFeedback::Checked { issues, .. } => Some(form_score(issues)),
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, FormFeedback::Checked { issues, .. } if issues.is_empty())
    }
}

impl fmt::Display for FormFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormFeedback::NoPerson => f.write_str(NO_PERSON_MESSAGE),
            FormFeedback::Checked { exercise, issues } if issues.is_empty() => {
                write!(f, "{} form is good!", exercise.label())
            }
            FormFeedback::Checked { issues, .. } => {
                for (i, issue) in issues.iter().enumerate() {
                    if i > 0 {
                        f.write_str(FEEDBACK_SEPARATOR)?;
                    }
                    f.write_str(issue.message())?;
                }
                Ok(())
            }
        }
    }
}

/// 角度スナップショットに対してルールを評価
///
/// 各ルールは独立に評価され、結果の順序はルール表の順序。
pub fn evaluate(exercise: ExerciseKind, stage: Option<Stage>, angles: &FormAngles) -> Vec<FormIssue> {
    let mut issues = Vec::new();

    for rule in exercise.stage_rules() {
        if stage == Some(rule.stage) && rule.violation.is_met(angles.primary) {
            issues.push(rule.issue);
        }
    }

    let posture = exercise.posture_rule();
    if posture.is_violated(angles.posture) {
        issues.push(posture.issue);
    }

    issues
}

/// 姿勢とステージからフォームをチェック
pub fn check_form(pose: Option<&Pose>, stage: Option<Stage>, exercise: ExerciseKind) -> FormFeedback {
    let Some(pose) = pose else {
        return FormFeedback::NoPerson;
    };

    let angles = FormAngles::measure(pose, exercise);
    FormFeedback::Checked {
        exercise,
        issues: evaluate(exercise, stage, &angles),
    }
}
