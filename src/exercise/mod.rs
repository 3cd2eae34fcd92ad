pub mod counter;
pub mod kind;
pub mod rules;
pub mod synth;

pub use counter::RepCounter;
pub use kind::{ExerciseKind, PostureRule, RepRule, Stage, StageRule, Threshold, UnknownExercise};
pub use rules::{check_form, evaluate, form_score, FormAngles, FormFeedback, FormIssue};
pub use synth::pose_with_angles;
