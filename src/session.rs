use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::exercise::{check_form, form_score, ExerciseKind, FormIssue, RepCounter, Stage, Threshold};
use crate::pose::{Pose, PoseError};
use crate::protocol::{ClientMessage, FrameReport, RepMetric, ServerMessage, SessionSummary};

/// 重複を除いて指摘を追加 (初出順)
fn push_distinct(seen: &mut Vec<FormIssue>, issues: &[FormIssue]) {
    for issue in issues {
        if !seen.contains(issue) {
            seen.push(*issue);
        }
    }
}

/// 進行中のレップ
#[derive(Debug, Clone)]
struct RepProgress {
    start_frame: u64,
    peak: Option<f32>,
    issues: Vec<FormIssue>,
}

impl RepProgress {
    fn starting_at(frame: u64) -> Self {
        Self {
            start_frame: frame,
            peak: None,
            issues: Vec::new(),
        }
    }

    fn observe(&mut self, entry: Threshold, angle: f32, issues: &[FormIssue]) {
        self.peak = Some(match self.peak {
            Some(peak) => entry.deeper(peak, angle),
            None => angle,
        });
        push_distinct(&mut self.issues, issues);
    }

    fn finish(self, rep_index: u32, end_frame: u64) -> RepMetric {
        RepMetric {
            rep_index,
            start_frame: self.start_frame,
            end_frame,
            peak_angle: self.peak.unwrap_or(0.0),
            score: form_score(&self.issues),
            issues: self.issues,
        }
    }
}

/// 1ユーザー分の解析セッション
///
/// カウンターはセッションが専有し、種目が変わると作り直す。
/// 完了したレップごとにフレーム範囲・最深角度・指摘・スコアを記録する。
#[derive(Debug, Clone)]
pub struct Session {
    counter: RepCounter,
    min_visibility: f32,
    frame: u64,
    current: RepProgress,
    reps: Vec<RepMetric>,
    issues: Vec<FormIssue>,
}

impl Session {
    pub fn new(exercise: ExerciseKind) -> Self {
        Self {
            counter: RepCounter::new(exercise),
            min_visibility: 0.0,
            frame: 0,
            current: RepProgress::starting_at(0),
            reps: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn from_config(exercise: ExerciseKind, config: &AnalysisConfig) -> Self {
        Self::new(exercise).with_min_visibility(config.min_visibility)
    }

    /// 可視度の閾値を設定
    pub fn with_min_visibility(mut self, threshold: f32) -> Self {
        self.min_visibility = threshold;
        self
    }

    pub fn exercise(&self) -> ExerciseKind {
        self.counter.exercise()
    }

    pub fn count(&self) -> u32 {
        self.counter.count()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.counter.stage()
    }

    /// 種目を切り替える
    ///
    /// 種目が変わった場合は true を返し、カウントとステージを初期化する。
    pub fn set_exercise(&mut self, exercise: ExerciseKind) -> bool {
        if exercise == self.counter.exercise() {
            return false;
        }
        self.counter = RepCounter::new(exercise);
        self.clear_history();
        true
    }

    pub fn reset(&mut self) {
        self.counter.reset();
        self.clear_history();
    }

    fn clear_history(&mut self) {
        self.current = RepProgress::starting_at(self.frame);
        self.reps.clear();
        self.issues.clear();
    }

    /// 1フレームを解析
    ///
    /// カウンターを先に更新し、更新後のステージでフォームをチェックする。
    pub fn analyze(&mut self, pose: Option<&Pose>) -> FrameReport {
        let exercise = self.exercise();
        let pose = pose.filter(|p| p.all_visible(&exercise.landmarks(), self.min_visibility));
        let frame = self.frame;
        self.frame += 1;

        let before = self.counter.count();
        let (count, primary_angle) = self.counter.update(pose);
        let feedback = check_form(pose, self.counter.stage(), exercise);

        if pose.is_some() {
            self.current.observe(exercise.rep_rule().entry, primary_angle, feedback.issues());
            push_distinct(&mut self.issues, feedback.issues());
        }
        if count > before {
            let done = std::mem::replace(&mut self.current, RepProgress::starting_at(frame + 1));
            self.reps.push(done.finish(count, frame));
        }

        FrameReport {
            exercise,
            count,
            stage: self.counter.stage(),
            primary_angle,
            feedback: feedback.to_string(),
            score: feedback.score(),
            has_pose: pose.is_some(),
        }
    }

    /// 最後のリセット以降の集計
    pub fn summary(&self) -> SessionSummary {
        let avg_score = if self.reps.is_empty() {
            None
        } else {
            let total: u32 = self.reps.iter().map(|r| r.score).sum();
            Some(total as f32 / self.reps.len() as f32)
        };
        SessionSummary {
            exercise: self.exercise(),
            reps: self.count(),
            avg_score,
            issues: self.issues.clone(),
            rep_metrics: self.reps.clone(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("session {0} belongs to another connection")]
    NotOwner(String),
    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// 最初のフレームを送った接続がセッションの所有者
#[derive(Debug)]
struct OwnedSession {
    owner: SocketAddr,
    session: Session,
}

/// セッションIDごとのセッション管理
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, OwnedSession>,
    config: AnalysisConfig,
}

impl SessionRegistry {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn owned_mut(&mut self, client: SocketAddr, session_id: &str) -> Result<&mut Session, SessionError> {
        match self.sessions.get_mut(session_id) {
            Some(entry) if entry.owner == client => Ok(&mut entry.session),
            Some(_) => Err(SessionError::NotOwner(session_id.to_string())),
            None => Err(SessionError::UnknownSession(session_id.to_string())),
        }
    }

    /// 1フレームを解析。セッションがなければ `client` の所有として作成する
    pub fn analyze(
        &mut self,
        client: SocketAddr,
        session_id: &str,
        exercise: ExerciseKind,
        pose: Option<&Pose>,
    ) -> Result<FrameReport, SessionError> {
        let config = &self.config;
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| OwnedSession {
                owner: client,
                session: Session::from_config(exercise, config),
            });

        let session = self.owned_mut(client, session_id)?;
        session.set_exercise(exercise);
        Ok(session.analyze(pose))
    }

    pub fn reset(&mut self, client: SocketAddr, session_id: &str) -> Result<(), SessionError> {
        self.owned_mut(client, session_id)?.reset();
        Ok(())
    }

    pub fn end(&mut self, client: SocketAddr, session_id: &str) -> Result<SessionSummary, SessionError> {
        self.owned_mut(client, session_id)?;
        let ended = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        Ok(ended.session.summary())
    }

    /// `client` が所有するセッションをすべて終了
    pub fn end_client(&mut self, client: SocketAddr) -> Vec<(String, SessionSummary)> {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.owner == client)
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                let ended = self.sessions.remove(&id)?;
                Some((id, ended.session.summary()))
            })
            .collect()
    }

    /// クライアントメッセージを処理して応答を返す
    pub fn handle(&mut self, client: SocketAddr, msg: ClientMessage) -> ServerMessage {
        self.dispatch(client, msg)
            .unwrap_or_else(|e| ServerMessage::Error { message: e.to_string() })
    }

    fn dispatch(&mut self, client: SocketAddr, msg: ClientMessage) -> Result<ServerMessage, SessionError> {
        Ok(match msg {
            ClientMessage::AnalyzeFrame { session_id, exercise, landmarks } => {
                let pose = Pose::from_landmarks(&landmarks)?;
                let report = self.analyze(client, &session_id, exercise, pose.as_ref())?;
                ServerMessage::Report { session_id, report }
            }
            ClientMessage::ResetCounter { session_id } => {
                self.reset(client, &session_id)?;
                ServerMessage::CounterReset { session_id, reps: 0 }
            }
            ClientMessage::EndSession { session_id } => {
                let summary = self.end(client, &session_id)?;
                ServerMessage::SessionEnded { session_id, summary }
            }
            ClientMessage::Health => ServerMessage::Healthy {
                version: env!("CARGO_PKG_VERSION").to_string(),
                sessions: self.len(),
            },
        })
    }
}
