//! TCP protocol between pose clients and the coach server.
//!
//! Messages are bincode-encoded and framed with a length prefix.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::exercise::{ExerciseKind, FormIssue, Stage};
use crate::pose::Landmark;

/// Per-frame result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub exercise: ExerciseKind,
    pub count: u32,
    pub stage: Option<Stage>,
    /// Primary joint angle in degrees, 0.0 when no person was visible.
    pub primary_angle: f32,
    pub feedback: String,
    /// Form score 50-100, `None` when no person was visible.
    pub score: Option<u32>,
    pub has_pose: bool,
}

/// One completed repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepMetric {
    /// 1-based, equals the count after this rep.
    pub rep_index: u32,
    /// Frame span (session frame numbers, inclusive).
    pub start_frame: u64,
    pub end_frame: u64,
    /// Deepest primary angle reached during the rep.
    pub peak_angle: f32,
    /// Distinct issues seen during the rep, in first-seen order.
    pub issues: Vec<FormIssue>,
    pub score: u32,
}

/// Returned when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub exercise: ExerciseKind,
    pub reps: u32,
    /// Mean rep score, `None` before the first rep.
    pub avg_score: Option<f32>,
    /// Distinct issues seen since the counter was last reset.
    pub issues: Vec<FormIssue>,
    pub rep_metrics: Vec<RepMetric>,
}

// --- Message types ---

/// Client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// One frame of landmarks. An empty list means no person was detected.
    AnalyzeFrame {
        session_id: String,
        exercise: ExerciseKind,
        landmarks: Vec<Landmark>,
    },
    ResetCounter { session_id: String },
    EndSession { session_id: String },
    Health,
}

/// Server → client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Report { session_id: String, report: FrameReport },
    CounterReset { session_id: String, reps: u32 },
    SessionEnded { session_id: String, summary: SessionSummary },
    Healthy { version: String, sessions: usize },
    Error { message: String },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024) // 16MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    send_to_sink(stream, msg).await
}

/// Send on any byte sink, e.g. the write half of a split stream.
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
