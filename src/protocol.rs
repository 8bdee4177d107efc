//! TCP protocol for analysis clients ↔ analysis server.
//!
//! Length-delimited frames carrying bincode-encoded messages.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::pipeline::{AnalysisReport, CoachingResult};
use crate::pose::PoseFrame;
use crate::swing::LiveAssessment;

// --- Message types ---

/// Client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Run the pipeline over an extracted session.
    Analyze { session_id: String, skill: Option<String> },
    /// Coaching text from a session's persisted feedback.
    Coach {
        session_id: String,
        skill: Option<String>,
        question: Option<String>,
    },
    /// Append one pose to this connection's live window.
    LiveFrame { frame: PoseFrame },
    /// Evaluate the live window.
    LiveAssess,
    LiveReset,
}

/// Server → client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Analysis { report: AnalysisReport },
    Coaching { result: CoachingResult },
    /// `None` until the window holds `min_frames` poses.
    Live { assessment: Option<LiveAssessment> },
    LiveFrameAck { buffered: usize },
    LiveReset,
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
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match recv_message_opt(stream).await? {
        Some(msg) => Ok(msg),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}

/// Like `recv_message`, but a clean close yields `Ok(None)`.
pub async fn recv_message_opt<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
