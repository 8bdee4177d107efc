//! Analysis server: runs session analysis, coaching and live swing assessment
//! for TCP clients.
//!
//! Each connection owns its own live window; nothing is shared between
//! connections except the pipeline configuration and the log file.

use std::sync::Arc;

use anyhow::{Context, Result};

use swing_coach::coaching::{OfflineCoach, DEFAULT_SKILL};
use swing_coach::config::Config;
use swing_coach::log;
use swing_coach::logging::{open_log_file, LogFile};
use swing_coach::pipeline::Pipeline;
use swing_coach::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use swing_coach::swing::LiveSession;

const CONFIG_PATH: &str = "config.toml";

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

async fn handle_request(
    msg: ClientMessage,
    pipeline: &Arc<Pipeline>,
    live: &mut LiveSession,
) -> Result<ServerMessage> {
    let reply = match msg {
        ClientMessage::Analyze { session_id, skill } => {
            let skill = skill.unwrap_or_else(|| DEFAULT_SKILL.to_string());
            let pipeline = Arc::clone(pipeline);
            let report = tokio::task::spawn_blocking(move || {
                pipeline.analyze_session(&session_id, &skill)
            })
            .await??;
            ServerMessage::Analysis { report }
        }
        ClientMessage::Coach {
            session_id,
            skill,
            question,
        } => {
            let skill = skill.unwrap_or_else(|| DEFAULT_SKILL.to_string());
            let pipeline = Arc::clone(pipeline);
            let result = tokio::task::spawn_blocking(move || {
                pipeline.coach(&session_id, &skill, question.as_deref(), &OfflineCoach)
            })
            .await??;
            ServerMessage::Coaching { result }
        }
        ClientMessage::LiveFrame { frame } => {
            live.push(frame)?;
            ServerMessage::LiveFrameAck {
                buffered: live.len(),
            }
        }
        ClientMessage::LiveAssess => ServerMessage::Live {
            assessment: live.assess()?,
        },
        ClientMessage::LiveReset => {
            live.reset();
            ServerMessage::LiveReset
        }
    };
    Ok(reply)
}

async fn run_connection(
    mut stream: MessageStream,
    pipeline: Arc<Pipeline>,
    logfile: LogFile,
    peer: std::net::SocketAddr,
) -> Result<()> {
    let mut live = LiveSession::from_config(pipeline.config());

    while let Some(msg) = protocol::recv_message_opt::<ClientMessage>(&mut stream).await? {
        let kind = match &msg {
            ClientMessage::Analyze { session_id, .. } => format!("analyze {}", session_id),
            ClientMessage::Coach { session_id, .. } => format!("coach {}", session_id),
            ClientMessage::LiveFrame { frame } => format!("live frame {}", frame.frame_id),
            ClientMessage::LiveAssess => "live assess".to_string(),
            ClientMessage::LiveReset => "live reset".to_string(),
        };

        let reply = match handle_request(msg, &pipeline, &mut live).await {
            Ok(reply) => reply,
            Err(e) => {
                log!(logfile, "[{}] {} failed: {:#}", peer, kind, e);
                ServerMessage::Error {
                    message: format!("{:#}", e),
                }
            }
        };
        if let ServerMessage::Analysis { report } = &reply {
            log!(
                logfile,
                "[{}] {} → {} phases, {}",
                peer,
                kind,
                report.phase_count,
                report.techniques_detected.join("; ")
            );
        }
        protocol::send_message(&mut stream, &reply).await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    let (logfile, _log_path) = open_log_file("analysis")?;

    log!(logfile, "Analysis Server ({})", env!("GIT_VERSION"));
    log!(logfile, "Listen: {}", config.server.listen_addr);
    log!(logfile, "Data dir: {}", config.storage.data_dir.display());
    log!(
        logfile,
        "Live window: {} frames (min {})",
        config.live.buffer_size,
        config.live.min_frames
    );

    let bind_addr: std::net::SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid listen_addr")?;
    let pipeline = Arc::new(Pipeline::new(config).with_log(logfile.clone()));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log!(logfile, "Listening on {}", bind_addr);

    loop {
        let (tcp_stream, addr) = listener.accept().await?;
        tcp_stream.set_nodelay(true)?;
        log!(logfile, "Client connected: {}", addr);

        let pipeline = Arc::clone(&pipeline);
        let logfile = logfile.clone();
        tokio::spawn(async move {
            let stream = protocol::message_stream(tcp_stream);
            match run_connection(stream, pipeline, logfile.clone(), addr).await {
                Ok(()) => log!(logfile, "Client disconnected: {}", addr),
                Err(e) => log!(logfile, "Client {} error: {:#}", addr, e),
            }
        });
    }
}
