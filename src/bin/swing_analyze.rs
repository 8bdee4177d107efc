//! Run swing analysis for one session (or one pose directory) and print the
//! report as JSON.
//!
//! Usage:
//!   swing_analyze <session_id> [--skill NAME] [--config PATH]
//!   swing_analyze --pose-dir DIR [--out DIR] [--config PATH]
//!
//! Without `--out`, results go to `DIR/analysis/`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use swing_coach::coaching::DEFAULT_SKILL;
use swing_coach::config::Config;
use swing_coach::log;
use swing_coach::logging::open_log_file;
use swing_coach::pipeline::{pose_dir_outputs, Pipeline};

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug)]
struct Args {
    session_id: Option<String>,
    pose_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    skill: String,
    config_path: String,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        session_id: None,
        pose_dir: None,
        out_dir: None,
        skill: DEFAULT_SKILL.to_string(),
        config_path: CONFIG_PATH.to_string(),
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--skill" => args.skill = it.next().context("--skill needs a value")?,
            "--config" => args.config_path = it.next().context("--config needs a value")?,
            "--pose-dir" => {
                args.pose_dir = Some(it.next().context("--pose-dir needs a value")?.into())
            }
            "--out" => args.out_dir = Some(it.next().context("--out needs a value")?.into()),
            "-h" | "--help" => {
                eprintln!("usage: swing_analyze <session_id> [--skill NAME] [--config PATH]");
                eprintln!("       swing_analyze --pose-dir DIR [--out DIR] [--config PATH]");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown option: {}", other),
            other => {
                if args.session_id.is_some() {
                    bail!("unexpected argument: {}", other);
                }
                args.session_id = Some(other.to_string());
            }
        }
    }

    if args.session_id.is_none() && args.pose_dir.is_none() {
        bail!("either <session_id> or --pose-dir is required (see --help)");
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load_or_default(&args.config_path);
    let (logfile, _) = open_log_file("analyze")?;

    log!(logfile, "swing_analyze ({})", env!("GIT_VERSION"));
    log!(logfile, "Data dir: {}", config.storage.data_dir.display());
    log!(
        logfile,
        "Thresholds: ready<{} backswing<-{} contact>{}deg/{} missing_joints={:?}",
        config.segmenter.ready_velocity,
        config.segmenter.backswing_velocity,
        config.segmenter.contact_angle,
        config.segmenter.contact_velocity,
        config.segmenter.missing_joints,
    );

    let pipeline = Pipeline::new(config).with_log(logfile.clone());

    let json = match (&args.pose_dir, &args.session_id) {
        (Some(pose_dir), _) => {
            let (phase_file, feedback_file) = pose_dir_outputs(pose_dir, args.out_dir.as_deref());
            let analysis = pipeline.analyze_pose_dir(pose_dir, &phase_file, &feedback_file)?;
            serde_json::to_string_pretty(&serde_json::json!({
                "pose_count": analysis.pose_count,
                "phase_count": analysis.phases.len(),
                "feedback": analysis.feedback,
                "phase_file": phase_file,
                "feedback_file": feedback_file,
            }))?
        }
        (None, Some(session_id)) => {
            let report = pipeline.analyze_session(session_id, &args.skill)?;
            for item in &report.feedback {
                log!(logfile, "- [{}] {}", item.code, item.issue);
                log!(logfile, "  Tip: {}", item.tip);
            }
            serde_json::to_string_pretty(&report)?
        }
        (None, None) => unreachable!("checked in parse_args"),
    };

    println!("{}", json);
    Ok(())
}
