//! Session coordinator: pose files → phase timeline → feedback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::coaching::{self, CoachingBackend, FALLBACK_COACHING};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::logging::LogFile;
use crate::pose::{self, PoseFrame};
use crate::swing::{FeedbackItem, PhaseRecord, PhaseSegmenter, RuleEvaluator};

/// セッションのファイル配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub video_dir: PathBuf,
    pub frame_dir: PathBuf,
    pub pose_dir: PathBuf,
    pub phase_file: PathBuf,
    pub feedback_file: PathBuf,
}

impl SessionPaths {
    pub fn new<P: AsRef<Path>>(data_dir: P, session_id: &str) -> Result<Self, AnalysisError> {
        validate_session_id(session_id)?;
        let root = data_dir.as_ref();
        Ok(Self {
            video_dir: root.join("video").join(session_id),
            frame_dir: root.join("frame").join(session_id),
            pose_dir: root.join("pose").join(session_id),
            phase_file: root.join("phase").join(format!("{}_phases.json", session_id)),
            feedback_file: root.join("feedback").join(format!("{}_feedback.json", session_id)),
        })
    }
}

/// セッションIDはパス1要素分のみ許可
fn validate_session_id(session_id: &str) -> Result<(), AnalysisError> {
    let valid = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && !session_id.contains(['/', '\\'])
        && !session_id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(AnalysisError::InvalidSessionId(session_id.to_string()))
    }
}

/// `--pose-dir` 実行時の出力ファイル (phases, feedback)
///
/// 出力先の指定が無ければ `<pose_dir>/analysis/` に置く。ポーズファイルの列挙は
/// サブディレクトリを見ないので、再実行しても出力を読み込まない。
pub fn pose_dir_outputs(pose_dir: &Path, out_dir: Option<&Path>) -> (PathBuf, PathBuf) {
    let out_dir = out_dir.map_or_else(|| pose_dir.join("analysis"), Path::to_path_buf);
    (out_dir.join("phases.json"), out_dir.join("feedback.json"))
}

/// 1回の解析結果（メモリ上）
#[derive(Debug, Clone, PartialEq)]
pub struct SwingAnalysis {
    pub pose_count: usize,
    pub phases: Vec<PhaseRecord>,
    pub feedback: Vec<FeedbackItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: String,
    pub skill: String,
    pub pose_count: usize,
    pub phase_count: usize,
    pub techniques_detected: Vec<String>,
    pub feedback: Vec<FeedbackItem>,
    pub phase_file: PathBuf,
    pub feedback_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingResult {
    pub session_id: String,
    pub skill: String,
    pub reply: String,
    pub raw_feedback: Vec<FeedbackItem>,
}

pub struct Pipeline {
    config: Config,
    segmenter: PhaseSegmenter,
    evaluator: RuleEvaluator,
    logfile: Option<LogFile>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            segmenter: PhaseSegmenter::new(config.segmenter.clone()),
            evaluator: RuleEvaluator::new(config.rules.clone()),
            config,
            logfile: None,
        }
    }

    pub fn with_log(mut self, logfile: LogFile) -> Self {
        self.logfile = Some(logfile);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_paths(&self, session_id: &str) -> Result<SessionPaths, AnalysisError> {
        SessionPaths::new(&self.config.storage.data_dir, session_id)
    }

    fn note(&self, msg: String) {
        match &self.logfile {
            Some(logfile) => crate::log!(logfile, "{}", msg),
            None => eprintln!("{}", msg),
        }
    }

    /// メモリ上のフレームを解析
    ///
    /// frame_id で安定ソートしてから判定する。同じ frame_id があればエラー。
    pub fn analyze_frames(&self, mut frames: Vec<PoseFrame>) -> Result<SwingAnalysis, AnalysisError> {
        frames.sort_by(|a, b| a.frame_id.cmp(&b.frame_id));
        check_unique(&frames)?;

        let phases = self.segmenter.segment(&frames)?;
        let feedback = self.evaluator.evaluate(&phases);
        Ok(SwingAnalysis {
            pose_count: frames.len(),
            phases,
            feedback,
        })
    }

    /// ポーズディレクトリ全体を解析し、フェーズ列とフィードバックを保存
    pub fn analyze_pose_dir(
        &self,
        pose_dir: &Path,
        phase_file: &Path,
        feedback_file: &Path,
    ) -> Result<SwingAnalysis> {
        let frames = pose::load_pose_dir(pose_dir)?;
        let pose_count = frames.len();
        // ファイル名順のまま判定する（frame_id で並べ替えない）
        check_unique(&frames)?;

        let phases = self.segmenter.segment(&frames)?;
        write_json(phase_file, &phases)?;
        self.note(format!(
            "[pipeline] {} poses → {} phases: {}",
            pose_count,
            phases.len(),
            phase_file.display()
        ));

        let feedback = self.evaluator.evaluate(&phases);
        write_json(feedback_file, &feedback)?;
        for item in &feedback {
            self.note(format!("[pipeline] [{}] {} ({:?})", item.code, item.issue, item.severity));
        }

        Ok(SwingAnalysis {
            pose_count,
            phases,
            feedback,
        })
    }

    /// セッションを解析してレポートを返す
    pub fn analyze_session(&self, session_id: &str, skill: &str) -> Result<AnalysisReport> {
        let paths = self.session_paths(session_id)?;
        if !paths.pose_dir.is_dir() {
            return Err(AnalysisError::SessionNotFound(session_id.to_string()).into());
        }
        self.note(format!("[pipeline] session {} ({})", session_id, skill));

        let analysis = self.analyze_pose_dir(&paths.pose_dir, &paths.phase_file, &paths.feedback_file)?;

        Ok(AnalysisReport {
            session_id: session_id.to_string(),
            skill: skill.to_string(),
            pose_count: analysis.pose_count,
            phase_count: analysis.phases.len(),
            techniques_detected: analysis.feedback.iter().map(FeedbackItem::summary).collect(),
            feedback: analysis.feedback,
            phase_file: paths.phase_file,
            feedback_file: paths.feedback_file,
        })
    }

    pub fn load_feedback(&self, session_id: &str) -> Result<Vec<FeedbackItem>> {
        let paths = self.session_paths(session_id)?;
        if !paths.feedback_file.is_file() {
            return Err(AnalysisError::FeedbackNotFound(session_id.to_string()).into());
        }
        read_json(&paths.feedback_file)
    }

    /// 保存済みフィードバックからコーチング文を生成
    ///
    /// バックエンドの失敗・空応答は FALLBACK_COACHING に置き換える。
    pub fn coach(
        &self,
        session_id: &str,
        skill: &str,
        question: Option<&str>,
        backend: &dyn CoachingBackend,
    ) -> Result<CoachingResult> {
        let raw_feedback = self.load_feedback(session_id)?;
        let prompts_dir = self.config.storage.prompts_dir.as_path();
        let messages = coaching::build_messages(&raw_feedback, skill, Some(prompts_dir), question)?;

        let reply = match backend.reply(&messages) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.note(format!("[coach] empty reply for session {}, using fallback", session_id));
                FALLBACK_COACHING.to_string()
            }
            Err(e) => {
                self.note(format!("[coach] backend failed for session {}: {:#}", session_id, e));
                FALLBACK_COACHING.to_string()
            }
        };

        Ok(CoachingResult {
            session_id: session_id.to_string(),
            skill: skill.to_string(),
            reply,
            raw_feedback,
        })
    }
}

fn check_unique(frames: &[PoseFrame]) -> Result<(), AnalysisError> {
    let mut seen = HashSet::with_capacity(frames.len());
    for frame in frames {
        if !seen.insert(frame.frame_id.as_str()) {
            return Err(AnalysisError::DuplicateFrame(frame.frame_id.clone()));
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::OfflineCoach;
    use crate::pose::{save_pose_file, Landmark, LandmarkName};
    use crate::swing::{Phase, Severity};
    use anyhow::bail;

    fn frame(id: &str, wrist_x: f64) -> PoseFrame {
        PoseFrame::new(id)
            .with(LandmarkName::RightShoulder, Landmark::new(wrist_x - 0.2, 0.4).with_depth(0.0, 0.9))
            .with(LandmarkName::RightElbow, Landmark::new(wrist_x - 0.1, 0.4).with_depth(0.0, 0.9))
            .with(LandmarkName::RightWrist, Landmark::new(wrist_x, 0.4).with_depth(0.0, 0.9))
            .with(LandmarkName::RightHip, Landmark::new(0.5, 0.7).with_depth(0.0, 0.9))
    }

    /// READY → BACKSWING x2 → CONTACT → FOLLOW_THROUGH x2
    fn good_swing() -> Vec<PoseFrame> {
        [0.50, 0.495, 0.49, 0.52, 0.525, 0.53]
            .into_iter()
            .enumerate()
            .map(|(i, x)| frame(&format!("frame_{:04}.jpg", i), x))
            .collect()
    }

    fn pipeline_in(dir: &Path) -> Pipeline {
        let mut config = Config::default();
        config.storage.data_dir = dir.join("data");
        config.storage.prompts_dir = dir.join("prompts");
        Pipeline::new(config)
    }

    fn write_session(pipeline: &Pipeline, session_id: &str, frames: &[PoseFrame]) {
        let paths = pipeline.session_paths(session_id).unwrap();
        fs::create_dir_all(&paths.pose_dir).unwrap();
        for f in frames {
            let name = f.frame_id.replace(".jpg", ".json");
            save_pose_file(paths.pose_dir.join(name), f).unwrap();
        }
    }

    #[test]
    fn test_session_paths_layout() {
        let paths = SessionPaths::new("data", "abc-123").unwrap();
        assert_eq!(paths.video_dir, PathBuf::from("data/video/abc-123"));
        assert_eq!(paths.frame_dir, PathBuf::from("data/frame/abc-123"));
        assert_eq!(paths.pose_dir, PathBuf::from("data/pose/abc-123"));
        assert_eq!(paths.phase_file, PathBuf::from("data/phase/abc-123_phases.json"));
        assert_eq!(paths.feedback_file, PathBuf::from("data/feedback/abc-123_feedback.json"));
    }

    #[test]
    fn test_invalid_session_ids() {
        for id in ["", ".", "..", "../etc", "a/b", "a\\b", "a\nb"] {
            assert!(
                matches!(SessionPaths::new("data", id), Err(AnalysisError::InvalidSessionId(_))),
                "{id:?}"
            );
        }
    }

    #[test]
    fn test_analyze_frames_sorts_by_frame_id() {
        let pipeline = Pipeline::new(Config::default());
        let mut frames = good_swing();
        frames.reverse();
        let analysis = pipeline.analyze_frames(frames).unwrap();
        assert_eq!(analysis.pose_count, 6);
        assert_eq!(analysis.phases[0].frame_id, "frame_0000.jpg");
        assert_eq!(analysis.phases[3].phase, Phase::Contact);
        assert_eq!(analysis.feedback[0].code, "FH99");
    }

    #[test]
    fn test_analyze_frames_rejects_duplicates() {
        let pipeline = Pipeline::new(Config::default());
        let mut frames = good_swing();
        frames.push(frame("frame_0002.jpg", 0.6));
        assert!(matches!(
            pipeline.analyze_frames(frames),
            Err(AnalysisError::DuplicateFrame(id)) if id == "frame_0002.jpg"
        ));
    }

    #[test]
    fn test_analyze_frames_empty_is_no_contact() {
        let pipeline = Pipeline::new(Config::default());
        let analysis = pipeline.analyze_frames(Vec::new()).unwrap();
        assert!(analysis.phases.is_empty());
        assert_eq!(analysis.feedback.len(), 1);
        assert_eq!(analysis.feedback[0].code, "FH00");
        assert_eq!(analysis.feedback[0].severity, Severity::High);
    }

    #[test]
    fn test_analyze_session_persists_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        write_session(&pipeline, "s1", &good_swing());

        let report = pipeline.analyze_session("s1", "drive_forehand").unwrap();
        assert_eq!(report.pose_count, 6);
        assert_eq!(report.phase_count, 6);
        assert_eq!(report.techniques_detected, ["FH99: Good shadow drive forehand"]);
        assert!(report.phase_file.is_file());
        assert!(report.feedback_file.is_file());

        let phases: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report.phase_file).unwrap()).unwrap();
        assert_eq!(phases[0]["frame"], "frame_0000.jpg");
        assert_eq!(phases[0]["phase"], "READY");
        assert_eq!(phases[3]["phase"], "CONTACT");
        assert_eq!(phases[3]["elbow_angle"], 180.0);
        assert_eq!(phases[3]["wrist_velocity"], 0.03);

        assert_eq!(pipeline.load_feedback("s1").unwrap(), report.feedback);
    }

    #[test]
    fn test_pose_dir_rerun_ignores_own_outputs() {
        let dir = tempfile::tempdir().unwrap();
        for f in good_swing() {
            let name = f.frame_id.replace(".jpg", ".json");
            save_pose_file(dir.path().join(name), &f).unwrap();
        }
        let pipeline = Pipeline::new(Config::default());
        let (phase_file, feedback_file) = pose_dir_outputs(dir.path(), None);
        assert_eq!(phase_file, dir.path().join("analysis").join("phases.json"));

        let first = pipeline.analyze_pose_dir(dir.path(), &phase_file, &feedback_file).unwrap();
        let second = pipeline.analyze_pose_dir(dir.path(), &phase_file, &feedback_file).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.pose_count, 6);
        assert_eq!(second.feedback[0].code, "FH99");

        let out = dir.path().join("out");
        let (phase_file, _) = pose_dir_outputs(dir.path(), Some(out.as_path()));
        assert_eq!(phase_file, out.join("phases.json"));
    }

    #[test]
    fn test_pipeline_notes_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let (logfile, log_path) = crate::logging::open_log_file_in(dir.path(), "pipeline").unwrap();
        let pipeline = pipeline_in(dir.path()).with_log(logfile);
        write_session(&pipeline, "s1", &good_swing());
        pipeline.analyze_session("s1", "drive_forehand").unwrap();

        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("[pipeline] session s1 (drive_forehand)"));
        assert!(log.contains("[pipeline] [FH99] Good shadow drive forehand"));
    }

    #[test]
    fn test_analyze_session_empty_pose_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        write_session(&pipeline, "empty", &[]);

        let report = pipeline.analyze_session("empty", "drive_forehand").unwrap();
        assert_eq!(report.pose_count, 0);
        assert_eq!(report.phase_count, 0);
        assert_eq!(report.feedback[0].code, "FH00");
    }

    #[test]
    fn test_analyze_session_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        let err = pipeline.analyze_session("missing", "drive_forehand").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_analyze_session_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        write_session(&pipeline, "s1", &good_swing());

        let first = pipeline.analyze_session("s1", "drive_forehand").unwrap();
        let phases_a = fs::read(&first.phase_file).unwrap();
        let feedback_a = fs::read(&first.feedback_file).unwrap();
        let second = pipeline.analyze_session("s1", "drive_forehand").unwrap();
        assert_eq!(first, second);
        assert_eq!(phases_a, fs::read(&second.phase_file).unwrap());
        assert_eq!(feedback_a, fs::read(&second.feedback_file).unwrap());
    }

    #[test]
    fn test_analyze_session_missing_joint_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        let mut frames = good_swing();
        frames[2].landmarks.remove("RIGHT_SHOULDER");
        write_session(&pipeline, "s1", &frames);

        let err = pipeline.analyze_session("s1", "drive_forehand").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InsufficientLandmarks { .. })
        ));
    }

    struct FailingBackend;

    impl CoachingBackend for FailingBackend {
        fn reply(&self, _messages: &[coaching::ChatMessage]) -> Result<String> {
            bail!("llm unavailable")
        }
    }

    struct BlankBackend;

    impl CoachingBackend for BlankBackend {
        fn reply(&self, _messages: &[coaching::ChatMessage]) -> Result<String> {
            Ok("  ".to_string())
        }
    }

    #[test]
    fn test_coach_requires_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        let err = pipeline.coach("s1", "drive_forehand", None, &OfflineCoach).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::FeedbackNotFound(_))
        ));
    }

    #[test]
    fn test_coach_with_offline_backend() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        write_session(&pipeline, "s1", &good_swing());
        pipeline.analyze_session("s1", "drive_forehand").unwrap();

        let result = pipeline
            .coach("s1", "drive_forehand", Some("How can I improve?"), &OfflineCoach)
            .unwrap();
        assert!(result.reply.starts_with("To improve this technique"));
        assert_eq!(result.raw_feedback[0].code, "FH99");
    }

    #[test]
    fn test_coach_falls_back_on_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());
        write_session(&pipeline, "s1", &good_swing());
        pipeline.analyze_session("s1", "drive_forehand").unwrap();

        let failed = pipeline.coach("s1", "drive_forehand", None, &FailingBackend).unwrap();
        assert_eq!(failed.reply, FALLBACK_COACHING);
        let blank = pipeline.coach("s1", "drive_forehand", None, &BlankBackend).unwrap();
        assert_eq!(blank.reply, FALLBACK_COACHING);
    }
}
