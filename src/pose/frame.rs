use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::landmark::{Landmark, LandmarkName};
use crate::error::AnalysisError;

/// 1フレーム分の骨格（ポーズ推定の出力）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// フレーム識別子（画像ファイル名など）
    #[serde(rename = "frame")]
    pub frame_id: String,
    /// ランドマーク名 → 座標。未知の名前もそのまま保持する
    pub landmarks: BTreeMap<String, Landmark>,
}

impl PoseFrame {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            landmarks: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: LandmarkName, landmark: Landmark) -> Self {
        self.insert(name, landmark);
        self
    }

    pub fn insert(&mut self, name: LandmarkName, landmark: Landmark) {
        self.landmarks.insert(name.as_str().to_string(), landmark);
    }

    pub fn get(&self, name: LandmarkName) -> Option<&Landmark> {
        self.landmarks.get(name.as_str())
    }

    /// スイング解析用の腕関節ビュー
    pub fn arm_joints(&self) -> ArmJoints {
        ArmJoints {
            shoulder: self.get(LandmarkName::RightShoulder).copied(),
            elbow: self.get(LandmarkName::RightElbow).copied(),
            wrist: self.get(LandmarkName::RightWrist).copied(),
            hip: self.get(LandmarkName::RightHip).copied(),
        }
    }
}

/// フェーズ判定に必要な利き腕側の関節
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmJoints {
    pub shoulder: Option<Landmark>,
    pub elbow: Option<Landmark>,
    pub wrist: Option<Landmark>,
    pub hip: Option<Landmark>,
}

/// 全関節が揃った状態。腰は存在確認のみで、計算には使わない
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedArm {
    pub shoulder: Landmark,
    pub elbow: Landmark,
    pub wrist: Landmark,
}

impl ArmJoints {
    pub const REQUIRED: [LandmarkName; 4] = [
        LandmarkName::RightShoulder,
        LandmarkName::RightElbow,
        LandmarkName::RightWrist,
        LandmarkName::RightHip,
    ];

    /// 欠けている必須関節
    pub fn missing(&self) -> Vec<LandmarkName> {
        let present = [
            self.shoulder.is_some(),
            self.elbow.is_some(),
            self.wrist.is_some(),
            self.hip.is_some(),
        ];
        Self::REQUIRED
            .iter()
            .zip(present)
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn resolve(&self, frame_id: &str) -> Result<ResolvedArm, AnalysisError> {
        match (self.shoulder, self.elbow, self.wrist, self.hip) {
            (Some(shoulder), Some(elbow), Some(wrist), Some(_)) => Ok(ResolvedArm {
                shoulder,
                elbow,
                wrist,
            }),
            _ => Err(AnalysisError::InsufficientLandmarks {
                frame_id: frame_id.to_string(),
                missing: self.missing(),
            }),
        }
    }
}

/// ディレクトリ内の *.json ポーズファイルを列挙（ファイル名の辞書順）
pub fn list_pose_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read pose directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn load_pose_file<P: AsRef<Path>>(path: P) -> Result<PoseFrame> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pose file {}", path.display()))?;
    let frame: PoseFrame = serde_json::from_str(&content)
        .with_context(|| format!("Invalid pose file {}", path.display()))?;
    Ok(frame)
}

/// ポーズディレクトリを読み込む。順序はファイル名の辞書順
pub fn load_pose_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<PoseFrame>> {
    list_pose_files(dir)?
        .iter()
        .map(load_pose_file)
        .collect()
}

pub fn save_pose_file<P: AsRef<Path>>(path: P, frame: &PoseFrame) -> Result<()> {
    let json = serde_json::to_string_pretty(frame)?;
    fs::write(path, json).context("Failed to write pose file")?;
    Ok(())
}
