use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segmenter: PhaseThresholds,
    #[serde(default)]
    pub rules: RuleThresholds,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// フェーズ判定の閾値
///
/// 速度は正規化座標(フレーム幅=1.0)の1フレームあたり変位、角度は度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseThresholds {
    /// |v| がこれ未満なら READY
    #[serde(default = "default_ready_velocity")]
    pub ready_velocity: f64,
    /// v が -backswing_velocity 未満なら BACKSWING
    #[serde(default = "default_backswing_velocity")]
    pub backswing_velocity: f64,
    /// CONTACT に必要な肘角度（この値より大きい）
    #[serde(default = "default_contact_angle")]
    pub contact_angle: f64,
    /// CONTACT に必要な |v|（この値より大きい）
    #[serde(default = "default_contact_velocity")]
    pub contact_velocity: f64,
    /// 必須関節が欠けたフレームの扱い
    #[serde(default)]
    pub missing_joints: MissingJointPolicy,
}

fn default_ready_velocity() -> f64 { 0.002 }
fn default_backswing_velocity() -> f64 { 0.002 }
fn default_contact_angle() -> f64 { 160.0 }
fn default_contact_velocity() -> f64 { 0.01 }

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            ready_velocity: default_ready_velocity(),
            backswing_velocity: default_backswing_velocity(),
            contact_angle: default_contact_angle(),
            contact_velocity: default_contact_velocity(),
            missing_joints: MissingJointPolicy::default(),
        }
    }
}

/// 必須関節（右肩・右肘・右手首・右腰）が欠けたフレームの扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingJointPolicy {
    /// シーケンス全体をエラーにする
    #[default]
    Abort,
    /// フレームを捨てる（速度の基準フレームにもならない）
    Skip,
    /// 角度 0.0 の代替値で残す
    Sentinel,
}

/// 評価ルールの閾値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// 最初の CONTACT でこれ未満の肘角度は FH01
    #[serde(default = "default_min_contact_angle")]
    pub min_contact_angle: f64,
    /// 正の速度を持つ FOLLOW_THROUGH フレームの最小数
    #[serde(default = "default_min_follow_through_frames")]
    pub min_follow_through_frames: usize,
}

fn default_min_contact_angle() -> f64 { 150.0 }
fn default_min_follow_through_frames() -> usize { 2 }

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            min_contact_angle: default_min_contact_angle(),
            min_follow_through_frames: default_min_follow_through_frames(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// セッションデータのルート (video/, frame/, pose/, phase/, feedback/)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// コーチング用システムプロンプトの置き場所
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_prompts_dir() -> PathBuf { PathBuf::from("prompts") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

/// ライブ評価のウィンドウ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// 保持する最大フレーム数
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// 評価に必要な最小フレーム数
    #[serde(default = "default_min_frames")]
    pub min_frames: usize,
}

fn default_buffer_size() -> usize { 16 }
fn default_min_frames() -> usize { 8 }

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            min_frames: default_min_frames(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String { "0.0.0.0:8765".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// ファイルが無い・読めない場合はデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    eprintln!("config: {:#}, using defaults", e);
                }
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibrated_constants() {
        let config = Config::default();
        assert_eq!(config.segmenter.ready_velocity, 0.002);
        assert_eq!(config.segmenter.backswing_velocity, 0.002);
        assert_eq!(config.segmenter.contact_angle, 160.0);
        assert_eq!(config.segmenter.contact_velocity, 0.01);
        assert_eq!(config.segmenter.missing_joints, MissingJointPolicy::Abort);
        assert_eq!(config.rules.min_contact_angle, 150.0);
        assert_eq!(config.rules.min_follow_through_frames, 2);
        assert_eq!(config.live.buffer_size, 16);
        assert_eq!(config.live.min_frames, 8);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [segmenter]
            contact_angle = 165.0
            missing_joints = "skip"

            [storage]
            data_dir = "/tmp/swing"
            "#,
        )
        .unwrap();
        assert_eq!(config.segmenter.contact_angle, 165.0);
        assert_eq!(config.segmenter.ready_velocity, 0.002);
        assert_eq!(config.segmenter.missing_joints, MissingJointPolicy::Skip);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/swing"));
        assert_eq!(config.storage.prompts_dir, PathBuf::from("prompts"));
        assert_eq!(config.rules, RuleThresholds::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.live.min_frames = 4;
        config.segmenter.missing_joints = MissingJointPolicy::Sentinel;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.live.min_frames, 4);
        assert_eq!(loaded.segmenter.missing_joints, MissingJointPolicy::Sentinel);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.server.listen_addr, "0.0.0.0:8765");
    }
}
