use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// MediaPipe Pose の 33 ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum LandmarkName {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkName {
    /// ポーズファイル上のキー名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nose => "NOSE",
            Self::LeftEyeInner => "LEFT_EYE_INNER",
            Self::LeftEye => "LEFT_EYE",
            Self::LeftEyeOuter => "LEFT_EYE_OUTER",
            Self::RightEyeInner => "RIGHT_EYE_INNER",
            Self::RightEye => "RIGHT_EYE",
            Self::RightEyeOuter => "RIGHT_EYE_OUTER",
            Self::LeftEar => "LEFT_EAR",
            Self::RightEar => "RIGHT_EAR",
            Self::MouthLeft => "MOUTH_LEFT",
            Self::MouthRight => "MOUTH_RIGHT",
            Self::LeftShoulder => "LEFT_SHOULDER",
            Self::RightShoulder => "RIGHT_SHOULDER",
            Self::LeftElbow => "LEFT_ELBOW",
            Self::RightElbow => "RIGHT_ELBOW",
            Self::LeftWrist => "LEFT_WRIST",
            Self::RightWrist => "RIGHT_WRIST",
            Self::LeftPinky => "LEFT_PINKY",
            Self::RightPinky => "RIGHT_PINKY",
            Self::LeftIndex => "LEFT_INDEX",
            Self::RightIndex => "RIGHT_INDEX",
            Self::LeftThumb => "LEFT_THUMB",
            Self::RightThumb => "RIGHT_THUMB",
            Self::LeftHip => "LEFT_HIP",
            Self::RightHip => "RIGHT_HIP",
            Self::LeftKnee => "LEFT_KNEE",
            Self::RightKnee => "RIGHT_KNEE",
            Self::LeftAnkle => "LEFT_ANKLE",
            Self::RightAnkle => "RIGHT_ANKLE",
            Self::LeftHeel => "LEFT_HEEL",
            Self::RightHeel => "RIGHT_HEEL",
            Self::LeftFootIndex => "LEFT_FOOT_INDEX",
            Self::RightFootIndex => "RIGHT_FOOT_INDEX",
        }
    }
}

impl std::fmt::Display for LandmarkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 単一ランドマーク
///
/// ファイル上は `[x, y]`, `[x, y, z]`, `[x, y, z, visibility]` のいずれか。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f64,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f64,
    /// 深度（腰中心基準、コアでは未使用）
    pub z: Option<f64>,
    /// 可視度 (0.0〜1.0、コアでは未使用)
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
        }
    }

    pub fn with_depth(mut self, z: f64, visibility: f64) -> Self {
        self.z = Some(z);
        self.visibility = Some(visibility);
        self
    }

    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl TryFrom<Vec<f64>> for Landmark {
    type Error = AnalysisError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [x, y] => Ok(Self::new(*x, *y)),
            [x, y, z] => Ok(Self {
                x: *x,
                y: *y,
                z: Some(*z),
                visibility: None,
            }),
            [x, y, z, v] => Ok(Self::new(*x, *y).with_depth(*z, *v)),
            other => Err(AnalysisError::InvalidLandmark(format!(
                "expected 2 to 4 coordinates, got {}",
                other.len()
            ))),
        }
    }
}

/// z が無く可視度だけある場合は z = 0.0（腰中心）として書き出す。
/// 配列形式では z を飛ばせないので、読み戻すと z は `Some(0.0)` になる。
impl From<Landmark> for Vec<f64> {
    fn from(lm: Landmark) -> Self {
        let mut values = vec![lm.x, lm.y];
        match (lm.z, lm.visibility) {
            (Some(z), Some(v)) => values.extend([z, v]),
            (Some(z), None) => values.push(z),
            (None, Some(v)) => values.extend([0.0, v]),
            (None, None) => {}
        }
        values
    }
}
