//! 診断結果と判定しきい値

use serde::{Deserialize, Serialize};

/// 肺炎と判定する確率のしきい値（この値を厳密に超えた場合のみ陽性）
pub const DECISION_THRESHOLD: f32 = 0.4;

/// 二値分類の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Diagnosis {
    Normal,
    Pneumonia,
}

impl Diagnosis {
    /// 陽性確率から判定する
    pub fn from_probability(probability: f32) -> Self {
        if probability > DECISION_THRESHOLD {
            Diagnosis::Pneumonia
        } else {
            Diagnosis::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Diagnosis::Normal => "Normal",
            Diagnosis::Pneumonia => "Pneumonia",
        }
    }
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ロジスティック関数
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `sigmoid` の逆関数
pub fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}
