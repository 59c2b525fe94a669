//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、重みファイル、学習パラメータをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::model::PneumoniaNetConfig;
use crate::ml::training::TrainingConfig;

/// 学習済み重みの既定ファイル名
pub const DEFAULT_WEIGHTS_FILE: &str = "pneumonia_model.mpk";

/// 計算デバイスの種類
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 学習済み重みファイルのパス（学習の出力先と予測アプリの読み込み元を兼ねる）
    pub weights_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            weights_path: DEFAULT_WEIGHTS_FILE.to_string(),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// 学習用画像フォルダ（クラスごとのサブフォルダを含む）
    pub train_dir: String,
    /// 検証用画像フォルダ
    pub val_dir: String,
    /// テスト用画像フォルダ
    pub test_dir: String,
    /// ImageNet事前学習済みResNet-18チェックポイント（None の場合はランダム初期化）
    #[serde(default)]
    pub pretrained_weights: Option<String>,
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// ワーカー数
    pub num_workers: usize,
    /// 学習率
    pub learning_rate: f64,
    /// シャッフル用ランダムシード
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            train_dir: "chest_xray/train".to_string(),
            val_dir: "chest_xray/val".to_string(),
            test_dir: "chest_xray/test".to_string(),
            pretrained_weights: Some("resnet18-f37072fd.pth".to_string()),
            num_epochs: 3,
            batch_size: 32,
            num_workers: 0,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 学習時の計算デバイス
    pub device_type: DeviceType,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        Self::load_from_or_default(Self::default_path())
    }

    /// 指定パスから設定を読み込む、失敗した場合はデフォルト設定を返す
    pub fn load_from_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to read config {}: {}", path.display(), e);
                    log::warn!("Falling back to default settings");
                    Self::default()
                }
            }
        } else {
            log::debug!("No config file at {}; using defaults", path.display());
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 重みファイルのパス
    pub fn weights_path(&self) -> PathBuf {
        PathBuf::from(&self.model.weights_path)
    }

    /// 学習ループに渡す設定を組み立てる
    pub fn training_config(&self) -> TrainingConfig {
        let training = &self.training;
        TrainingConfig {
            train_dir: PathBuf::from(&training.train_dir),
            val_dir: PathBuf::from(&training.val_dir),
            test_dir: PathBuf::from(&training.test_dir),
            output_path: self.weights_path(),
            pretrained_weights: training.pretrained_weights.as_ref().map(PathBuf::from),
            model: PneumoniaNetConfig::new(),
            num_epochs: training.num_epochs,
            batch_size: training.batch_size,
            num_workers: training.num_workers,
            learning_rate: training.learning_rate,
            seed: training.seed,
        }
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        log::info!("Device: {}", self.device_type);
        log::info!("Weights: {}", self.model.weights_path);
        log::info!(
            "Training: epochs={}, batch_size={}, lr={}, seed={}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate,
            self.training.seed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.model.weights_path, "pneumonia_model.mpk");
        assert_eq!(config.training.num_epochs, 3);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 1e-3);
        assert_eq!(config.training.train_dir, "chest_xray/train");
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.device_type, deserialized.device_type);
        assert_eq!(config.model.weights_path, deserialized.model.weights_path);
        assert_eq!(
            config.training.pretrained_weights,
            deserialized.training.pretrained_weights
        );
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }

    #[test]
    fn test_training_config_uses_weights_path() {
        let mut config = AppConfig::default();
        config.model.weights_path = "out/model.mpk".to_string();
        config.training.pretrained_weights = None;

        let training = config.training_config();
        assert_eq!(training.output_path, PathBuf::from("out/model.mpk"));
        assert!(training.pretrained_weights.is_none());
        assert_eq!(training.model.blocks, [2, 2, 2, 2]);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_or_default(dir.path().join("nope.json"));
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.training.num_epochs = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.device_type, DeviceType::Cpu);
        assert_eq!(loaded.training.num_epochs, 7);
    }
}
