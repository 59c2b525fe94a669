//! モデル推論機能

use anyhow::Result;
use std::path::Path;

use burn::tensor::{backend::Backend, ElementConversion, Tensor, TensorData};

use super::model::{load_weights, PneumoniaNet, PneumoniaNetConfig};
use super::preprocess::{load_and_normalize_image, IMAGE_SIZE};
use crate::diagnosis::Diagnosis;
use crate::error::DetectorError;

/// 推論エンジン
///
/// 読み込み後のモデルは変更されないので、同じ画像には常に同じ結果を返す。
pub struct InferenceEngine<B: Backend> {
    model: PneumoniaNet<B>,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// 重みファイルを読み込んで推論エンジンを初期化
    pub fn load(
        weights_path: &Path,
        config: &PneumoniaNetConfig,
        device: B::Device,
    ) -> Result<Self, DetectorError> {
        let model = load_weights::<B>(config, weights_path, &device)?;
        log::info!("Loaded model weights from {}", weights_path.display());
        Ok(Self { model, device })
    }

    /// 構築済みモデルから初期化
    pub fn from_model(model: PneumoniaNet<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// 単一画像を分類
    pub fn predict(&self, image_path: &Path) -> Result<Diagnosis> {
        let (diagnosis, _) = self.predict_with_confidence(image_path)?;
        Ok(diagnosis)
    }

    /// 単一画像を分類し、陽性確率も返す
    pub fn predict_with_confidence(&self, image_path: &Path) -> Result<(Diagnosis, f32)> {
        let image_data = load_and_normalize_image(image_path)?;
        let probability = self.probability_for_pixels(image_data)?;
        log::info!("Model confidence: {:.4}", probability);
        Ok((Diagnosis::from_probability(probability), probability))
    }

    /// 正規化済み画素 (C, H, W) の陽性確率
    pub fn probability_for_pixels(&self, pixels: Vec<f32>) -> Result<f32> {
        let expected = 3 * IMAGE_SIZE * IMAGE_SIZE;
        if pixels.len() != expected {
            anyhow::bail!(
                "Expected {} normalized values, got {}",
                expected,
                pixels.len()
            );
        }

        let tensor = Tensor::<B, 3>::from_data(
            TensorData::new(pixels, [3, IMAGE_SIZE, IMAGE_SIZE]),
            &self.device,
        );
        Ok(self.probability_for_tensor(tensor))
    }

    /// 画像テンソル [3, H, W] の陽性確率
    pub fn probability_for_tensor(&self, image: Tensor<B, 3>) -> f32 {
        let batch = image.unsqueeze::<4>();
        let probability = self.model.probabilities(batch);
        probability.into_scalar().elem::<f32>()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn engine() -> InferenceEngine<TestBackend> {
        let device = NdArrayDevice::Cpu;
        let model = PneumoniaNetConfig::tiny().init::<TestBackend>(&device);
        InferenceEngine::from_model(model, device)
    }

    #[test]
    fn test_same_input_same_probability() {
        let engine = engine();
        let image = Tensor::<TestBackend, 3>::random(
            [3, IMAGE_SIZE, IMAGE_SIZE],
            burn::tensor::Distribution::Default,
            engine.device(),
        );

        let first = engine.probability_for_tensor(image.clone());
        let second = engine.probability_for_tensor(image);
        assert_eq!(first.to_bits(), second.to_bits());
        assert!((0.0..=1.0).contains(&first));
    }

    #[test]
    fn test_rejects_wrong_pixel_count() {
        assert!(engine().probability_for_pixels(vec![0.0; 10]).is_err());
    }

    #[test]
    fn test_missing_image() {
        let err = engine().predict(Path::new("missing/xray.png")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DetectorError>(),
            Some(DetectorError::ImageNotFound(_))
        ));
    }
}
