//! ImageNet 事前学習済み ResNet-18 の読み込み
//!
//! torchvision の `.pth` チェックポイントから畳み込み層と BatchNorm を取り込む。
//! 分類ヘッド（fc）は出力次元が異なるので読み込まず、初期化値のまま学習する。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn_store::{ModuleSnapshot, PytorchStore};

use super::model::PneumoniaNet;
use crate::error::DetectorError;

/// torchvision 公開の ResNet-18 (IMAGENET1K_V1) 重み
pub const RESNET18_IMAGENET_URL: &str = "https://download.pytorch.org/models/resnet18-f37072fd.pth";

/// チェックポイントが無ければダウンロードする
pub fn ensure_checkpoint(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    log::info!(
        "Downloading pretrained weights from {} to {}",
        RESNET18_IMAGENET_URL,
        path.display()
    );

    let response = ureq::get(RESNET18_IMAGENET_URL)
        .timeout(Duration::from_secs(600))
        .call()
        .map_err(|e| anyhow::anyhow!("Failed to download pretrained weights: {}", e))?;

    // 途中で失敗しても壊れたファイルを残さないよう一時ファイルに書いてから置き換える
    let partial = path.with_extension("part");
    {
        let file = File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut writer = BufWriter::new(file);
        std::io::copy(&mut response.into_reader(), &mut writer)?;
        writer.flush()?;
    }
    std::fs::rename(&partial, path)?;

    Ok(path.to_path_buf())
}

/// バックボーン（conv1, bn1, layer1..layer4）の重みをチェックポイントから読み込む
pub fn load_backbone<B: Backend>(
    mut model: PneumoniaNet<B>,
    checkpoint: &Path,
) -> anyhow::Result<PneumoniaNet<B>> {
    let mut store = PytorchStore::from_file(checkpoint)
        .with_key_remapping(r"\.downsample\.0\.", ".downsample.conv.")
        .with_key_remapping(r"\.downsample\.1\.", ".downsample.bn.")
        .with_regex(r"^(conv1|bn1|layer[1-4])\.")
        .allow_partial(true);

    let result = model
        .load_from(&mut store)
        .map_err(|e| DetectorError::ModelLoad {
            path: checkpoint.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !result.errors.is_empty() {
        return Err(DetectorError::ModelLoad {
            path: checkpoint.to_path_buf(),
            reason: result
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }
        .into());
    }

    log::info!(
        "Loaded {} pretrained tensors from {} ({} skipped)",
        result.applied.len(),
        checkpoint.display(),
        result.skipped.len()
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    use crate::ml::PneumoniaNetConfig;

    type TestBackend = NdArray<f32>;

    // tiny 構成と同じ形状の torchvision 形式チェックポイント。各テンソルは定数で埋めてある
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn tensor_values(model: &PneumoniaNet<TestBackend>, path: &str) -> Vec<f32> {
        model
            .collect(None, None, false)
            .into_iter()
            .find(|snapshot| snapshot.full_path() == path)
            .unwrap_or_else(|| panic!("no tensor at {}", path))
            .to_data()
            .unwrap()
            .to_vec::<f32>()
            .unwrap()
    }

    fn all_equal(values: &[f32], expected: f32) -> bool {
        !values.is_empty() && values.iter().all(|v| *v == expected)
    }

    #[test]
    fn test_load_backbone_from_checkpoint() {
        let model = PneumoniaNetConfig::tiny().init::<TestBackend>(&NdArrayDevice::Cpu);
        let fc_weight = tensor_values(&model, "fc.weight");
        let fc_bias = tensor_values(&model, "fc.bias");

        let model = load_backbone(model, &fixture("resnet_tiny.pth")).unwrap();

        assert!(all_equal(&tensor_values(&model, "conv1.weight"), 0.125));
        assert!(all_equal(&tensor_values(&model, "bn1.gamma"), 2.0));
        assert!(all_equal(&tensor_values(&model, "bn1.beta"), 0.25));
        assert!(all_equal(&tensor_values(&model, "layer1.0.conv2.weight"), 0.02));
        assert!(all_equal(&tensor_values(&model, "layer4.0.conv1.weight"), 0.04));

        // downsample.0 / downsample.1 は conv / bn へ対応付けられる
        assert!(all_equal(
            &tensor_values(&model, "layer2.0.downsample.conv.weight"),
            0.5
        ));
        assert!(all_equal(
            &tensor_values(&model, "layer2.0.downsample.bn.gamma"),
            3.0
        ));

        // 分類ヘッドは初期化値のまま
        assert_eq!(tensor_values(&model, "fc.weight"), fc_weight);
        assert_eq!(tensor_values(&model, "fc.bias"), fc_bias);
    }

    #[test]
    fn test_shape_mismatch_is_model_load_error() {
        let model = PneumoniaNetConfig::tiny().init::<TestBackend>(&NdArrayDevice::Cpu);
        let checkpoint = fixture("resnet_tiny_mismatch.pth");

        let err = load_backbone(model, &checkpoint).unwrap_err();
        match err.downcast_ref::<DetectorError>() {
            Some(DetectorError::ModelLoad { path, .. }) => assert_eq!(path, &checkpoint),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ensure_checkpoint_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet18.pth");
        std::fs::write(&path, b"cached").unwrap();

        let resolved = ensure_checkpoint(&path).unwrap();
        assert_eq!(resolved, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"cached");
        assert!(!path.with_extension("part").exists());
    }
}
