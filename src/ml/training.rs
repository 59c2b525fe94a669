//! モデル学習
//!
//! 事前学習済み ResNet-18 を肺炎/正常の二値分類へファインチューニングする。

use std::path::PathBuf;

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use super::dataset::{XrayBatch, XrayBatcher, XrayFolderDataset, XrayItem};
use super::model::{save_weights, PneumoniaNet, PneumoniaNetConfig};
use super::pretrained;

/// 学習設定
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub test_dir: PathBuf,
    /// 学習済み重みの出力先
    pub output_path: PathBuf,
    /// ImageNet 事前学習済みチェックポイント（無ければダウンロードする）
    pub pretrained_weights: Option<PathBuf>,
    pub model: PneumoniaNetConfig,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub num_workers: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

/// 学習結果の要約
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub class_names: Vec<String>,
    /// 学習分割のクラスごとのサンプル数
    pub class_counts: Vec<usize>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub test_samples: usize,
    /// 各エポック最終バッチの損失
    pub epoch_losses: Vec<f32>,
    /// 重みを書き込んだパス
    pub output_path: Option<PathBuf>,
}

/// 学習を実行して重みを保存する
pub fn train_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: B::Device,
) -> Result<TrainingReport> {
    let (model, mut report) = fit::<B>(config, device)?;

    let saved = save_weights(model.valid(), &config.output_path)?;
    log::info!("Model saved to {}", saved.display());
    report.output_path = Some(saved);

    Ok(report)
}

/// 学習ループ本体（保存はしない）
pub fn fit<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: B::Device,
) -> Result<(PneumoniaNet<B>, TrainingReport)> {
    let train_set = XrayFolderDataset::from_directory(&config.train_dir)?;
    // 検証・テスト分割は読み込むだけで評価には使わない
    let val_set = XrayFolderDataset::from_directory(&config.val_dir)?;
    let test_set = XrayFolderDataset::from_directory(&config.test_dir)?;

    let class_names = train_set.class_names().to_vec();
    let class_counts = train_set.class_counts();
    let per_class: Vec<String> = class_names
        .iter()
        .zip(&class_counts)
        .map(|(name, count)| format!("{} ({})", name, count))
        .collect();
    log::info!(
        "Classes: {} (train {}, val {}, test {})",
        per_class.join(", "),
        train_set.len(),
        val_set.len(),
        test_set.len()
    );
    let mut report = TrainingReport {
        class_names,
        class_counts,
        train_samples: train_set.len(),
        val_samples: val_set.len(),
        test_samples: test_set.len(),
        epoch_losses: Vec::with_capacity(config.num_epochs),
        output_path: None,
    };

    let dataloader = DataLoaderBuilder::<B, XrayItem, XrayBatch<B>>::new(XrayBatcher::new())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(train_set);

    log::info!("Data loaded. Starting training...");

    let mut model = init_model::<B>(config, &device)?;
    let mut optimizer = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, PneumoniaNet<B>>();

    for epoch in 1..=config.num_epochs {
        log::info!("Epoch {}/{}", epoch, config.num_epochs);

        let mut last_loss = None;
        for batch in dataloader.iter() {
            if let Some((path, reason)) = batch.failures.first() {
                anyhow::bail!("Failed to load training image {}: {}", path.display(), reason);
            }

            let loss = model.forward_loss(batch.images, batch.targets);
            last_loss = Some(loss.clone().into_scalar().elem::<f32>());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }

        let loss = last_loss.ok_or_else(|| anyhow::anyhow!("Training set produced no batches"))?;
        log::info!("Epoch [{}/{}], Loss: {:.4}", epoch, config.num_epochs, loss);
        report.epoch_losses.push(loss);
    }

    Ok((model, report))
}

fn init_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<PneumoniaNet<B>> {
    let model = config.model.init::<B>(device);

    match &config.pretrained_weights {
        Some(checkpoint) => {
            let checkpoint = pretrained::ensure_checkpoint(checkpoint)?;
            pretrained::load_backbone(model, &checkpoint)
        }
        None => {
            log::warn!("No pretrained weights configured; training from random initialization");
            Ok(model)
        }
    }
}
