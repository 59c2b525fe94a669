//! ResNet-18 二値分類モデル
//!
//! torchvision の resnet18 と同じ層構成・フィールド名を持ち、最終全結合層だけを
//! 出力1（肺炎のロジット）に置き換えたもの。

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::BinaryCrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::{activation::sigmoid, backend::Backend, Int, Tensor},
};

use crate::error::DetectorError;

/// モデル設定
#[derive(Config, Debug)]
pub struct PneumoniaNetConfig {
    /// 各ステージの BasicBlock 数（ResNet-18 は [2, 2, 2, 2]）
    #[config(default = "[2, 2, 2, 2]")]
    pub blocks: [usize; 4],
    /// 最初のステージのチャネル数（以降のステージで2倍ずつ増える）
    #[config(default = 64)]
    pub base_channels: usize,
}

impl PneumoniaNetConfig {
    /// テスト用の小さな構成（各ステージ1ブロック、4チャネル）
    pub fn tiny() -> Self {
        Self::new().with_blocks([1, 1, 1, 1]).with_base_channels(4)
    }

    /// 分類ヘッドへの入力次元
    pub fn feature_dim(&self) -> usize {
        self.base_channels * 8
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> PneumoniaNet<B> {
        let base = self.base_channels;

        let conv1 = Conv2dConfig::new([3, base], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(base).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let layer1 = make_stage(base, base, self.blocks[0], 1, device);
        let layer2 = make_stage(base, base * 2, self.blocks[1], 2, device);
        let layer3 = make_stage(base * 2, base * 4, self.blocks[2], 2, device);
        let layer4 = make_stage(base * 4, base * 8, self.blocks[3], 2, device);

        PneumoniaNet {
            conv1,
            bn1,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(self.feature_dim(), 1).init(device),
            activation: Relu::new(),
        }
    }
}

fn make_stage<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    num_blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..num_blocks)
        .map(|i| {
            if i == 0 {
                BasicBlock::new(in_channels, out_channels, stride, device)
            } else {
                BasicBlock::new(out_channels, out_channels, 1, device)
            }
        })
        .collect()
}

/// 3x3 畳み込み2段の残差ブロック
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2,
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x + identity)
    }
}

/// ショートカット経路の 1x1 畳み込み + BatchNorm
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// 肺炎分類モデル
#[derive(Module, Debug)]
pub struct PneumoniaNet<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PneumoniaNet<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, 224, 224]
    ///
    /// # 戻り値
    /// - 肺炎のロジット [batch_size, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    /// 陽性確率 [batch_size, 1]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// # 引数
    /// - `targets`: 0/1 ラベル [batch_size, 1]
    ///
    /// # 戻り値
    /// - ロジットに対する平均 BCE 損失
    pub fn forward_loss(&self, images: Tensor<B, 4>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
        let logits = self.forward(images);
        BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device())
            .forward(logits, targets)
    }

    /// 分類ヘッドを差し替える
    pub fn with_head(mut self, head: Linear<B>) -> Self {
        self.fc = head;
        self
    }
}

type WeightsRecorder = DefaultFileRecorder<FullPrecisionSettings>;

/// 重みをファイルに保存する（既存ファイルは上書き）
///
/// # 戻り値
/// - 実際に書き込んだパス（拡張子は `.mpk` に揃えられる）
pub fn save_weights<B: Backend>(model: PneumoniaNet<B>, path: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let recorder = WeightsRecorder::new();
    model
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {}", path.display(), e))?;

    Ok(weights_file(path))
}

/// レコーダが実際に読み書きするパス（拡張子は常に `.mpk`）
fn weights_file(path: &Path) -> PathBuf {
    path.with_extension("mpk")
}

/// 重みファイルを読み込んでモデルを構築する
pub fn load_weights<B: Backend>(
    config: &PneumoniaNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<PneumoniaNet<B>, DetectorError> {
    let file = weights_file(path);
    let load_error = |reason: String| DetectorError::ModelLoad {
        path: file.clone(),
        reason,
    };

    if !file.is_file() {
        return Err(load_error("file not found".to_string()));
    }

    let fresh = config.init::<B>(device);
    let expected_params = fresh.num_params();

    let recorder = WeightsRecorder::new();
    let model = fresh
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| load_error(e.to_string()))?;

    // レコードの形状は検証されないので、パラメータ数で構成の一致を確認する
    let actual_params = model.num_params();
    if actual_params != expected_params {
        return Err(load_error(format!(
            "parameter count mismatch: expected {}, found {}",
            expected_params, actual_params
        )));
    }

    Ok(model)
}
