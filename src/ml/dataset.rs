//! 画像フォルダ形式のデータセット
//!
//! `root/<クラス名>/*.png|jpg|jpeg` を走査し、クラス名のソート順でラベルを振る
//! （chest_xray では NORMAL=0, PNEUMONIA=1）。

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

use super::preprocess::{has_image_extension, load_and_normalize_image, IMAGE_SIZE};
use crate::error::DetectorError;

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct XrayItem {
    pub path: PathBuf,
    pub label: usize,
}

/// クラスごとのサブフォルダを持つ画像データセット
#[derive(Clone, Debug)]
pub struct XrayFolderDataset {
    samples: Vec<XrayItem>,
    class_names: Vec<String>,
}

impl XrayFolderDataset {
    /// ディレクトリから画像一覧を読み込む
    ///
    /// クラスフォルダが1つも無い場合や、画像を1枚も含まないクラスがある場合はエラー。
    pub fn from_directory(root: &Path) -> Result<Self> {
        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(root)
            .map_err(|e| anyhow::anyhow!("Cannot read dataset folder {}: {}", root.display(), e))?
        {
            let path = entry?.path();
            if path.is_dir() {
                class_dirs.push(path);
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(DetectorError::EmptyDataset(root.to_path_buf()).into());
        }

        let mut samples = Vec::new();
        let mut class_names = Vec::with_capacity(class_dirs.len());

        for (label, class_dir) in class_dirs.iter().enumerate() {
            let class_name = class_dir
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {}", class_dir.display()))?
                .to_string();

            let mut images = Vec::new();
            collect_images(class_dir, &mut images)?;
            images.sort();

            if images.is_empty() {
                return Err(DetectorError::EmptyDataset(class_dir.clone()).into());
            }

            log::debug!("  Class {}: {} ({} samples)", label, class_name, images.len());
            samples.extend(images.into_iter().map(|path| XrayItem { path, label }));
            class_names.push(class_name);
        }

        Ok(Self {
            samples,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for item in &self.samples {
            counts[item.label] += 1;
        }
        counts
    }
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if path.is_file() && has_image_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

impl Dataset<XrayItem> for XrayFolderDataset {
    fn get(&self, index: usize) -> Option<XrayItem> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// バッチャー
#[derive(Clone, Debug, Default)]
pub struct XrayBatcher;

impl XrayBatcher {
    pub fn new() -> Self {
        Self
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct XrayBatch<B: Backend> {
    /// [batch_size, 3, 224, 224]
    pub images: Tensor<B, 4>,
    /// [batch_size, 1]
    pub targets: Tensor<B, 2, Int>,
    /// 読み込めなかった画像（ゼロ埋めされている）
    pub failures: Vec<(PathBuf, String)>,
}

impl<B: Backend> Batcher<B, XrayItem, XrayBatch<B>> for XrayBatcher {
    fn batch(&self, items: Vec<XrayItem>, device: &B::Device) -> XrayBatch<B> {
        let batch_size = items.len();
        let image_len = 3 * IMAGE_SIZE * IMAGE_SIZE;
        let mut pixels = Vec::with_capacity(batch_size * image_len);
        let mut labels = Vec::with_capacity(batch_size);
        let mut failures = Vec::new();

        for item in items {
            match load_and_normalize_image(&item.path) {
                Ok(image_data) => pixels.extend_from_slice(&image_data),
                Err(e) => {
                    pixels.extend(std::iter::repeat(0.0f32).take(image_len));
                    failures.push((item.path, e.to_string()));
                }
            }
            labels.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, IMAGE_SIZE, IMAGE_SIZE]),
            device,
        );
        let targets =
            Tensor::<B, 2, Int>::from_data(TensorData::new(labels, [batch_size, 1]), device);

        XrayBatch {
            images,
            targets,
            failures,
        }
    }
}
