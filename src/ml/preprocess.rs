//! 画像前処理
//!
//! 学習と推論で共通の変換: RGB化 → 224x224 へリサイズ → [0,1] 化 → ImageNet平均・標準偏差で正規化。

use std::path::Path;

use image::{imageops::FilterType, RgbImage};

use crate::error::DetectorError;

/// モデル入力の画像サイズ（正方形）
pub const IMAGE_SIZE: usize = 224;

/// ImageNetのチャネル平均
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNetのチャネル標準偏差
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 受け付ける画像の拡張子
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 拡張子が対応画像形式かどうか（大文字小文字は区別しない）
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// 画像を読み込んでRGBに変換する
pub fn load_rgb(path: &Path) -> anyhow::Result<RgbImage> {
    if !path.is_file() {
        return Err(DetectorError::ImageNotFound(path.to_path_buf()).into());
    }
    let img = image::open(path).map_err(|source| DetectorError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// 画像を読み込んで正規化
///
/// # 戻り値
/// - 正規化されたRGB画像データ (C, H, W) の順で平坦化、長さ `3 * IMAGE_SIZE * IMAGE_SIZE`
pub fn load_and_normalize_image(path: &Path) -> anyhow::Result<Vec<f32>> {
    let img = load_rgb(path)?;
    Ok(normalize_rgb(&img))
}

/// RGB画像をモデル入力サイズへリサイズして正規化する
pub fn normalize_rgb(img: &RgbImage) -> Vec<f32> {
    let size = IMAGE_SIZE as u32;
    let resized;
    let img = if img.dimensions() == (size, size) {
        img
    } else {
        // 縮小時は三角フィルタの台が広がるのでアンチエイリアスされたバイリニアになる
        resized = image::imageops::resize(img, size, size, FilterType::Triangle);
        &resized
    };

    let mut data = Vec::with_capacity(3 * IMAGE_SIZE * IMAGE_SIZE);
    for channel in 0..3 {
        for y in 0..size {
            for x in 0..size {
                let pixel = img.get_pixel(x, y);
                let value = pixel[channel] as f32 / 255.0;
                data.push((value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]);
            }
        }
    }

    data
}
