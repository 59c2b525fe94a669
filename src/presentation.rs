//! 予測結果の表示内容
//!
//! 見出し（1文字ずつ表示）、見出し色、説明文、プレビュー画像を組み立てる。

use std::path::Path;

use base64::Engine;
use image::{imageops::FilterType, ImageEncoder};
use serde::Serialize;

use crate::diagnosis::Diagnosis;
use crate::error::DetectorError;

/// 見出しを1文字ずつ表示する間隔
pub const REVEAL_INTERVAL_MS: u64 = 50;

/// プレビュー画像の最大辺（縦横比は保持）
pub const PREVIEW_SIZE: u32 = 300;

pub const PNEUMONIA_HEADLINE: &str = "Prediction: Pneumonia❗";
pub const NORMAL_HEADLINE: &str = "Prediction: Normal ✅";

pub const PNEUMONIA_GUIDANCE: &str = "🔴 **Medical Guidance:**\n\n\
💊 Medication:\n\
• Antibiotics as prescribed\n\
• Fever reducers (e.g., paracetamol)\n\n\
🛡️ Prevention:\n\
• Vaccination\n\
• Avoid smoking\n\
• Maintain Good hygiene\n\n\
🩺 When to See a Doctor:\n\
• Breathing difficulty\n\
• High fever\n\
• Chest pain\n";

pub const NORMAL_GUIDANCE: &str = "🌟 *Your lungs look healthy!*\n\n\
“Take care of your body. It’s the only place you have to live.”\n\n\
Stay active, eat well, and keep smiling! 😊";

pub fn headline(diagnosis: Diagnosis) -> &'static str {
    match diagnosis {
        Diagnosis::Pneumonia => PNEUMONIA_HEADLINE,
        Diagnosis::Normal => NORMAL_HEADLINE,
    }
}

pub fn headline_color(diagnosis: Diagnosis) -> &'static str {
    match diagnosis {
        Diagnosis::Pneumonia => "red",
        Diagnosis::Normal => "lightgreen",
    }
}

pub fn guidance(diagnosis: Diagnosis) -> &'static str {
    match diagnosis {
        Diagnosis::Pneumonia => PNEUMONIA_GUIDANCE,
        Diagnosis::Normal => NORMAL_GUIDANCE,
    }
}

/// フロントエンドへ返す予測結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    pub diagnosis: Diagnosis,
    pub headline: String,
    pub headline_color: String,
    pub guidance: String,
    /// `data:image/png;base64,...`
    pub preview: String,
    pub reveal_interval_ms: u64,
}

impl PredictionView {
    pub fn new(diagnosis: Diagnosis, preview: String) -> Self {
        Self {
            diagnosis,
            headline: headline(diagnosis).to_string(),
            headline_color: headline_color(diagnosis).to_string(),
            guidance: guidance(diagnosis).to_string(),
            preview,
            reveal_interval_ms: REVEAL_INTERVAL_MS,
        }
    }
}

/// 文字列の先頭から1文字ずつ伸ばした部分文字列を返すイテレータ
///
/// 最初の要素は1文字目、最後の要素は全文。空文字列なら何も返さない。
#[derive(Debug, Clone)]
pub struct Typewriter {
    chars: Vec<char>,
    shown: usize,
}

impl Typewriter {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            shown: 0,
        }
    }
}

impl Iterator for Typewriter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.shown >= self.chars.len() {
            return None;
        }
        self.shown += 1;
        Some(self.chars[..self.shown].iter().collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chars.len() - self.shown;
        (remaining, Some(remaining))
    }
}

/// 画面の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum UiPhase {
    /// 画像選択待ち
    #[default]
    Idle,
    /// 推論中
    Predicting,
    /// 見出しを表示中
    Displaying { diagnosis: Diagnosis },
}

impl UiPhase {
    /// 画像が選ばれた（表示中でも新しい予測を開始する）
    pub fn begin_prediction(&mut self) {
        *self = UiPhase::Predicting;
    }

    /// 予測が終わり見出しの表示を始めた
    pub fn show(&mut self, diagnosis: Diagnosis) {
        *self = UiPhase::Displaying { diagnosis };
    }

    /// 予測に失敗した
    pub fn abort(&mut self) {
        *self = UiPhase::Idle;
    }

    /// 見出しを最後まで表示した
    pub fn finish_reveal(&mut self) {
        if matches!(self, UiPhase::Displaying { .. }) {
            *self = UiPhase::Idle;
        }
    }
}

/// プレビュー用に縮小した画像を PNG の data URL にする
pub fn preview_data_url(path: &Path) -> anyhow::Result<String> {
    if !path.is_file() {
        return Err(DetectorError::ImageNotFound(path.to_path_buf()).into());
    }
    let img = image::open(path).map_err(|source| DetectorError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;

    let rgba_image = img
        .resize(PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Triangle)
        .to_rgba8();

    // PNG形式でメモリ上にエンコード
    let mut png_data = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_data);
    encoder.write_image(
        rgba_image.as_raw(),
        rgba_image.width(),
        rgba_image.height(),
        image::ExtendedColorType::Rgba8,
    )?;

    let base64_data = base64::engine::general_purpose::STANDARD.encode(&png_data);
    Ok(format!("data:image/png;base64,{}", base64_data))
}
