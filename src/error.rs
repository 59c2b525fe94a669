//! エラー型定義
//!
//! 学習・推論で発生する分類可能なエラー。その他の失敗は `anyhow` でそのまま伝播させる。

use std::path::PathBuf;

use thiserror::Error;

/// 検出器のエラー
#[derive(Error, Debug)]
pub enum DetectorError {
    /// 予測対象の画像ファイルが存在しない
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    /// 画像のデコードに失敗
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// 学習用フォルダにクラスや画像が見つからない
    #[error("No usable images under '{0}'")]
    EmptyDataset(PathBuf),

    /// 重みファイルの読み込みに失敗
    #[error("Failed to load model weights '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_include_path() {
        let err = DetectorError::ImageNotFound(PathBuf::from("scan.png"));
        assert_eq!(err.to_string(), "Image not found: scan.png");

        let err = DetectorError::ModelLoad {
            path: PathBuf::from("pneumonia_model.mpk"),
            reason: "file not found".to_string(),
        };
        assert!(err.to_string().contains("pneumonia_model.mpk"));
        assert!(err.to_string().contains("file not found"));
    }
}
