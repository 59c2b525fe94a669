//! 肺炎分類モデルの学習用バイナリ
//!
//! 設定は作業ディレクトリの `config.json`（無ければ既定値）から読み込む。

use pneumonia_detector_lib::backend::run_training;
use pneumonia_detector_lib::config::AppConfig;
use pneumonia_detector_lib::init_logging;

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::load_or_default();
    config.log_summary();

    let report = run_training(&config.device_type, &config.training_config())?;

    if let Some(path) = &report.output_path {
        log::info!(
            "Finished {} epochs on {} images; weights at {}",
            report.epoch_losses.len(),
            report.train_samples,
            path.display()
        );
    }

    Ok(())
}
