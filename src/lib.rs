pub mod backend;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod ml;
pub mod prediction_commands;
pub mod presentation;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use tauri::{AppHandle, Manager};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use backend::{cpu_device, CpuBackend};
use config::AppConfig;
use error::DetectorError;
use ml::{InferenceEngine, PneumoniaNetConfig};
use presentation::UiPhase;

pub const MAIN_WINDOW_LABEL: &str = "main";
pub const WINDOW_TITLE: &str = "Pneumonia Detection";

pub struct AppState {
    engine: Mutex<InferenceEngine<CpuBackend>>,
    phase: Arc<Mutex<UiPhase>>,
    reveal_generation: Arc<AtomicU64>, // 最新の予測番号（古い見出し表示の打ち切り用）
}

impl AppState {
    pub fn new(engine: InferenceEngine<CpuBackend>) -> Self {
        Self {
            engine: Mutex::new(engine),
            phase: Arc::new(Mutex::new(UiPhase::Idle)),
            reveal_generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// `RUST_LOG` が未設定なら info レベルでログを出す
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// 起動時に学習済み重みを読み込む
pub fn load_engine(config: &AppConfig) -> Result<InferenceEngine<CpuBackend>, DetectorError> {
    InferenceEngine::load(&config.weights_path(), &PneumoniaNetConfig::new(), cpu_device())
}

/// 起動失敗ダイアログの本文
pub fn startup_error_message(err: &DetectorError) -> String {
    format!("Could not load model: {}", err)
}

fn create_main_window(app: &AppHandle) -> tauri::Result<()> {
    tauri::WebviewWindowBuilder::new(
        app,
        MAIN_WINDOW_LABEL,
        tauri::WebviewUrl::App("index.html".into()),
    )
    .title(WINDOW_TITLE)
    .inner_size(1000.0, 600.0)
    .min_inner_size(900.0, 500.0)
    .maximized(true)
    .build()?;

    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();
    let config = AppConfig::load_or_default();

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            match load_engine(&config) {
                Ok(engine) => {
                    app.manage(AppState::new(engine));
                    create_main_window(app.handle())?;
                }
                Err(e) => {
                    // ウィンドウは作らず、ダイアログを閉じたら終了する
                    log::error!("{}", e);
                    let handle = app.handle().clone();
                    app.dialog()
                        .message(startup_error_message(&e))
                        .title("Error")
                        .kind(MessageDialogKind::Error)
                        .show(move |_| handle.exit(1));
                }
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            prediction_commands::pick_image,
            prediction_commands::predict_image,
            prediction_commands::get_ui_phase,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_weights_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.model.weights_path = dir
            .path()
            .join("pneumonia_model.mpk")
            .to_string_lossy()
            .into_owned();

        let err = match load_engine(&config) {
            Ok(_) => panic!("engine loaded without weights"),
            Err(e) => e,
        };
        assert!(matches!(err, DetectorError::ModelLoad { .. }));

        let message = startup_error_message(&err);
        assert!(message.starts_with("Could not load model: "));
        assert!(message.contains("pneumonia_model.mpk"));
    }

    #[test]
    fn test_new_state_is_idle() {
        let device = cpu_device();
        let model = PneumoniaNetConfig::tiny().init::<CpuBackend>(&device);
        let state = AppState::new(InferenceEngine::from_model(model, device));
        assert_eq!(*state.phase.lock().unwrap(), UiPhase::Idle);
    }
}
