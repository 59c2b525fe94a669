//! 予測画面のTauriコマンド

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tauri::{AppHandle, Emitter, State};
use tauri_plugin_dialog::DialogExt;

use crate::backend::CpuBackend;
use crate::ml::preprocess::IMAGE_EXTENSIONS;
use crate::ml::InferenceEngine;
use crate::presentation::{preview_data_url, PredictionView, Typewriter, UiPhase, REVEAL_INTERVAL_MS};
use crate::AppState;

/// 見出しの表示途中の文字列
pub const HEADLINE_EVENT: &str = "headline-progress";
/// 画面状態の変化
pub const PHASE_EVENT: &str = "ui-phase-changed";

/// 見出し表示イベントのペイロード
#[derive(Clone, Serialize)]
pub struct HeadlineProgress {
    pub generation: u64,
    pub text: String,
    pub done: bool,
}

/// 画面状態とそれを起こした予測の番号
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseChange {
    pub generation: u64,
    #[serde(flatten)]
    pub state: UiPhase,
}

/// 画像選択ダイアログを開く
///
/// キャンセルされた場合は `None`。
#[tauri::command]
pub async fn pick_image(app: AppHandle) -> Result<Option<String>, String> {
    let picked = tauri::async_runtime::spawn_blocking(move || {
        app.dialog()
            .file()
            .set_title("Select Image")
            .add_filter("Image Files", &IMAGE_EXTENSIONS)
            .blocking_pick_file()
    })
    .await
    .map_err(|e| e.to_string())?;

    match picked {
        Some(file) => file
            .into_path()
            .map(|path| Some(path.to_string_lossy().into_owned()))
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

/// 選択された画像を分類して表示内容を返す
///
/// 見出しは `HEADLINE_EVENT` で1文字ずつ送られる。前の表示が残っていても
/// 新しい予測が始まった時点で打ち切られる。
#[tauri::command]
pub fn predict_image(
    app: AppHandle,
    state: State<'_, AppState>,
    path: String,
) -> Result<PredictionView, String> {
    let path = PathBuf::from(path);
    let generation = state.reveal_generation.fetch_add(1, Ordering::SeqCst) + 1;
    update_phase(&app, &state.phase, generation, UiPhase::begin_prediction);

    let result = state
        .engine
        .lock()
        .map_err(|_| anyhow::anyhow!("Inference engine is unavailable"))
        .and_then(|engine| build_view(&engine, &path));

    match result {
        Ok(view) => {
            let diagnosis = view.diagnosis;
            update_phase(&app, &state.phase, generation, |phase| phase.show(diagnosis));
            spawn_reveal(
                app,
                state.phase.clone(),
                state.reveal_generation.clone(),
                generation,
                view.headline.clone(),
            );
            Ok(view)
        }
        Err(e) => {
            log::error!("Prediction failed for {}: {:#}", path.display(), e);
            update_phase(&app, &state.phase, generation, UiPhase::abort);
            Err(e.to_string())
        }
    }
}

/// 現在の画面状態（画面の再読み込み時に使う）
#[tauri::command]
pub fn get_ui_phase(state: State<'_, AppState>) -> Result<PhaseChange, String> {
    let current = state.phase.lock().map_err(|e| e.to_string())?;
    Ok(PhaseChange {
        generation: state.reveal_generation.load(Ordering::SeqCst),
        state: *current,
    })
}

fn build_view(engine: &InferenceEngine<CpuBackend>, path: &Path) -> anyhow::Result<PredictionView> {
    let diagnosis = engine.predict(path)?;
    let preview = preview_data_url(path)?;
    Ok(PredictionView::new(diagnosis, preview))
}

fn update_phase(
    app: &AppHandle,
    phase: &Mutex<UiPhase>,
    generation: u64,
    change: impl FnOnce(&mut UiPhase),
) {
    if let Ok(mut current) = phase.lock() {
        change(&mut current);
        emit(
            app,
            PHASE_EVENT,
            PhaseChange {
                generation,
                state: *current,
            },
        );
    }
}

fn emit<S: Serialize + Clone>(app: &AppHandle, event: &str, payload: S) {
    if let Err(e) = app.emit(event, payload) {
        log::debug!("Failed to emit {}: {}", event, e);
    }
}

/// 見出しを一定間隔で1文字ずつ送るタスクを起動
fn spawn_reveal(
    app: AppHandle,
    phase: Arc<Mutex<UiPhase>>,
    latest: Arc<AtomicU64>,
    generation: u64,
    headline: String,
) {
    tauri::async_runtime::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_millis(REVEAL_INTERVAL_MS));
        // 最初の tick は即座に完了する
        interval.tick().await;

        let mut steps = Typewriter::new(&headline).peekable();
        while let Some(text) = steps.next() {
            interval.tick().await;

            if latest.load(Ordering::SeqCst) != generation {
                return;
            }

            let progress = HeadlineProgress {
                generation,
                text,
                done: steps.peek().is_none(),
            };
            emit(&app, HEADLINE_EVENT, progress);
        }

        if latest.load(Ordering::SeqCst) == generation {
            update_phase(&app, &phase, generation, UiPhase::finish_reveal);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Diagnosis;

    #[test]
    fn test_phase_change_payload() {
        let json = serde_json::to_value(PhaseChange {
            generation: 3,
            state: UiPhase::Displaying {
                diagnosis: Diagnosis::Pneumonia,
            },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "generation": 3,
                "phase": "displaying",
                "diagnosis": "Pneumonia",
            })
        );

        let json = serde_json::to_value(PhaseChange {
            generation: 4,
            state: UiPhase::Predicting,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "generation": 4, "phase": "predicting" }));
    }

    #[test]
    fn test_headline_progress_payload() {
        let json = serde_json::to_value(HeadlineProgress {
            generation: 2,
            text: "Pred".to_string(),
            done: false,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "generation": 2, "text": "Pred", "done": false })
        );
    }
}
