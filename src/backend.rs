//! 計算バックエンドの型定義と学習の振り分け

use anyhow::Result;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "wgpu")]
use burn_wgpu::{Wgpu, WgpuDevice};

use crate::config::DeviceType;
use crate::ml::training::{train_model, TrainingConfig, TrainingReport};

/// 推論用 CPU バックエンド
pub type CpuBackend = NdArray<f32>;
/// 学習用 CPU バックエンド
pub type TrainCpuBackend = Autodiff<CpuBackend>;

/// GPU バックエンド
#[cfg(feature = "wgpu")]
pub type GpuBackend = Wgpu;
/// 学習用 GPU バックエンド
#[cfg(feature = "wgpu")]
pub type TrainGpuBackend = Autodiff<GpuBackend>;

pub fn cpu_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// 設定されたデバイスで学習を実行
pub fn run_training(device_type: &DeviceType, config: &TrainingConfig) -> Result<TrainingReport> {
    match device_type {
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => {
            let device = WgpuDevice::DefaultDevice;
            log::info!("Training on {} ({:?})", device_type, device);
            train_model::<TrainGpuBackend>(config, device)
        }
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => {
            log::warn!("Built without the `wgpu` feature; training on CPU instead");
            train_model::<TrainCpuBackend>(config, cpu_device())
        }
        DeviceType::Cpu => {
            log::info!("Training on {}", device_type);
            train_model::<TrainCpuBackend>(config, cpu_device())
        }
    }
}
