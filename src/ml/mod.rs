pub mod dataset;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod pretrained;
pub mod training;

pub use dataset::{XrayBatch, XrayBatcher, XrayFolderDataset, XrayItem};
pub use inference::InferenceEngine;
pub use model::{load_weights, save_weights, PneumoniaNet, PneumoniaNetConfig};
pub use preprocess::{load_and_normalize_image, normalize_rgb, IMAGE_SIZE};
pub use training::{fit, train_model, TrainingConfig, TrainingReport};
