use std::path::Path;

use burn::module::AutodiffModule;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};

use pneumonia_detector_lib::ml::{
    fit, save_weights, InferenceEngine, PneumoniaNetConfig, TrainingConfig,
};

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

fn write_split(root: &Path, per_class: usize) {
    for (class, base) in [("NORMAL", 40u8), ("PNEUMONIA", 180u8)] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let mut img = image::RgbImage::new(64, 64);
            for (x, y, pixel) in img.enumerate_pixels_mut() {
                let v = base.wrapping_add(((x + y) as u8).wrapping_mul(i as u8 + 1) / 8);
                *pixel = image::Rgb([v, v, v]);
            }
            img.save(dir.join(format!("{}.png", i))).unwrap();
        }
    }
}

#[test]
fn saved_weights_reproduce_in_memory_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_split(&root.join("train"), 4);
    write_split(&root.join("val"), 1);
    write_split(&root.join("test"), 1);

    let config = TrainingConfig {
        train_dir: root.join("train"),
        val_dir: root.join("val"),
        test_dir: root.join("test"),
        output_path: root.join("pneumonia_model.mpk"),
        pretrained_weights: None,
        model: PneumoniaNetConfig::tiny(),
        num_epochs: 1,
        batch_size: 4,
        num_workers: 0,
        learning_rate: 1e-3,
        seed: 7,
    };

    let device = NdArrayDevice::Cpu;
    let (trained, report) = fit::<TrainBackend>(&config, device).unwrap();
    assert_eq!(report.epoch_losses.len(), 1);

    let trained = trained.valid();
    let saved = save_weights(trained.clone(), &config.output_path).unwrap();

    let in_memory = InferenceEngine::<InferBackend>::from_model(trained, device);
    let reloaded = InferenceEngine::<InferBackend>::load(&saved, &config.model, device).unwrap();

    for class in ["NORMAL", "PNEUMONIA"] {
        let image = root.join("test").join(class).join("0.png");
        let (a_diagnosis, a) = in_memory.predict_with_confidence(&image).unwrap();
        let (b_diagnosis, b) = reloaded.predict_with_confidence(&image).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
        assert_eq!(a_diagnosis, b_diagnosis);
    }
}
