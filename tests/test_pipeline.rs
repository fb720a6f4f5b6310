//! End-to-end tests for `run_experiment`
//!
//! This file covers:
//! - Artifacts written into a fresh run directory
//! - Validation modes feeding the history
//! - Failures that must leave no run directory behind
//! - The shipped experiment configs

use std::path::Path;

use mnist_experiments::config::{load_config, ExperimentConfig};
use mnist_experiments::data::Corpus;
use mnist_experiments::error::Error;
use mnist_experiments::pipeline::{
    run_experiment, Stage, CONFUSION_FILE, HISTORY_FILE, LAYER_GRAPH_FILE,
};
use mnist_experiments::train::run::EVENTS_FILE;
use mnist_experiments::train::{read_events, RunId, TAG_TRAIN_LOSS, TAG_VALIDATION_ACCURACY};
use mnist_experiments::utils::SimpleRng;
use serde_json::json;

const SIDE: usize = 4;

// Each image lights up the pixel matching its label over low noise.
fn synthetic_corpus(train: usize, test: usize) -> Corpus {
    let mut rng = SimpleRng::new(17);
    let mut split = |count: usize| {
        let mut pixels = Vec::with_capacity(count * SIDE * SIDE);
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            let label = rng.gen_usize(10);
            for p in 0..SIDE * SIDE {
                pixels.push(if p == label { 255 } else { rng.gen_usize(40) as u8 });
            }
            labels.push(label as u8);
        }
        (pixels, labels)
    };
    let (train_pixels, train_labels) = split(train);
    let (test_pixels, test_labels) = split(test);
    Corpus::from_parts(
        SIDE,
        SIDE,
        train_pixels,
        train_labels,
        test_pixels,
        test_labels,
    )
    .unwrap()
}

fn mlp_config(log_root: &Path, validation: serde_json::Value) -> ExperimentConfig {
    serde_json::from_value(json!({
        "name": "pipeline-test",
        "data": { "train_samples": 400, "test_samples": 100, "seed": 5 },
        "architecture": { "layers": [
            { "layer_type": "dense", "input_size": 16, "output_size": 24 },
            { "layer_type": "activation", "size": 24, "function": "relu" },
            { "layer_type": "dense", "input_size": 24, "output_size": 10 },
            { "layer_type": "activation", "size": 10, "function": "softmax" }
        ]},
        "training": {
            "batch_size": 32,
            "epochs": 4,
            "optimizer": { "kind": "adam", "learning_rate": 0.01 },
            "validation": validation
        },
        "logging": { "log_root": log_root }
    }))
    .unwrap()
}

// ============================================================================
// Artifact Tests
// ============================================================================

mod artifact_tests {
    use super::*;

    #[test]
    fn test_run_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "none" }));
        let corpus = synthetic_corpus(500, 200);

        let report = run_experiment(&config, &corpus, RunId(1)).unwrap();

        assert_eq!(report.stage, Stage::Evaluated);
        assert_eq!(report.name.as_deref(), Some("pipeline-test"));
        assert_eq!(report.run_dir, dir.path().join("experiment-1"));
        for name in [EVENTS_FILE, HISTORY_FILE, CONFUSION_FILE, LAYER_GRAPH_FILE] {
            let path = report.run_dir.join(name);
            assert!(path.is_file(), "missing {}", path.display());
            assert!(report.artifacts.contains(&path));
        }
        assert_eq!(report.history.len(), 4);
        assert_eq!(report.confusion.total(), 100);
        assert_eq!(report.evaluation.predictions.len(), 100);
        assert_eq!(report.parameter_count, (16 * 24 + 24) + (24 * 10 + 10));
        assert!(report.summary.contains("Total params"));
    }

    #[test]
    fn test_event_log_matches_history() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "none" }));
        let report = run_experiment(&config, &synthetic_corpus(500, 100), RunId(2)).unwrap();

        let events = read_events(report.run_dir.join(EVENTS_FILE)).unwrap();
        let losses: Vec<f32> = events
            .iter()
            .filter(|e| e.tag == TAG_TRAIN_LOSS)
            .map(|e| e.value)
            .collect();
        let recorded: Vec<f32> = report.history.records().iter().map(|r| r.loss).collect();
        assert_eq!(losses, recorded);
        assert!(events.iter().all(|e| e.tag != TAG_VALIDATION_ACCURACY));
    }

    #[test]
    fn test_history_csv_has_row_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "test_split" }));
        let report = run_experiment(&config, &synthetic_corpus(500, 100), RunId(1)).unwrap();

        let csv = std::fs::read_to_string(report.run_dir.join(HISTORY_FILE)).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("epoch,loss,accuracy,val_loss,val_accuracy"));
        assert_eq!(lines.count(), 4);
    }

    #[test]
    fn test_disabled_outputs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mlp_config(dir.path(), json!({ "kind": "none" }));
        config.logging.event_log = false;
        config.output.confusion_heatmap = false;
        config.output.layer_graph = false;

        let report = run_experiment(&config, &synthetic_corpus(500, 100), RunId(1)).unwrap();
        assert_eq!(report.artifacts, vec![report.run_dir.join(HISTORY_FILE)]);
        assert!(!report.run_dir.join(CONFUSION_FILE).exists());
    }
}

// ============================================================================
// Validation Mode Tests
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_test_split_validation_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "test_split" }));
        let report = run_experiment(&config, &synthetic_corpus(500, 100), RunId(1)).unwrap();

        let last = report.history.last().unwrap();
        assert_eq!(last.val_accuracy, Some(report.evaluation.accuracy));
    }

    #[test]
    fn test_holdout_validation_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "holdout", "fraction": 0.25 }));
        let report = run_experiment(&config, &synthetic_corpus(500, 100), RunId(1)).unwrap();

        assert!(report.history.records().iter().all(|r| r.val_loss.is_some()));
        // The test split is still evaluated in full.
        assert_eq!(report.confusion.total(), 100);
    }

    #[test]
    fn test_same_seed_reproduces_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "none" }));
        let corpus = synthetic_corpus(500, 100);

        let a = run_experiment(&config, &corpus, RunId(1)).unwrap();
        let b = run_experiment(&config, &corpus, RunId(2)).unwrap();
        assert_eq!(a.history, b.history);
        assert_eq!(a.evaluation.predictions, b.evaluation.predictions);
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn test_reused_run_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = mlp_config(dir.path(), json!({ "kind": "none" }));
        let corpus = synthetic_corpus(500, 100);

        run_experiment(&config, &corpus, RunId(1)).unwrap();
        assert!(matches!(
            run_experiment(&config, &corpus, RunId(1)),
            Err(Error::RunDirectoryExists(_))
        ));
    }

    #[test]
    fn test_over_request_leaves_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("logs");
        let config = mlp_config(&root, json!({ "kind": "none" }));

        let result = run_experiment(&config, &synthetic_corpus(300, 100), RunId(1));
        assert!(matches!(result, Err(Error::SampleCount { requested: 400, available: 300, .. })));
        assert!(!root.join("experiment-1").exists());
    }

    #[test]
    fn test_architecture_input_mismatch_fails_before_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mlp_config(dir.path(), json!({ "kind": "none" }));
        if let mnist_experiments::architecture::LayerSpec::Dense { input_size, .. } =
            &mut config.architecture.layers[0]
        {
            *input_size = 784;
        }
        // The sampled features are 16 wide.
        let result = run_experiment(&config, &synthetic_corpus(500, 100), RunId(1));
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch {
                index: 0,
                expected: 784,
                actual: 16
            })
        ));
        assert!(!dir.path().join("experiment-1").exists());
    }
}

// ============================================================================
// Shipped Config Tests
// ============================================================================

mod shipped_config_tests {
    use super::*;

    #[test]
    fn test_shipped_configs_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        for name in ["mnist_mlp.json", "mnist_cnn.json", "mnist_sgd_mse.json"] {
            let config = load_config(root.join(name)).unwrap();
            assert_eq!(config.architecture.output_size(), Some(10), "{name}");
            assert_eq!(config.architecture.input_size(), Some(784), "{name}");
        }
    }
}
