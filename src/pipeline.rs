//! End-to-end experiment: `Loaded -> Built -> Trained -> Evaluated`.
//!
//! Each stage runs once; the first error stops the run. Sampling and model
//! construction happen before the run directory is created, so a bad request
//! or a mis-shaped architecture leaves nothing behind on disk.

use std::fmt;
use std::path::PathBuf;

use crate::architecture::build_model;
use crate::config::{validate_config, DataConfig, ExperimentConfig};
use crate::data::{Corpus, SampleRequest};
use crate::error::Result;
use crate::evaluate::{ConfusionMatrix, Evaluation, Evaluator};
use crate::report::{write_confusion_heatmap, write_layer_graph};
use crate::train::{EventLog, History, MetricSink, RunDirectory, RunId, Trainer, Validation};
use crate::utils::rng::SimpleRng;

pub const HISTORY_FILE: &str = "history.csv";
pub const CONFUSION_FILE: &str = "confusion.png";
pub const LAYER_GRAPH_FILE: &str = "model.dot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Loaded,
    Built,
    Trained,
    Evaluated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "loaded",
            Stage::Built => "built",
            Stage::Trained => "trained",
            Stage::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// The config's `name`, if it has one.
    pub name: Option<String>,
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub stage: Stage,
    pub summary: String,
    pub parameter_count: usize,
    pub history: History,
    pub evaluation: Evaluation,
    pub confusion: ConfusionMatrix,
    /// Files written into the run directory.
    pub artifacts: Vec<PathBuf>,
}

/// Loads the corpus a data config points at, downloading it first when asked.
pub fn load_corpus(data: &DataConfig) -> Result<Corpus> {
    if data.download {
        #[cfg(feature = "download")]
        return Corpus::fetch(&data.dir);
        #[cfg(not(feature = "download"))]
        return Err(crate::error::Error::config(
            "data.download requires building with the `download` feature",
        ));
    }
    Corpus::load(&data.dir)
}

fn completed(stage: Stage) {
    tracing::info!(%stage, "stage complete");
}

/// Runs one experiment on `corpus` into `<log_root>/experiment-<run_id>`.
pub fn run_experiment(
    config: &ExperimentConfig,
    corpus: &Corpus,
    run_id: RunId,
) -> Result<ExperimentReport> {
    validate_config(config)?;
    let name = config.name.as_deref().unwrap_or("unnamed");
    let _span = tracing::info_span!("experiment", %name, run = %run_id).entered();
    let mut rng = SimpleRng::from_optional_seed(config.data.seed);

    let request = SampleRequest {
        train: config.data.train_samples,
        test: config.data.test_samples,
    };
    let (train, test) = corpus.sample(request, config.data.feature_shape, &mut rng)?;
    completed(Stage::Loaded);

    let mut model = build_model(&config.architecture, train.feature_len(), &mut rng)?;
    let summary = model.summary();
    tracing::debug!("model summary\n{summary}");
    completed(Stage::Built);

    let (train, holdout) = match config.training.validation {
        Validation::Holdout { fraction } => {
            let (kept, held) = train.split_tail(fraction)?;
            (kept, Some(held))
        }
        _ => (train, None),
    };
    let validation = match config.training.validation {
        Validation::None => None,
        Validation::TestSplit => Some(&test),
        Validation::Holdout { .. } => holdout.as_ref(),
    };

    let run = RunDirectory::create(&config.logging.log_root, run_id)?;
    let mut artifacts = Vec::new();
    let mut event_log = config.logging.event_log.then(|| EventLog::new(&run));
    if let Some(log) = &event_log {
        artifacts.push(log.path().to_path_buf());
    }

    let shuffle_seed = ((rng.next_u32() as u64) << 32) | rng.next_u32() as u64;
    let shuffle_rng = SimpleRng::new(shuffle_seed);
    let mut trainer = Trainer::new(config.training.clone(), shuffle_rng);
    let sink = event_log.as_mut().map(|log| log as &mut dyn MetricSink);
    let history = trainer.fit(&mut model, &train, validation, sink)?;
    completed(Stage::Trained);

    let evaluator = Evaluator::new(config.training.loss, config.training.batch_size);
    let evaluation = evaluator.evaluate(&model, &test)?;
    let confusion = ConfusionMatrix::from_predictions(
        test.labels(),
        &evaluation.predictions,
        test.num_classes(),
    )?;
    tracing::info!(
        loss = evaluation.loss,
        accuracy = evaluation.accuracy,
        examples = confusion.total(),
        "test evaluation"
    );

    if config.output.history_csv {
        let path = run.file(HISTORY_FILE);
        history.write_csv(&path)?;
        artifacts.push(path);
    }
    if config.output.confusion_heatmap {
        let path = run.file(CONFUSION_FILE);
        write_confusion_heatmap(&confusion, &path)?;
        artifacts.push(path);
    }
    if config.output.layer_graph {
        let path = run.file(LAYER_GRAPH_FILE);
        write_layer_graph(&model, &path)?;
        artifacts.push(path);
    }
    completed(Stage::Evaluated);

    Ok(ExperimentReport {
        name: config.name.clone(),
        run_id,
        run_dir: run.path().to_path_buf(),
        stage: Stage::Evaluated,
        summary,
        parameter_count: model.parameter_count(),
        history,
        evaluation,
        confusion,
        artifacts,
    })
}
