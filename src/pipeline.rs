//! End-to-end run: corpus → split → train → evaluate → persist.
//!
//! The `train` binary is a thin wrapper around [`run`]; integration tests
//! drive the same function against temporary directories.

use std::path::PathBuf;
use tracing::info;

use crate::artifact::{HandoffProducts, ModelArtifact};
use crate::config::TrainingConfig;
use crate::dataset::{AssemblyReport, CorpusAssembler};
use crate::device::{DeviceProbe, RunContext};
use crate::error::TrainResult;
use crate::eval::{Evaluator, TestEvaluation};
use crate::graph::PoseGraphBuilder;
use crate::model::build_classifier;
use crate::split::DatasetSplitter;
use crate::trainer::{EpochMetrics, Trainer};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Resolved device and data layout.
    pub context: RunContext,
    /// Corpus assembly counts.
    pub assembly: AssemblyReport,
    /// Number of samples in the train, val and test splits.
    pub split_sizes: (usize, usize, usize),
    /// Per-epoch metrics.
    pub epochs: Vec<EpochMetrics>,
    /// Test evaluation.
    pub evaluation: TestEvaluation,
    /// The persisted artifact.
    pub artifact: ModelArtifact,
    /// Hand-off files written.
    pub handoff_files: Vec<PathBuf>,
}

/// Execute a full training run for `config`.
///
/// The configuration is validated first; every later failure is fatal and
/// returned unchanged.
pub fn run(
    config: &TrainingConfig,
    probe: &dyn DeviceProbe,
    show_progress: bool,
) -> TrainResult<RunSummary> {
    config.validate()?;
    let context = RunContext::resolve(config, probe);

    let builder = PoseGraphBuilder::from_config(config)?;
    let assembler =
        CorpusAssembler::new(builder, config.sample_percentage)?.with_progress(show_progress);
    let (corpus, assembly) = assembler.assemble(&context)?;

    let indices = DatasetSplitter::from_config(config)?.split(&corpus)?;
    let split = indices.views(&corpus);
    let split_sizes = (split.train.len(), split.val.len(), split.test.len());

    let mut model = build_classifier(config, context.device)?;
    let epochs = Trainer::new(config).with_progress(show_progress).fit(model.as_mut(), &split)?;

    let evaluation = Evaluator::new(config.batch_size).evaluate(model.as_mut(), &split.test)?;

    let artifact = ModelArtifact::new(model.as_ref(), &evaluation, config)?;
    artifact.save(&config.artifact_path)?;

    let handoff = HandoffProducts::new(&epochs, &evaluation, split.test.get(0));
    let handoff_files = handoff.write(&config.report_dir)?;

    info!("Training complete");
    Ok(RunSummary { context, assembly, split_sizes, epochs, evaluation, artifact, handoff_files })
}
