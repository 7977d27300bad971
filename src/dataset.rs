//! Labeled corpus assembly from per-class keypoint directories.
//!
//! # Directory layout
//!
//! ```text
//! <data_dir>/
//!   violent/
//!     cam1/[processed/]*.json
//!     cam2/[processed/]*.json      (optional)
//!   non-violent/
//!     cam1/[processed/]*.json
//!     cam2/[processed/]*.json      (optional)
//! ```
//!
//! Every `*.json` file in a class directory contributes one graph per valid
//! person instance, labeled with that directory's class. Files are visited in
//! sorted path order and truncated to `max(1, ⌊n · P / 100⌋)` files, so the
//! assembled corpus is a deterministic function of the directory contents.
//!
//! Instances the graph builder rejects are counted and skipped. A camera
//! contributes only when both of its class directories exist; a half-present
//! camera is skipped whole with a warning. No complete camera, a used
//! directory with no JSON files, or an empty final corpus abort the run.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::device::{CameraSource, RunContext};
use crate::error::{ConfigError, DatasetError, TrainError, TrainResult};
use crate::graph::{PoseGraph, PoseGraphBuilder};
use crate::keypoints::{ClassLabel, KeypointFile};

/// Class processing order within a camera.
const CLASS_ORDER: [ClassLabel; 2] = [ClassLabel::Violent, ClassLabel::NonViolent];

// ---------------------------------------------------------------------------
// LabeledCorpus
// ---------------------------------------------------------------------------

/// Ordered collection of labeled pose graphs.
///
/// Order is assembly order; only the splitter reorders samples.
#[derive(Debug, Clone, Default)]
pub struct LabeledCorpus {
    graphs: Vec<PoseGraph>,
}

impl LabeledCorpus {
    /// Empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Corpus from pre-built graphs.
    pub fn from_graphs(graphs: Vec<PoseGraph>) -> Self {
        LabeledCorpus { graphs }
    }

    /// Append one graph.
    pub fn push(&mut self, graph: PoseGraph) {
        self.graphs.push(graph);
    }

    /// Append every graph of `other`, preserving its order.
    pub fn extend(&mut self, other: LabeledCorpus) {
        self.graphs.extend(other.graphs);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// `true` when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Sample at `idx`.
    pub fn get(&self, idx: usize) -> Option<&PoseGraph> {
        self.graphs.get(idx)
    }

    /// All samples in order.
    pub fn graphs(&self) -> &[PoseGraph] {
        &self.graphs
    }

    /// Labels in sample order.
    pub fn labels(&self) -> Vec<f32> {
        self.graphs.iter().map(PoseGraph::label).collect()
    }

    /// Number of violent samples.
    pub fn num_positive(&self) -> usize {
        self.graphs.iter().filter(|g| g.class() == ClassLabel::Violent).count()
    }

    /// Number of non-violent samples.
    pub fn num_negative(&self) -> usize {
        self.len() - self.num_positive()
    }

    /// Fail with [`TrainError::EmptyCorpus`] when there is nothing to train on.
    pub fn ensure_non_empty(&self) -> TrainResult<()> {
        if self.is_empty() {
            Err(TrainError::EmptyCorpus)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly statistics
// ---------------------------------------------------------------------------

/// Counts for one processed class directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Directory that was scanned.
    pub path: PathBuf,
    /// Class assigned to its samples.
    pub label: ClassLabel,
    /// JSON files present.
    pub files_found: usize,
    /// JSON files actually processed after percentage truncation.
    pub files_processed: usize,
    /// Person instances seen in processed files.
    pub instances_seen: usize,
    /// Graphs appended to the corpus.
    pub graphs_built: usize,
}

impl DirectoryStats {
    /// Instances rejected by the graph builder or the parser.
    pub fn skipped(&self) -> usize {
        self.instances_seen - self.graphs_built
    }
}

/// Counts for a whole assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// One entry per processed directory, in processing order.
    pub directories: Vec<DirectoryStats>,
    /// Cameras skipped because a class directory was missing.
    pub skipped_cameras: Vec<String>,
}

impl AssemblyReport {
    /// Total graphs across all directories.
    pub fn total_graphs(&self) -> usize {
        self.directories.iter().map(|d| d.graphs_built).sum()
    }

    /// Total files processed across all directories.
    pub fn total_files_processed(&self) -> usize {
        self.directories.iter().map(|d| d.files_processed).sum()
    }
}

// ---------------------------------------------------------------------------
// CorpusAssembler
// ---------------------------------------------------------------------------

/// Builds a [`LabeledCorpus`] from class directories.
#[derive(Debug, Clone)]
pub struct CorpusAssembler {
    builder: PoseGraphBuilder,
    sample_percentage: u32,
    show_progress: bool,
}

impl CorpusAssembler {
    /// Create an assembler processing `sample_percentage` percent of files.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `sample_percentage` is outside
    /// `[1, 100]`.
    pub fn new(builder: PoseGraphBuilder, sample_percentage: u32) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&sample_percentage) {
            return Err(ConfigError::invalid_value(
                "sample_percentage",
                format!("must be in [1, 100], got {sample_percentage}"),
            ));
        }
        Ok(CorpusAssembler { builder, sample_percentage, show_progress: false })
    }

    /// Show an `indicatif` progress bar per directory.
    pub fn with_progress(mut self, on: bool) -> Self {
        self.show_progress = on;
        self
    }

    /// Number of files to process out of `found`: `max(1, ⌊found · P / 100⌋)`,
    /// never more than `found`.
    pub fn files_to_process(&self, found: usize) -> usize {
        let n = found * self.sample_percentage as usize / 100;
        n.max(1).min(found)
    }

    /// Assemble the corpus for every camera source in `ctx`.
    ///
    /// A camera is one paired source: it is used only when both its violent
    /// and its non-violent directories exist, and skipped with a warning
    /// otherwise. Cameras are visited in configuration order; within a camera
    /// the violent directory is processed before the non-violent one.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::NoSourceForLabel`] if no camera is complete; the
    ///   label named is the first one missing from the first camera.
    /// - [`DatasetError::NoEligibleFiles`] if a used directory holds no JSON
    ///   files.
    /// - I/O and format errors from reading keypoint files.
    /// - [`TrainError::EmptyCorpus`] if no valid graph was produced.
    pub fn assemble(&self, ctx: &RunContext) -> TrainResult<(LabeledCorpus, AssemblyReport)> {
        let layout = &ctx.layout;
        let complete = |cam: &CameraSource| {
            CLASS_ORDER.iter().all(|&label| cam.dir_for(label).is_dir())
        };
        if !layout.cameras.iter().any(|cam| complete(cam)) {
            let label = layout
                .cameras
                .first()
                .and_then(|cam| CLASS_ORDER.into_iter().find(|&l| !cam.dir_for(l).is_dir()))
                .unwrap_or(ClassLabel::Violent);
            return Err(DatasetError::NoSourceForLabel {
                label: label.name().to_string(),
                data_dir: layout.data_dir.clone(),
            }
            .into());
        }

        let mut corpus = LabeledCorpus::new();
        let mut report = AssemblyReport::default();
        for cam in &layout.cameras {
            if !complete(cam) {
                for label in CLASS_ORDER {
                    let dir = cam.dir_for(label);
                    if !dir.is_dir() {
                        warn!("{} data for {} not found at {}", label.name(), cam.name, dir.display());
                    }
                }
                warn!("Skipping camera {}: both class directories are required", cam.name);
                report.skipped_cameras.push(cam.name.clone());
                continue;
            }
            info!("Loading and preprocessing data from {}", cam.name);
            let before = corpus.len();
            for label in CLASS_ORDER {
                let stats = self.assemble_directory(cam.dir_for(label), label, &mut corpus)?;
                report.directories.push(stats);
            }
            info!("Loaded {} graphs from {}", corpus.len() - before, cam.name);
        }

        corpus.ensure_non_empty()?;
        info!(
            "Total graphs: {} (violent: {}, non-violent: {})",
            corpus.len(),
            corpus.num_positive(),
            corpus.num_negative()
        );
        Ok((corpus, report))
    }

    /// Assemble one violent / non-violent directory pair into a new corpus.
    ///
    /// Both directories must exist and contain JSON files.
    pub fn assemble_pair(
        &self,
        violent_dir: &Path,
        non_violent_dir: &Path,
    ) -> Result<(LabeledCorpus, AssemblyReport), DatasetError> {
        let mut corpus = LabeledCorpus::new();
        let mut report = AssemblyReport::default();
        report
            .directories
            .push(self.assemble_directory(violent_dir, ClassLabel::Violent, &mut corpus)?);
        report.directories.push(self.assemble_directory(
            non_violent_dir,
            ClassLabel::NonViolent,
            &mut corpus,
        )?);
        Ok((corpus, report))
    }

    /// Process one class directory, appending its graphs to `corpus`.
    pub fn assemble_directory(
        &self,
        dir: &Path,
        label: ClassLabel,
        corpus: &mut LabeledCorpus,
    ) -> Result<DirectoryStats, DatasetError> {
        let files = list_json_files(dir)?;
        if files.is_empty() {
            return Err(DatasetError::NoEligibleFiles { path: dir.to_path_buf() });
        }
        let take = self.files_to_process(files.len());
        info!("Found {} {} JSON files in {} (processing {take})", files.len(), label.name(), dir.display());

        let pb = self.progress_bar(take as u64, label);
        let mut stats = DirectoryStats {
            path: dir.to_path_buf(),
            label,
            files_found: files.len(),
            files_processed: take,
            instances_seen: 0,
            graphs_built: 0,
        };
        for path in &files[..take] {
            let file = KeypointFile::read(path)?;
            let mut built = 0usize;
            let mut seen = 0usize;
            for keypoints in file.instances() {
                seen += 1;
                if let Some(graph) = keypoints.and_then(|kp| self.builder.build(&kp, label)) {
                    corpus.push(graph);
                    built += 1;
                }
            }
            debug!("{}: {built}/{seen} instances converted", path.display());
            stats.instances_seen += seen;
            stats.graphs_built += built;
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "{}: {} graphs from {} instances ({} skipped)",
            dir.display(),
            stats.graphs_built,
            stats.instances_seen,
            stats.skipped()
        );
        Ok(stats)
    }

    fn progress_bar(&self, len: u64, label: ClassLabel) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Processing {} samples", label.name()));
        pb
    }
}

/// Sorted `*.json` files directly inside `dir`.
///
/// # Errors
///
/// [`DatasetError::DirectoryNotFound`] when `dir` is not a directory and
/// [`DatasetError::IoError`] when it cannot be listed.
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound { path: dir.to_path_buf() });
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DatasetError::io_error(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    Ok(files)
}
