use std::path::PathBuf;

use clap::Parser;
use orchestrator::{ConfigErr, TrainingConfig};

/// Trains a topic model over windows of a bag-of-words corpus.
#[derive(Debug, Parser)]
#[command(name = "topic-orchestration", version)]
pub struct Cli {
    /// JSON-lines corpus files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Number of parameter servers holding the model
    #[arg(long, default_value_t = 1)]
    pub ps_count: usize,

    /// Number of documents in the corpus, ids are expected in [0, corpus size)
    #[arg(long)]
    pub corpus_size: u64,

    /// Number of consecutive document ids trained together
    #[arg(long)]
    pub window_size: u64,

    /// Number of topics, the corpus-level truncation for hdp
    #[arg(short = 'k', long)]
    pub topics: usize,

    /// Document-level truncation for hdp
    #[arg(long)]
    pub truncation: Option<usize>,

    /// Iterations run over every window
    #[arg(long, default_value_t = 10)]
    pub max_iterations: usize,

    /// Cap on the per-document inference loop
    #[arg(long, default_value_t = 100)]
    pub max_inner_iterations: usize,

    /// Prior on the document-topic distributions (alpha)
    #[arg(long)]
    pub doc_concentration: Option<f64>,

    /// Prior on the topic-term distributions (eta)
    #[arg(long)]
    pub topic_concentration: Option<f64>,

    #[arg(long)]
    pub vocab_size: usize,

    /// lda or hdp
    #[arg(long, default_value = "lda")]
    pub model: String,

    /// online or gibbs
    #[arg(long, default_value = "online")]
    pub optimizer: String,

    /// Number of partitions of every batch
    #[arg(long, default_value_t = 1)]
    pub partitions: usize,

    /// Write a checkpoint every this many iterations
    #[arg(long)]
    pub checkpoint_interval: Option<u64>,

    /// Resume from a checkpoint file
    #[arg(long)]
    pub resume: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Directory under which the model's monitor directory is created
    #[arg(long, default_value = "monitor")]
    pub monitor_dir: PathBuf,

    /// Log filter, e.g. `info` or `orchestrator=debug`, defaults to RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,

    /// Terms printed per topic once an lda model is trained
    #[arg(long, default_value_t = 10)]
    pub top_terms: usize,
}

impl Cli {
    /// Builds the training configuration, without touching the corpus.
    pub fn config(&self) -> Result<TrainingConfig, ConfigErr> {
        let mut builder = TrainingConfig::builder()
            .model(self.model.as_str())
            .optimizer(self.optimizer.as_str())
            .topics(self.topics)
            .vocab_size(self.vocab_size)
            .corpus_size(self.corpus_size)
            .window_size(self.window_size)
            .max_iterations(self.max_iterations)
            .max_inner_iterations(self.max_inner_iterations)
            .partitions(self.partitions)
            .ps_count(self.ps_count)
            .seed(self.seed)
            .monitor_dir(self.monitor_dir.clone());

        if let Some(truncation) = self.truncation {
            builder = builder.truncation(truncation);
        }
        if let Some(alpha) = self.doc_concentration {
            builder = builder.doc_concentration(alpha);
        }
        if let Some(eta) = self.topic_concentration {
            builder = builder.topic_concentration(eta);
        }
        if let Some(interval) = self.checkpoint_interval {
            builder = builder.checkpoint_interval(interval);
        }
        if let Some(path) = &self.resume {
            builder = builder.resume_from(path.clone());
        }

        builder.build()
    }
}

/// Prints a parse failure, or the help and version texts clap reports as errors.
///
/// # Returns
/// The exit status, 1 for usage errors and 0 for help and version.
pub fn report_parse_error(e: &clap::Error) -> u8 {
    if let Err(io) = e.print() {
        eprintln!("{e}");
        eprintln!("failed to print the usage: {io}");
    }

    if e.use_stderr() { 1 } else { 0 }
}
