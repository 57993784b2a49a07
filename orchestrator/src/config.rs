use std::{
    fmt::{self, Display},
    num::{NonZeroU64, NonZeroUsize},
    path::{Path, PathBuf},
    str::FromStr,
};

use inference::{Algorithm, InferenceParams};

use crate::error::ConfigErr;

/// The topic model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Lda,
    Hdp,
}

impl FromStr for ModelKind {
    type Err = ConfigErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lda" => Ok(ModelKind::Lda),
            "hdp" => Ok(ModelKind::Hdp),
            _ => Err(ConfigErr::UnknownModel(s.to_string())),
        }
    }
}

impl Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Lda => "lda",
            ModelKind::Hdp => "hdp",
        })
    }
}

/// The inference method used to fit the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Online,
    Gibbs,
}

impl FromStr for OptimizerKind {
    type Err = ConfigErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(OptimizerKind::Online),
            "gibbs" => Ok(OptimizerKind::Gibbs),
            _ => Err(ConfigErr::UnknownOptimizer(s.to_string())),
        }
    }
}

impl Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizerKind::Online => "online",
            OptimizerKind::Gibbs => "gibbs",
        })
    }
}

/// Resolves the algorithm of a `(model, optimizer)` pair.
pub fn resolve_algorithm(
    model: ModelKind,
    optimizer: OptimizerKind,
) -> Result<Algorithm, ConfigErr> {
    match (model, optimizer) {
        (ModelKind::Lda, OptimizerKind::Online) => Ok(Algorithm::OnlineLda),
        (ModelKind::Lda, OptimizerKind::Gibbs) => Ok(Algorithm::GibbsLda),
        (ModelKind::Hdp, OptimizerKind::Online) => Ok(Algorithm::OnlineHdp),
        (ModelKind::Hdp, OptimizerKind::Gibbs) => Err(ConfigErr::Invalid {
            field: "optimizer",
            reason: "hdp is only fitted with the online optimizer".into(),
        }),
    }
}

/// The immutable configuration of a training job, created with `TrainingConfigBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    algorithm: Algorithm,
    topics: NonZeroUsize,
    truncation: NonZeroUsize,
    vocab_size: NonZeroUsize,
    doc_concentration: f64,
    topic_concentration: f64,
    corpus_concentration: f64,
    max_iterations: usize,
    max_inner_iterations: NonZeroUsize,
    window_size: NonZeroU64,
    corpus_size: u64,
    partitions: NonZeroUsize,
    ps_count: NonZeroUsize,
    checkpoint_interval: Option<NonZeroU64>,
    seed: u64,
    tau0: f64,
    kappa: f64,
    monitor_dir: PathBuf,
    resume_from: Option<PathBuf>,
}

impl TrainingConfig {
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn topics(&self) -> NonZeroUsize {
        self.topics
    }

    pub fn truncation(&self) -> NonZeroUsize {
        self.truncation
    }

    pub fn vocab_size(&self) -> NonZeroUsize {
        self.vocab_size
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn window_size(&self) -> NonZeroU64 {
        self.window_size
    }

    pub fn corpus_size(&self) -> u64 {
        self.corpus_size
    }

    pub fn partitions(&self) -> NonZeroUsize {
        self.partitions
    }

    pub fn ps_count(&self) -> NonZeroUsize {
        self.ps_count
    }

    pub fn checkpoint_interval(&self) -> Option<NonZeroU64> {
        self.checkpoint_interval
    }

    pub fn monitor_dir(&self) -> &Path {
        &self.monitor_dir
    }

    pub fn resume_from(&self) -> Option<&Path> {
        self.resume_from.as_deref()
    }

    /// The hyperparameters handed to the optimizer.
    pub fn inference_params(&self) -> InferenceParams {
        InferenceParams {
            topics: self.topics.get(),
            truncation: self.truncation.get(),
            vocab: self.vocab_size.get(),
            doc_concentration: self.doc_concentration,
            topic_concentration: self.topic_concentration,
            corpus_concentration: self.corpus_concentration,
            max_inner_iterations: self.max_inner_iterations.get(),
            tau0: self.tau0,
            kappa: self.kappa,
            seed: self.seed,
        }
    }
}

/// Builds a validated `TrainingConfig`.
///
/// Unset concentrations default to `1 / topics` for LDA, and to `alpha = 1`,
/// `eta = 0.01` for HDP.
#[derive(Debug, Clone)]
pub struct TrainingConfigBuilder {
    model: String,
    optimizer: String,
    topics: usize,
    truncation: Option<usize>,
    vocab_size: Option<usize>,
    doc_concentration: Option<f64>,
    topic_concentration: Option<f64>,
    corpus_concentration: f64,
    max_iterations: usize,
    max_inner_iterations: usize,
    window_size: u64,
    corpus_size: u64,
    partitions: usize,
    ps_count: usize,
    checkpoint_interval: Option<u64>,
    seed: u64,
    tau0: f64,
    kappa: f64,
    monitor_dir: PathBuf,
    resume_from: Option<PathBuf>,
}

impl Default for TrainingConfigBuilder {
    fn default() -> Self {
        Self {
            model: "lda".into(),
            optimizer: "online".into(),
            topics: 10,
            truncation: None,
            vocab_size: None,
            doc_concentration: None,
            topic_concentration: None,
            corpus_concentration: 1.,
            max_iterations: 10,
            max_inner_iterations: 100,
            window_size: 1,
            corpus_size: 0,
            partitions: 1,
            ps_count: 1,
            checkpoint_interval: None,
            seed: 0,
            tau0: 1024.,
            kappa: 0.7,
            monitor_dir: std::env::temp_dir(),
            resume_from: None,
        }
    }
}

macro_rules! setter {
    ($(#[$doc:meta])* $name:ident: Option<$ty:ty>) => {
        $(#[$doc])*
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = Some(value);
            self
        }
    };
    ($(#[$doc:meta])* $name:ident: $ty:ty) => {
        $(#[$doc])*
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = value;
            self
        }
    };
}

impl TrainingConfigBuilder {
    setter!(topics: usize);
    setter!(
        /// Document-level truncation of HDP, defaults to `min(topics, 20)`.
        truncation: Option<usize>
    );
    setter!(vocab_size: Option<usize>);
    setter!(doc_concentration: Option<f64>);
    setter!(topic_concentration: Option<f64>);
    setter!(corpus_concentration: f64);
    setter!(max_iterations: usize);
    setter!(max_inner_iterations: usize);
    setter!(window_size: u64);
    setter!(corpus_size: u64);
    setter!(partitions: usize);
    setter!(ps_count: usize);
    setter!(
        /// Writes a checkpoint every `value` iterations.
        checkpoint_interval: Option<u64>
    );
    setter!(seed: u64);
    setter!(tau0: f64);
    setter!(kappa: f64);
    setter!(monitor_dir: PathBuf);
    setter!(
        /// Starts from a checkpoint instead of a fresh model.
        resume_from: Option<PathBuf>
    );

    /// The model name, `lda` or `hdp`.
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model = name.into();
        self
    }

    /// The optimizer name, `online` or `gibbs`.
    pub fn optimizer(mut self, name: impl Into<String>) -> Self {
        self.optimizer = name.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// The first invalid setting found, topics and vocabulary are checked first.
    pub fn build(self) -> Result<TrainingConfig, ConfigErr> {
        let topics = NonZeroUsize::new(self.topics).ok_or(ConfigErr::NoTopics)?;
        let vocab_size = self
            .vocab_size
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigErr::NoVocabulary)?;

        let model: ModelKind = self.model.parse()?;
        let optimizer: OptimizerKind = self.optimizer.parse()?;
        let algorithm = resolve_algorithm(model, optimizer)?;

        let truncation = self.truncation.unwrap_or(topics.get().min(20));
        let truncation = non_zero("truncation", truncation)?;

        let (default_alpha, default_eta) = match model {
            ModelKind::Lda => (1. / topics.get() as f64, 1. / topics.get() as f64),
            ModelKind::Hdp => (1., 0.01),
        };
        let doc_concentration = positive(
            "doc concentration",
            self.doc_concentration.unwrap_or(default_alpha),
        )?;
        let topic_concentration = positive(
            "topic concentration",
            self.topic_concentration.unwrap_or(default_eta),
        )?;
        let corpus_concentration = positive("corpus concentration", self.corpus_concentration)?;

        if !(self.tau0.is_finite() && self.tau0 >= 0.) {
            return Err(invalid("tau0", format!("must be non-negative, got {}", self.tau0)));
        }

        if !(self.kappa > 0.5 && self.kappa <= 1.) {
            return Err(invalid("kappa", format!("must lie in (0.5, 1], got {}", self.kappa)));
        }

        let checkpoint_interval = self
            .checkpoint_interval
            .map(|n| {
                NonZeroU64::new(n).ok_or_else(|| invalid("checkpoint interval", "must be positive"))
            })
            .transpose()?;

        Ok(TrainingConfig {
            algorithm,
            topics,
            truncation,
            vocab_size,
            doc_concentration,
            topic_concentration,
            corpus_concentration,
            max_iterations: self.max_iterations,
            max_inner_iterations: non_zero("max inner iterations", self.max_inner_iterations)?,
            window_size: NonZeroU64::new(self.window_size)
                .ok_or_else(|| invalid("window size", "must be positive"))?,
            corpus_size: self.corpus_size,
            partitions: non_zero("partitions", self.partitions)?,
            ps_count: non_zero("ps count", self.ps_count)?,
            checkpoint_interval,
            seed: self.seed,
            tau0: self.tau0,
            kappa: self.kappa,
            monitor_dir: self.monitor_dir,
            resume_from: self.resume_from,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigErr {
    ConfigErr::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<NonZeroUsize, ConfigErr> {
    NonZeroUsize::new(value).ok_or_else(|| invalid(field, "must be positive"))
}

fn positive(field: &'static str, value: f64) -> Result<f64, ConfigErr> {
    if value.is_finite() && value > 0. {
        Ok(value)
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}
