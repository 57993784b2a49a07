pub mod config;
pub mod error;
pub mod metrics;
pub mod window;

use corpus::{DistributedDataset, Document};
use inference::{TopicOptimizer, TopicTerms};
use log::info;
use parameter_server::{ModelSpec, MonitorPath, ServerHandle, distribute, resume};

pub use config::{ModelKind, OptimizerKind, TrainingConfig, TrainingConfigBuilder};
pub use error::{ConfigErr, Result, TrainErr};
pub use metrics::{IterationMetrics, TrainingReport, WindowMetrics};
pub use window::{CorpusStats, Window, WindowedTrainer, Windows};

/// A trained LDA model, still held by its parameter servers.
#[derive(Debug)]
pub struct LdaModel {
    server: ServerHandle,
    monitor: MonitorPath,
    report: TrainingReport,
}

impl LdaModel {
    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn monitor_path(&self) -> &MonitorPath {
        &self.monitor
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Pulls the topic-term block of the model.
    pub fn topic_terms(&self) -> Result<TopicTerms> {
        let (terms, _) = TopicTerms::pull(&self.server)?;
        Ok(terms)
    }

    /// The `n` most probable terms of every topic.
    pub fn describe_topics(&self, n: usize) -> Result<Vec<Vec<(usize, f64)>>> {
        let terms = self.topic_terms()?;
        Ok((0..terms.topics()).map(|t| terms.top_terms(t, n)).collect())
    }

    /// Releases the parameter servers holding the model.
    pub fn recycle(self) -> bool {
        self.server.recycle()
    }
}

/// The result of an HDP run, whose model is released once training ends.
#[derive(Debug)]
pub struct HdpRun {
    pub monitor: MonitorPath,
    pub report: TrainingReport,
    /// The server's iteration counter when it was recycled.
    pub iterations: u64,
}

/// Recycles the servers when dropped, unless disarmed.
struct RecycleGuard<'a> {
    server: &'a ServerHandle,
    armed: bool,
}

impl<'a> RecycleGuard<'a> {
    fn new(server: &'a ServerHandle) -> Self {
        Self {
            server,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RecycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.server.recycle();
        }
    }
}

fn start_servers(config: &TrainingConfig) -> Result<(ServerHandle, MonitorPath)> {
    let started = match config.resume_from() {
        Some(path) => resume(
            path,
            config.ps_count(),
            config.monitor_dir(),
            config.checkpoint_interval(),
        )?,
        None => {
            let spec = ModelSpec {
                checkpoint_interval: config.checkpoint_interval(),
                ..config.algorithm().model_spec(&config.inference_params())
            };
            distribute(spec, config.ps_count(), config.monitor_dir())?
        }
    };

    Ok(started)
}

fn train<D>(corpus: &D, config: &TrainingConfig, server: &ServerHandle) -> Result<TrainingReport>
where
    D: DistributedDataset<Document>,
{
    let mut optimizer =
        TopicOptimizer::initialize(config.algorithm(), config.inference_params(), server)?;

    info!(
        "training {} with {} topics over {} partition(s)",
        config.algorithm(),
        config.topics(),
        config.partitions()
    );

    WindowedTrainer::new(config).run(corpus, &mut optimizer, server)
}

/// Trains an LDA model over `corpus`.
///
/// # Returns
/// The trained model, its servers are released when training fails.
pub fn train_lda<D>(corpus: &D, config: &TrainingConfig) -> Result<LdaModel>
where
    D: DistributedDataset<Document>,
{
    if config.algorithm().is_hdp() {
        return Err(TrainErr::Config(ConfigErr::Invalid {
            field: "model",
            reason: "expected an lda model".into(),
        }));
    }

    let (server, monitor) = start_servers(config)?;
    let guard = RecycleGuard::new(&server);
    let report = train(corpus, config, &server)?;
    guard.disarm();

    info!("lda training finished after {} iterations", server.iteration());

    Ok(LdaModel {
        server,
        monitor,
        report,
    })
}

/// Trains an HDP over `corpus`, recycling its servers once done.
///
/// The model only outlives the run through the checkpoints written in the monitor path.
pub fn train_hdp<D>(corpus: &D, config: &TrainingConfig) -> Result<HdpRun>
where
    D: DistributedDataset<Document>,
{
    if !config.algorithm().is_hdp() {
        return Err(TrainErr::Config(ConfigErr::Invalid {
            field: "model",
            reason: "expected an hdp model".into(),
        }));
    }

    let (server, monitor) = start_servers(config)?;
    let report = {
        let _guard = RecycleGuard::new(&server);
        train(corpus, config, &server)?
    };

    let iterations = server.iteration();
    info!("hdp training finished after {iterations} iterations, servers recycled");

    Ok(HdpRun {
        monitor,
        report,
        iterations,
    })
}
