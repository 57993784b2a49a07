use std::{
    fmt, fs,
    num::{NonZeroU64, NonZeroUsize},
    path::{Path, PathBuf},
    process,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use parking_lot::RwLock;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    checkpoint::Checkpoint,
    error::{PsErr, Result},
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen, ValuesParamGen},
    merge::MergeRule,
    spec::{InitSpec, ModelSpec},
    storage::ModelStore,
};

static NEXT_MODEL: AtomicU64 = AtomicU64::new(0);

/// The directory where a distributed model reports its checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPath(PathBuf);

impl MonitorPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for MonitorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug)]
struct ServerInner {
    topics: usize,
    vocab: usize,
    extra: usize,
    checkpoint_interval: Option<NonZeroU64>,
    monitor: MonitorPath,
    store: RwLock<Option<ModelStore>>,
    iteration: AtomicU64,
    train_set_size: AtomicU64,
}

/// The capability to reach the global model held by the parameter servers.
///
/// Every operation that needs the shared model receives a `ServerHandle`
/// explicitly. Cloning it is cheap and every clone refers to the same model.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    inner: Arc<ServerInner>,
}

/// Distributes a freshly initialized model among `servers` parameter servers.
///
/// The parameters are split in `servers` contiguous ranges of the same size (the
/// last one may be shorter), each range is served by its own shard.
///
/// # Arguments
/// * `spec` - The layout and initialization of the model.
/// * `servers` - The amount of parameter servers.
/// * `monitor_root` - The directory under which the model's monitor directory is created.
///
/// # Returns
/// The handle to the model and the path where it reports its checkpoints.
pub fn distribute(
    spec: ModelSpec,
    servers: NonZeroUsize,
    monitor_root: &Path,
) -> Result<(ServerHandle, MonitorPath)> {
    spec.validate()?;

    let shard_size = NonZeroUsize::new(spec.len().div_ceil(servers.get()))
        .ok_or_else(|| PsErr::InvalidSpec("the model has no parameters".into()))?;
    let store = build_store(&spec, shard_size)?;

    let monitor = MonitorPath(monitor_root.join(monitor_dir_name()));
    fs::create_dir_all(monitor.as_path())?;

    info!(
        "distributed a {}x{} model ({} parameters) over {} server(s), monitor path {monitor}",
        spec.topics,
        spec.vocab,
        store.len(),
        store.shards(),
    );

    let inner = ServerInner {
        topics: spec.topics,
        vocab: spec.vocab,
        extra: spec.extra,
        checkpoint_interval: spec.checkpoint_interval,
        monitor: monitor.clone(),
        store: RwLock::new(Some(store)),
        iteration: AtomicU64::new(0),
        train_set_size: AtomicU64::new(0),
    };

    let handle = ServerHandle {
        inner: Arc::new(inner),
    };

    Ok((handle, monitor))
}

/// Distributes a model restored from a checkpoint, its iteration counter continues from the checkpoint's.
///
/// # Arguments
/// * `path` - The checkpoint file.
/// * `servers` - The amount of parameter servers.
/// * `monitor_root` - The directory under which the model's monitor directory is created.
/// * `checkpoint_interval` - How often the resumed model writes checkpoints.
pub fn resume(
    path: &Path,
    servers: NonZeroUsize,
    monitor_root: &Path,
    checkpoint_interval: Option<NonZeroU64>,
) -> Result<(ServerHandle, MonitorPath)> {
    let checkpoint = Checkpoint::read(path)?;

    let spec = ModelSpec {
        topics: checkpoint.topics,
        vocab: checkpoint.vocab,
        extra: checkpoint.extra,
        init: InitSpec::Values(checkpoint.params),
        checkpoint_interval,
        seed: None,
    };

    let (handle, monitor) = distribute(spec, servers, monitor_root)?;
    handle
        .inner
        .iteration
        .store(checkpoint.iteration, Ordering::Release);

    info!("resumed model from {} at iteration {}", path.display(), checkpoint.iteration);
    Ok((handle, monitor))
}

fn monitor_dir_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = NEXT_MODEL.fetch_add(1, Ordering::Relaxed);
    format!("model-{}-{nanos}-{seq}", process::id())
}

fn build_store(spec: &ModelSpec, shard_size: NonZeroUsize) -> Result<ModelStore> {
    let head: Box<dyn ParamGen> = match &spec.init {
        InitSpec::Const { value } => Box::new(ConstParamGen::new(*value, spec.topic_term_len())),
        InitSpec::Gamma { shape, scale } => {
            let rng = match spec.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let limit = spec.topic_term_len();
            Box::new(RandParamGen::gamma(rng, limit, *shape, *scale)?)
        }
        InitSpec::Values(values) => {
            let param_gen = ValuesParamGen::new(values.clone());
            return Ok(ModelStore::new(shard_size, param_gen));
        }
    };

    let tail: Box<dyn ParamGen> = Box::new(ConstParamGen::new(0., spec.extra));
    Ok(ModelStore::new(shard_size, ChainedParamGen::new(vec![head, tail])))
}

impl ServerHandle {
    pub fn topics(&self) -> usize {
        self.inner.topics
    }

    pub fn vocab(&self) -> usize {
        self.inner.vocab
    }

    /// The amount of trailing parameters after the topic-term block.
    pub fn extra(&self) -> usize {
        self.inner.extra
    }

    /// The total amount of parameters.
    pub fn len(&self) -> usize {
        self.inner.topics * self.inner.vocab + self.inner.extra
    }

    pub fn monitor_path(&self) -> &MonitorPath {
        &self.inner.monitor
    }

    /// The amount of iterations completed so far.
    pub fn iteration(&self) -> u64 {
        self.inner.iteration.load(Ordering::Acquire)
    }

    pub fn train_set_size(&self) -> u64 {
        self.inner.train_set_size.load(Ordering::Acquire)
    }

    /// Declares the size of the training set, used by optimizers to scale their statistics.
    pub fn set_train_set_size(&self, n: u64) {
        self.inner.train_set_size.store(n, Ordering::Release);
    }

    pub fn is_recycled(&self) -> bool {
        self.inner.store.read().is_none()
    }

    fn store(&self) -> Result<ModelStore> {
        self.inner.store.read().clone().ok_or(PsErr::Recycled)
    }

    /// Accumulates sufficient statistics, safe to call concurrently from every partition.
    ///
    /// # Returns
    /// A `SizeMismatch` if `stats` isn't the size of the model, or `Recycled`.
    pub fn push(&self, stats: &[f64]) -> Result<()> {
        self.store()?.accumulate(stats)
    }

    /// Merges every statistic pushed since the last commit into the model.
    pub fn commit(&self, rule: &MergeRule) -> Result<()> {
        self.store()?.commit(rule);
        Ok(())
    }

    /// Copies the current parameters into `out`.
    pub fn pull(&self, out: &mut [f64]) -> Result<()> {
        self.store()?.pull(out)
    }

    /// Returns a copy of the current parameters.
    pub fn snapshot(&self) -> Result<Vec<f64>> {
        let mut out = vec![0.; self.len()];
        self.pull(&mut out)?;
        Ok(out)
    }

    /// Advances the global iteration counter, writing a checkpoint when the interval is reached.
    ///
    /// # Returns
    /// The new value of the counter.
    pub fn iteration_done(&self) -> Result<u64> {
        self.store()?;

        let iteration = self.inner.iteration.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(iteration = iteration; "iteration done");

        let due = self
            .inner
            .checkpoint_interval
            .is_some_and(|interval| iteration % interval.get() == 0);

        if due {
            let path = self.checkpoint()?;
            info!("checkpoint written to {}", path.display());
        }

        Ok(iteration)
    }

    /// Writes a checkpoint of the current model in the monitor path.
    ///
    /// # Returns
    /// The path of the checkpoint file.
    pub fn checkpoint(&self) -> Result<PathBuf> {
        let checkpoint = Checkpoint {
            iteration: self.iteration(),
            topics: self.topics(),
            vocab: self.vocab(),
            extra: self.extra(),
            params: self.snapshot()?,
        };

        checkpoint.write(self.inner.monitor.as_path())
    }

    /// Releases the servers and their parameters, every later access fails with `Recycled`.
    ///
    /// # Returns
    /// Whether this call released the model.
    pub fn recycle(&self) -> bool {
        let released = self.inner.store.write().take().is_some();

        if released {
            info!("parameter servers recycled at iteration {}", self.iteration());
        }

        released
    }
}
