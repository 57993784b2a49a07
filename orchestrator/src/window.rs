use std::{num::NonZeroU64, ops::Range, time::Instant};

use corpus::{DistributedDataset, Document, HashPartitioner, Pinned};
use inference::Optimizer;
use log::{debug, info, warn};
use parameter_server::ServerHandle;

use crate::{
    config::TrainingConfig,
    error::Result,
    metrics::{IterationMetrics, TrainingReport, WindowMetrics},
};

/// A half-open range of document ids trained on together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: u64,
    pub begin: u64,
    pub end: u64,
}

impl Window {
    /// The `index`-th window of `size` ids.
    pub fn new(index: u64, size: u64) -> Self {
        let begin = index * size;
        Self {
            index,
            begin,
            end: begin + size,
        }
    }

    pub fn range(&self) -> Range<u64> {
        self.begin..self.end
    }

    pub fn contains(&self, id: u64) -> bool {
        self.range().contains(&id)
    }
}

/// The windows of a corpus, in increasing order.
///
/// A window is produced while `(w + 1) * window_size < corpus_size`, so the
/// ids of the last, possibly full, window are never trained on.
#[derive(Debug, Clone)]
pub struct Windows {
    corpus_size: u64,
    window_size: NonZeroU64,
    next: u64,
}

impl Windows {
    pub fn new(corpus_size: u64, window_size: NonZeroU64) -> Self {
        Self {
            corpus_size,
            window_size,
            next: 0,
        }
    }

    /// The amount of windows produced for a corpus.
    pub fn count_for(corpus_size: u64, window_size: NonZeroU64) -> u64 {
        corpus_size.saturating_sub(1) / window_size.get()
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.window_size.get();
        let end = self.next.checked_add(1)?.checked_mul(size)?;

        if end >= self.corpus_size {
            return None;
        }

        let window = Window::new(self.next, size);
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = Windows::count_for(self.corpus_size, self.window_size).saturating_sub(self.next);
        let left = usize::try_from(left).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Windows {}

/// The amount of documents and the largest id of a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub documents: u64,
    pub max_id: Option<u64>,
}

impl CorpusStats {
    /// Scans the corpus once.
    pub fn scan<D: DistributedDataset<Document>>(corpus: &D) -> Self {
        corpus.aggregate(
            CorpusStats::default(),
            |acc, doc| CorpusStats {
                documents: acc.documents + 1,
                max_id: acc.max_id.max(Some(doc.id)),
            },
            |a, b| CorpusStats {
                documents: a.documents + b.documents,
                max_id: a.max_id.max(b.max_id),
            },
        )
    }
}

/// Runs the windowed training loop.
///
/// Every window's documents are filtered out of the corpus, hash partitioned
/// and pinned for the `max_iterations` inner iterations run over them. Each
/// iteration updates the model once, scores the batch and advances the
/// server's iteration counter. The batch and the diagnostics are released on
/// every exit path.
#[derive(Debug, Clone, Copy)]
pub struct WindowedTrainer<'a> {
    config: &'a TrainingConfig,
}

impl<'a> WindowedTrainer<'a> {
    pub fn new(config: &'a TrainingConfig) -> Self {
        Self { config }
    }

    pub fn run<D, O>(
        &self,
        corpus: &D,
        optimizer: &mut O,
        server: &ServerHandle,
    ) -> Result<TrainingReport>
    where
        D: DistributedDataset<Document>,
        O: Optimizer,
    {
        let config = self.config;
        let (corpus_size, window_size) = (config.corpus_size(), config.window_size());

        if window_size.get() >= corpus_size {
            warn!(
                "window size {window_size} is not smaller than the corpus size {corpus_size}, no training will occur"
            );
        }

        let stats = CorpusStats::scan(corpus);
        match stats.max_id {
            Some(max_id) if max_id.saturating_add(1) != corpus_size => warn!(
                "corpus mismatch: the declared corpus size is {corpus_size} but the largest id is {max_id} ({} documents)",
                stats.documents
            ),
            _ => {}
        }

        server.set_train_set_size(corpus_size);

        let mut report = TrainingReport::default();
        let windows = Windows::new(corpus_size, window_size);
        info!(
            windows = windows.len(),
            iterations = config.max_iterations();
            "starting training"
        );

        for window in windows {
            let metrics = self.run_window(corpus, optimizer, server, window)?;
            info!("{metrics}");
            report.windows.push(metrics);
        }

        Ok(report)
    }

    fn run_window<D, O>(
        &self,
        corpus: &D,
        optimizer: &mut O,
        server: &ServerHandle,
        window: Window,
    ) -> Result<WindowMetrics>
    where
        D: DistributedDataset<Document>,
        O: Optimizer,
    {
        let range = window.range();
        let batch = corpus
            .filter(move |doc| range.contains(&doc.id))
            .partition_by(self.config.partitions(), HashPartitioner);

        let (batch, documents) = Pinned::<Document, _>::materialized(batch);
        debug!(window = window.index, documents = documents; "batch pinned");

        let mut metrics = WindowMetrics::new(window, documents);

        for _ in 0..self.config.max_iterations() {
            let start = Instant::now();
            let diagnostics = optimizer.next(server, batch.dataset())?;
            let elapsed = start.elapsed();

            let score = optimizer.perplexity(server, batch.dataset(), diagnostics.dataset())?;
            drop(diagnostics);

            let iteration = server.iteration_done()?;
            debug!(iteration = iteration, score = score.perplexity(); "iteration done");

            metrics.push(IterationMetrics {
                iteration,
                elapsed,
                score,
            });
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(corpus: u64, size: u64) -> Vec<Window> {
        Windows::new(corpus, NonZeroU64::new(size).unwrap()).collect()
    }

    #[test]
    fn strict_loop_condition() {
        assert_eq!(windows(16001, 8000).len(), 2);
        assert_eq!(windows(8000, 8000).len(), 0);
        assert_eq!(windows(7999, 8000).len(), 0);
        assert_eq!(windows(0, 10).len(), 0);

        for n in 1..6 {
            assert_eq!(windows(n * 100, 100).len() as u64, n - 1);
        }
    }

    #[test]
    fn windows_are_increasing_and_contiguous() {
        let all = windows(35, 10);
        assert_eq!(
            all,
            vec![Window::new(0, 10), Window::new(1, 10), Window::new(2, 10)]
        );
        assert_eq!(all[2].range(), 20..30);
        assert!(all[1].contains(10) && !all[1].contains(20));
    }

    #[test]
    fn size_hint_matches_count() {
        let size = NonZeroU64::new(7).unwrap();
        for corpus in [0, 1, 7, 8, 14, 15, 100] {
            let iter = Windows::new(corpus, size);
            assert_eq!(iter.len() as u64, Windows::count_for(corpus, size));
            assert_eq!(iter.count() as u64, Windows::count_for(corpus, size));
        }
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        assert_eq!(windows(u64::MAX, u64::MAX / 2 + 1).len(), 1);
    }
}
