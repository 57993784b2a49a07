use std::{
    fmt::{self, Display},
    time::Duration,
};

use inference::Score;

use crate::window::Window;

/// What one inner iteration took and how the batch scored after it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationMetrics {
    /// The value of the server's iteration counter once the iteration was done.
    pub iteration: u64,
    pub elapsed: Duration,
    pub score: Score,
}

/// The metrics of every inner iteration run over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMetrics {
    pub window: Window,
    pub documents: usize,
    pub iterations: Vec<IterationMetrics>,
}

impl WindowMetrics {
    pub fn new(window: Window, documents: usize) -> Self {
        Self {
            window,
            documents,
            iterations: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, iteration: IterationMetrics) {
        self.iterations.push(iteration);
    }

    pub fn elapsed(&self) -> Duration {
        self.iterations.iter().map(|it| it.elapsed).sum()
    }

    pub fn last_score(&self) -> Option<Score> {
        self.iterations.last().map(|it| it.score)
    }
}

impl Display for WindowMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed: Vec<String> = self
            .iterations
            .iter()
            .map(|it| format!("{:.3}", it.elapsed.as_secs_f64()))
            .collect();
        let scores: Vec<String> = self.iterations.iter().map(|it| it.score.to_string()).collect();

        write!(
            f,
            "window {} [{}, {}) with {} documents: elapsed(s) [{}], scores [{}]",
            self.window.index,
            self.window.begin,
            self.window.end,
            self.documents,
            elapsed.join(", "),
            scores.join(", "),
        )
    }
}

/// The outcome of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub windows: Vec<WindowMetrics>,
}

impl TrainingReport {
    /// The amount of inner iterations run over every window.
    pub fn iterations(&self) -> usize {
        self.windows.iter().map(|w| w.iterations.len()).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.windows.iter().map(WindowMetrics::elapsed).sum()
    }

    pub fn last_score(&self) -> Option<Score> {
        self.windows.iter().rev().find_map(WindowMetrics::last_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(secs: u64, score: f64) -> IterationMetrics {
        IterationMetrics {
            iteration: secs,
            elapsed: Duration::from_secs(secs),
            score: Score::Perplexity(score),
        }
    }

    #[test]
    fn window_summary() {
        let mut window = WindowMetrics::new(Window::new(1, 10), 7);
        window.push(metrics(1, 12.5));
        window.push(metrics(2, 10.));

        assert_eq!(window.elapsed(), Duration::from_secs(3));
        assert_eq!(
            window.to_string(),
            "window 1 [10, 20) with 7 documents: elapsed(s) [1.000, 2.000], scores [12.5000, 10.0000]"
        );
    }

    #[test]
    fn report_totals() {
        let mut first = WindowMetrics::new(Window::new(0, 5), 5);
        first.push(metrics(1, 3.));
        let empty = WindowMetrics::new(Window::new(1, 5), 0);

        let report = TrainingReport {
            windows: vec![first, empty],
        };

        assert_eq!(report.iterations(), 1);
        assert_eq!(report.last_score(), Some(Score::Perplexity(3.)));
    }
}
