use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use parameter_server::ServerHandle;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::error::{InferenceErr, Result};

/// A read-only view of the topic-term block of the global model.
///
/// Built from a snapshot pulled from the parameter server, it caches the
/// derived quantities every optimizer needs.
#[derive(Debug, Clone)]
pub struct TopicTerms {
    lambda: Array2<f64>,
    elog_beta: Array2<f64>,
    exp_elog_beta: Array2<f64>,
    row_sums: Array1<f64>,
}

impl TopicTerms {
    /// Builds the view from a row-major `topics x vocab` buffer.
    pub fn new(topics: usize, vocab: usize, lambda: Vec<f64>) -> Result<Self> {
        let got = lambda.len();
        let lambda = Array2::from_shape_vec((topics, vocab), lambda).map_err(|_| {
            InferenceErr::ShapeMismatch {
                expected: (topics, vocab, 0),
                got: (got / vocab.max(1), vocab, got % vocab.max(1)),
            }
        })?;

        let row_sums = lambda.sum_axis(Axis(1));
        let mut elog_beta = Array2::zeros((topics, vocab));

        Zip::from(elog_beta.rows_mut())
            .and(lambda.rows())
            .and(&row_sums)
            .par_for_each(|mut out, row, &sum| {
                let total = digamma(sum);
                out.zip_mut_with(&row, |o, &l| *o = digamma(l) - total);
            });

        let exp_elog_beta = elog_beta.mapv(f64::exp);

        Ok(Self {
            lambda,
            elog_beta,
            exp_elog_beta,
            row_sums,
        })
    }

    /// Pulls a snapshot of the global model.
    ///
    /// # Returns
    /// The topic-term view and the trailing parameters.
    pub fn pull(server: &ServerHandle) -> Result<(Self, Vec<f64>)> {
        let mut params = server.snapshot()?;
        let tail = params.split_off(server.topics() * server.vocab());
        let terms = Self::new(server.topics(), server.vocab(), params)?;
        Ok((terms, tail))
    }

    pub fn topics(&self) -> usize {
        self.lambda.nrows()
    }

    pub fn vocab(&self) -> usize {
        self.lambda.ncols()
    }

    /// The variational parameters of the topic-term distributions.
    pub fn lambda(&self) -> &Array2<f64> {
        &self.lambda
    }

    /// `E[log beta]` of every topic and term.
    pub fn elog_beta(&self) -> &Array2<f64> {
        &self.elog_beta
    }

    /// `exp(E[log beta])` of every topic and term.
    pub fn exp_elog_beta(&self) -> &Array2<f64> {
        &self.exp_elog_beta
    }

    /// The point estimate `E[beta_tw]`.
    pub fn expected_beta(&self, topic: usize, term: usize) -> f64 {
        self.lambda[[topic, term]] / self.row_sums[topic]
    }

    /// `E[log p(beta | eta) - log q(beta | lambda)]`, the topic-level term of the ELBO.
    pub fn topic_bound(&self, eta: f64) -> f64 {
        let ln_gamma_eta = ln_gamma(eta);
        let ln_gamma_total = ln_gamma(eta * self.vocab() as f64);

        let terms = Zip::from(&self.lambda)
            .and(&self.elog_beta)
            .fold(0., |acc, &l, &e| acc + (eta - l) * e + ln_gamma(l) - ln_gamma_eta);

        let rows: f64 = self
            .row_sums
            .iter()
            .map(|&sum| ln_gamma_total - ln_gamma(sum))
            .sum();

        terms + rows
    }

    /// The `n` most probable terms of `topic` with their probabilities, most probable first.
    pub fn top_terms(&self, topic: usize, n: usize) -> Vec<(usize, f64)> {
        let row: ArrayView1<f64> = self.lambda.row(topic);
        let total = self.row_sums[topic];

        let mut terms: Vec<(usize, f64)> = row.iter().map(|&l| l / total).enumerate().collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1));
        terms.truncate(n);
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            TopicTerms::new(2, 3, vec![1.; 5]),
            Err(InferenceErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn expected_beta_is_row_normalized() {
        let terms = TopicTerms::new(2, 2, vec![1., 3., 2., 2.]).unwrap();
        assert_eq!(terms.expected_beta(0, 1), 0.75);
        assert_eq!(terms.expected_beta(1, 0), 0.5);
    }

    #[test]
    fn elog_beta_matches_dirichlet_expectation() {
        let terms = TopicTerms::new(1, 2, vec![1., 1.]).unwrap();
        assert!((terms.elog_beta()[[0, 0]] + 1.).abs() < 1e-9);
        assert!((terms.exp_elog_beta()[[0, 1]] - (-1f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn top_terms_are_sorted() {
        let terms = TopicTerms::new(1, 4, vec![1., 4., 2., 3.]).unwrap();
        let top = terms.top_terms(0, 2);
        assert_eq!(top, vec![(1, 0.4), (3, 0.3)]);
    }

    #[test]
    fn topic_bound_vanishes_at_the_prior() {
        // q(beta) == p(beta) makes the KL term zero.
        let terms = TopicTerms::new(2, 3, vec![0.5; 6]).unwrap();
        assert!(terms.topic_bound(0.5).abs() < 1e-9);
    }
}
